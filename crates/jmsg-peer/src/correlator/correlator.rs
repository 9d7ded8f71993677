use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use jmsg_core::error::{Fault, JmsgError};
use jmsg_core::protocol::envelope::{Envelope, Seq};

use super::continuation::{reject, Continuation, Expect};
use super::registry::{PendingCall, PendingRegistry};
use super::timer;
use super::{Handle, Transmit};
use crate::dispatch::HandlerTable;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Correlation engine for one logical connection.
///
/// Cheap to clone; all clones share the same registry.
///
/// `send`, `dispatch`, timer expiry, and `close` each run as one turn: a
/// re-entrant per-correlator lock keeps callbacks and handlers from ever
/// running on two threads at once, while a callback may still call back into
/// its own correlator on the same thread. Resolving a pending call always
/// starts by claiming (removing) its entry, so reply, timeout, and close can
/// race without ever firing a callback twice.
///
/// A transmit that synchronously dispatches into another correlator must not
/// be driven from several threads at once; the two turns could deadlock.
#[derive(Clone)]
pub struct Correlator {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    turn: ReentrantMutex<()>,
    state: Mutex<State>,
    handlers: HandlerTable,
    timeout_ms: AtomicU64,
    closed: watch::Sender<bool>,
}

struct State {
    transmit: Option<Arc<dyn Transmit>>,
    pending: PendingRegistry,
}

impl Correlator {
    /// Create a correlator that transmits through `transmit` and routes
    /// inbound actions to `handlers`.
    pub fn new<F>(transmit: F, handlers: HandlerTable) -> Self
    where
        F: Fn(Envelope, Option<Handle>) + Send + Sync + 'static,
    {
        Self::with_transmit(transmit, handlers)
    }

    pub fn with_transmit(transmit: impl Transmit, handlers: HandlerTable) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                turn: ReentrantMutex::new(()),
                state: Mutex::new(State {
                    transmit: Some(Arc::new(transmit)),
                    pending: PendingRegistry::new(),
                }),
                handlers,
                timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT_MS),
                closed,
            }),
        }
    }

    /// Handler table consulted by `dispatch`. May be mutated at any time.
    pub fn handlers(&self) -> &HandlerTable {
        &self.shared.handlers
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.shared.timeout_ms.load(Ordering::Relaxed))
    }

    /// Applies to calls registered from now on; armed timers keep their deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.shared.timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Send `action` with an optional payload.
    pub fn send(&self, action: impl Into<String>, value: Option<Value>, expect: Expect) {
        self.send_with_handle(action, value, expect, None);
    }

    /// Like `send`, passing a side-channel handle to the transport.
    pub fn send_with_handle(
        &self,
        action: impl Into<String>,
        value: Option<Value>,
        expect: Expect,
        handle: Option<Handle>,
    ) {
        let env = Envelope::action(action, value);
        self.shared.send_raw(env, expect, handle);
    }

    /// Fire-and-forget event.
    pub fn event(&self, action: impl Into<String>, value: Value) {
        self.send(action, Some(value), Expect::Nothing);
    }

    /// Action expecting exactly one reply (or a timeout / close error).
    pub fn request<F>(&self, action: impl Into<String>, value: Value, callback: F)
    where
        F: FnOnce(Option<Fault>, Value, Continuation, Option<Handle>) + Send + 'static,
    {
        self.send(action, Some(value), Expect::reply(callback));
    }

    /// Route one inbound envelope.
    pub fn dispatch(&self, env: Envelope, handle: Option<Handle>) {
        let shared = &self.shared;
        let _turn = shared.turn();
        let continuation = match env.seq {
            Some(seq) => Continuation::to_seq(Arc::downgrade(shared), seq),
            None => Continuation::no_reply(),
        };
        let value = env.value.unwrap_or(Value::Null);

        if let Some(seq) = env.reply_to {
            let call = shared.lock().pending.claim(seq);
            match call {
                Some(call) => {
                    tracing::trace!(seq, "routing reply");
                    let err = env.error.filter(is_error_value).map(Fault::Wire);
                    (call.disarm())(err, value, continuation, handle);
                }
                None if continuation.expects_reply() => {
                    tracing::debug!(seq, "reply for unknown sequence number");
                    continuation.fail(JmsgError::UnknownSequenceNumber);
                }
                None => {
                    tracing::debug!(seq, "dropping reply for unknown sequence number");
                }
            }
        } else if let Some(action) = env.action {
            match shared.handlers.get(&action) {
                Some(handler) => {
                    tracing::trace!(action = %action, "routing action");
                    handler.handle(value, continuation, handle);
                }
                None if continuation.expects_reply() => {
                    tracing::debug!(action = %action, "no such action");
                    continuation.fail(JmsgError::NoSuchAction);
                }
                None => {
                    tracing::debug!(action = %action, "dropping event without handler");
                }
            }
        } else {
            tracing::debug!("dropping envelope with neither action nor reply");
        }
    }

    /// Close the connection, resolving every pending call with `err`
    /// (default `ConnectionClosed`). Later sends fail immediately.
    pub fn close(&self, err: Option<Fault>) {
        let _turn = self.shared.turn();
        let (calls, was_open) = {
            let mut state = self.shared.lock();
            let was_open = state.transmit.take().is_some();
            (state.pending.drain(), was_open)
        };
        let err = err.unwrap_or(Fault::Local(JmsgError::ConnectionClosed));

        if was_open || !calls.is_empty() {
            tracing::info!(pending = calls.len(), error = %err, "connection closed");
        }

        // All timers are cancelled before any callback runs.
        let callbacks: Vec<_> = calls.into_iter().map(PendingCall::disarm).collect();
        for cb in callbacks {
            cb(Some(err.clone()), Value::Null, Continuation::no_reply(), None);
        }

        self.shared.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().transmit.is_none()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Resolves once `close` has run.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn turn(&self) -> ReentrantMutexGuard<'_, ()> {
        self.turn.lock()
    }

    /// Registration & transmit path shared by sends and replies.
    pub(crate) fn send_raw(self: &Arc<Self>, mut env: Envelope, expect: Expect, handle: Option<Handle>) {
        let _turn = self.turn();
        let callback = match expect {
            Expect::Nothing => {
                let transmit = self.lock().transmit.clone();
                match transmit {
                    Some(transmit) => transmit.transmit(env, handle),
                    None => tracing::trace!("dropping event on closed connection"),
                }
                return;
            }
            Expect::Reply(cb) => cb,
        };

        let mut state = self.lock();
        let Some(transmit) = state.transmit.clone() else {
            drop(state);
            tracing::debug!("send on closed connection");
            reject(Expect::Reply(callback), JmsgError::ConnectionClosed);
            return;
        };

        let seq = state.pending.allocate();
        env.seq = Some(seq);
        // Armed under the lock so the timer cannot look for the entry before it exists.
        let timer = self.arm_timer(seq);
        state.pending.insert(seq, PendingCall::new(callback, timer));
        drop(state);

        tracing::trace!(seq, "registered pending call");
        transmit.transmit(env, handle);
    }

    fn arm_timer(self: &Arc<Self>, seq: Seq) -> Option<AbortHandle> {
        let Some(rt) = timer::runtime() else {
            tracing::warn!(seq, "no timer runtime, call will not time out");
            return None;
        };
        let after = Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed));
        let weak = Arc::downgrade(self);
        let task = rt.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(seq);
            }
        });
        Some(task.abort_handle())
    }

    fn expire(&self, seq: Seq) {
        let _turn = self.turn();
        let call = self.lock().pending.claim(seq);
        if let Some(call) = call {
            tracing::debug!(seq, "call timed out");
            (call.disarm())(
                Some(Fault::Local(JmsgError::Timeout)),
                Value::Null,
                Continuation::no_reply(),
                None,
            );
        }
    }
}

/// `e` values that mean success: absent, `null`, `false`, `0`, `""`.
fn is_error_value(e: &Value) -> bool {
    match e {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl Drop for Shared {
    // Last handle gone: outstanding calls still resolve exactly once.
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let calls = state.pending.drain();
        let callbacks: Vec<_> = calls.into_iter().map(PendingCall::disarm).collect();
        for cb in callbacks {
            cb(
                Some(Fault::Local(JmsgError::ConnectionClosed)),
                Value::Null,
                Continuation::no_reply(),
                None,
            );
        }
    }
}
