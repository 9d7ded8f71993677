use std::sync::Weak;

use serde_json::Value;

use jmsg_core::error::{Fault, JmsgError};
use jmsg_core::protocol::envelope::{Envelope, Seq};

use super::correlator::Shared;
use super::Handle;

/// Reply callback: `(err, value, continuation, handle)`.
pub type ReplyFn = Box<dyn FnOnce(Option<Fault>, Value, Continuation, Option<Handle>) + Send + 'static>;

/// Whether an outgoing message waits for a reply.
pub enum Expect {
    /// Fire-and-forget.
    Nothing,
    /// Register a pending call resolved by reply, timeout, or close.
    Reply(ReplyFn),
}

impl Expect {
    pub fn reply<F>(f: F) -> Self
    where
        F: FnOnce(Option<Fault>, Value, Continuation, Option<Handle>) + Send + 'static,
    {
        Expect::Reply(Box::new(f))
    }
}

impl std::fmt::Debug for Expect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expect::Nothing => f.write_str("Expect::Nothing"),
            Expect::Reply(_) => f.write_str("Expect::Reply(..)"),
        }
    }
}

/// Reply-sending value handed to every handler and callback.
///
/// Bound to the inbound envelope it was built for. If that envelope carried a
/// sequence number, replying sends `{r, e?, v?}` back to the peer and may
/// register `next` as a fresh pending call, which is how reply chains are
/// built. Otherwise it is the no-reply continuation: replying transmits
/// nothing and reports `NoReplyExpected` to `next`.
pub struct Continuation {
    target: Option<(Weak<Shared>, Seq)>,
}

impl Continuation {
    pub(crate) fn to_seq(shared: Weak<Shared>, seq: Seq) -> Self {
        Self {
            target: Some((shared, seq)),
        }
    }

    /// Continuation for messages that expect no reply.
    pub fn no_reply() -> Self {
        Self { target: None }
    }

    /// True if the peer is waiting on this reply.
    pub fn expects_reply(&self) -> bool {
        self.target.is_some()
    }

    /// Sequence number being replied to.
    pub fn seq(&self) -> Option<Seq> {
        self.target.as_ref().map(|(_, seq)| *seq)
    }

    pub fn reply(self, err: Option<Fault>, value: Value, next: Expect, handle: Option<Handle>) {
        let Some((shared, seq)) = self.target else {
            reject(next, JmsgError::NoReplyExpected);
            return;
        };
        let Some(shared) = shared.upgrade() else {
            tracing::debug!(seq, "reply after correlator was dropped");
            reject(next, JmsgError::ConnectionClosed);
            return;
        };

        let value = (!value.is_null()).then_some(value);
        let env = Envelope::reply(seq, err.map(|e| e.to_wire()), value);
        shared.send_raw(env, next, handle);
    }

    pub fn ok(self, value: Value) {
        self.reply(None, value, Expect::Nothing, None);
    }

    pub fn ok_then(self, value: Value, next: Expect) {
        self.reply(None, value, next, None);
    }

    pub fn fail(self, err: impl Into<Fault>) {
        self.reply(Some(err.into()), Value::Null, Expect::Nothing, None);
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation").field("seq", &self.seq()).finish()
    }
}

/// Resolve `next` locally with `err`, without touching the wire.
pub(crate) fn reject(next: Expect, err: JmsgError) {
    if let Expect::Reply(cb) = next {
        cb(Some(Fault::Local(err)), Value::Null, Continuation::no_reply(), None);
    }
}
