use std::collections::HashMap;

use tokio::task::AbortHandle;

use jmsg_core::protocol::envelope::Seq;

use super::continuation::ReplyFn;

/// One outstanding call: the callback plus the timer that evicts it.
pub(crate) struct PendingCall {
    callback: ReplyFn,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    pub(crate) fn new(callback: ReplyFn, timer: Option<AbortHandle>) -> Self {
        Self { callback, timer }
    }

    /// Cancel the timer and hand back the callback.
    pub(crate) fn disarm(self) -> ReplyFn {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.callback
    }
}

/// Sequence registry: `seq -> PendingCall`.
///
/// Sequence numbers come from a monotonic counter starting at 1. After
/// `Seq::MAX` the counter restarts at 1 and skips numbers that are still
/// outstanding, so a live call never shares its number with another.
pub(crate) struct PendingRegistry {
    next: Seq,
    calls: HashMap<Seq, PendingCall>,
}

impl PendingRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            calls: HashMap::new(),
        }
    }

    pub(crate) fn allocate(&mut self) -> Seq {
        loop {
            let seq = self.next;
            self.next = if seq == Seq::MAX { 1 } else { seq + 1 };
            if !self.calls.contains_key(&seq) {
                return seq;
            }
        }
    }

    pub(crate) fn insert(&mut self, seq: Seq, call: PendingCall) {
        self.calls.insert(seq, call);
    }

    /// Remove the call for `seq`. Whoever gets `Some` owns the resolution.
    pub(crate) fn claim(&mut self, seq: Seq) -> Option<PendingCall> {
        self.calls.remove(&seq)
    }

    /// Take every outstanding call, leaving the registry empty.
    pub(crate) fn drain(&mut self) -> Vec<PendingCall> {
        std::mem::take(&mut self.calls).into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}
