//! Correlation engine.
//!
//! Sequence allocation, the pending-call registry, per-call timeouts, reply
//! routing (including replies to replies), and shutdown.

mod continuation;
#[allow(clippy::module_inception)]
mod correlator;
mod registry;
mod timer;

use std::any::Any;
use std::sync::Arc;

use jmsg_core::protocol::envelope::Envelope;

pub use continuation::{Continuation, Expect, ReplyFn};
pub use correlator::{Correlator, DEFAULT_TIMEOUT_MS};

/// Opaque side-channel object passed alongside an envelope (e.g. a socket
/// handed over an in-process channel). Byte-stream transports ignore it.
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Best-effort delivery of one envelope. The result is never consulted.
pub trait Transmit: Send + Sync + 'static {
    fn transmit(&self, env: Envelope, handle: Option<Handle>);
}

impl<F> Transmit for F
where
    F: Fn(Envelope, Option<Handle>) + Send + Sync + 'static,
{
    fn transmit(&self, env: Envelope, handle: Option<Handle>) {
        self(env, handle)
    }
}
