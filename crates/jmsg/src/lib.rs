//! Top-level facade crate for jmsg.
//!
//! Re-exports the wire contracts and the peer runtime so users can depend on a single crate.

pub mod core {
    pub use jmsg_core::*;
}

pub mod peer {
    pub use jmsg_peer::*;
}

pub use jmsg_core::{Envelope, Fault, JmsgError};
pub use jmsg_peer::{Continuation, Correlator, Expect, HandlerTable};
