//! jmsg peer runtime.
//!
//! This crate wires the correlation engine, the handler table, configuration,
//! and the transport adapters into a working peer. It is consumed by the
//! binary (`main.rs`), by the facade crate, and by integration tests.

pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod transport;

pub use correlator::{Continuation, Correlator, Expect, Handle, ReplyFn, Transmit};
pub use dispatch::{Handler, HandlerTable};
