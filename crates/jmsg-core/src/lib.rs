//! jmsg core: transport-agnostic protocol primitives and the error surface.
//!
//! This crate defines the wire envelope, its newline-delimited JSON framing,
//! the protocol error taxonomy, and the serialization applied to errors before
//! they cross the wire. It carries no runtime dependencies so it can be reused
//! by any transport or peer implementation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input is reported as `JmsgError` or dropped, never a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

pub use error::{ErrorCode, Fault, JmsgError, Result};
pub use protocol::envelope::Envelope;
pub use protocol::wire_error::{serialize_error, SerializedError};
