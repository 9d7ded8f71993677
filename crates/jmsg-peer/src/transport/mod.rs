//! Transport adapters.
//!
//! Each adapter owns the I/O tasks for one connection: it decodes inbound
//! messages into envelopes for `Correlator::dispatch`, supplies the transmit
//! function, and closes the correlator exactly when the channel ends. None of
//! them keep protocol state.
//!
//! All adapters spawn onto the current tokio runtime.

pub mod channel;
pub mod line;
pub mod process;
