//! Protocol modules.
//!
//! - `envelope`: the wire unit (`t`/`v`/`s`/`r`/`e`).
//! - `line`: newline-delimited JSON framing for byte streams.
//! - `wire_error`: flattening of errors into transmissible mappings.
//!
//! All decoders are panic-free: malformed input is dropped or reported as
//! `JmsgError`, never indexed blindly.

pub mod envelope;
pub mod line;
pub mod wire_error;
