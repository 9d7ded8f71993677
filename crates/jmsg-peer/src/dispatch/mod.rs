//! Handler table exports.
//!
//! Re-exports the handler trait and table so downstream consumers can depend
//! on this module directly.

pub mod handlers;

pub use handlers::{Handler, HandlerTable};
