//! Shared error types across jmsg crates.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::wire_error::serialize_error;

/// Stable error codes (carried in the serialized `code` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No reply arrived within the configured window.
    Timeout,
    /// A reply referenced a sequence number with no pending call.
    UnknownSequenceNumber,
    /// A request named a type absent from the handler table.
    NoSuchAction,
    /// Attempted to reply to a message that expected no reply.
    NoReplyExpected,
    /// The channel closed while a call was outstanding, or was already closed.
    ConnectionClosed,
    /// Invalid input / malformed configuration.
    BadRequest,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal failure (I/O, encoding).
    Internal,
}

impl ErrorCode {
    /// String representation used in serialized errors.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::UnknownSequenceNumber => "UNKNOWN_SEQ",
            ErrorCode::NoSuchAction => "NO_SUCH_ACTION",
            ErrorCode::NoReplyExpected => "NO_REPLY_EXPECTED",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, JmsgError>;

/// Unified error type used by core and peer.
///
/// The protocol variants display the exact message text peers expect on the
/// wire (`"Timeout"`, `"No such action"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JmsgError {
    #[error("Timeout")]
    Timeout,
    #[error("Unknown sequence number")]
    UnknownSequenceNumber,
    #[error("No such action")]
    NoSuchAction,
    #[error("No reply expected")]
    NoReplyExpected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl JmsgError {
    /// Map to the stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            JmsgError::Timeout => ErrorCode::Timeout,
            JmsgError::UnknownSequenceNumber => ErrorCode::UnknownSequenceNumber,
            JmsgError::NoSuchAction => ErrorCode::NoSuchAction,
            JmsgError::NoReplyExpected => ErrorCode::NoReplyExpected,
            JmsgError::ConnectionClosed => ErrorCode::ConnectionClosed,
            JmsgError::BadRequest(_) => ErrorCode::BadRequest,
            JmsgError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            JmsgError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// The `err` argument handed to reply callbacks.
///
/// Faults raised on this side stay typed (`Local`). Faults received from the
/// peer are delivered exactly as they arrived in the envelope's `e` field
/// (`Wire`); they are not reconstructed into richer types.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Local(JmsgError),
    Wire(Value),
}

impl Fault {
    /// Serialize an arbitrary error for transmission.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Fault::Wire(serialize_error(err).to_value())
    }

    /// Human-readable message.
    ///
    /// For wire faults this is the `message` field of a serialized error, the
    /// string itself for a bare string, or the JSON text otherwise.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Fault::Local(e) => Cow::Owned(e.to_string()),
            Fault::Wire(Value::String(s)) => Cow::Borrowed(s),
            Fault::Wire(v) => match v.get("message").and_then(Value::as_str) {
                Some(m) => Cow::Borrowed(m),
                None => Cow::Owned(v.to_string()),
            },
        }
    }

    /// Stable code, if known.
    pub fn code(&self) -> Option<&str> {
        match self {
            Fault::Local(e) => Some(e.code().as_str()),
            Fault::Wire(v) => v.get("code").and_then(Value::as_str),
        }
    }

    /// True if this fault carries `code`, whether raised locally or by the peer.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code() == Some(code.as_str())
    }

    /// Value placed in an envelope's `e` field.
    pub fn to_wire(&self) -> Value {
        match self {
            Fault::Local(e) => serialize_error(e).to_value(),
            Fault::Wire(v) => v.clone(),
        }
    }
}

impl From<JmsgError> for Fault {
    fn from(e: JmsgError) -> Self {
        Fault::Local(e)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Fault {}
