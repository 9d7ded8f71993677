//! Newline-delimited JSON framing (one envelope per line).
//!
//! Decoding is lenient: blank lines, invalid JSON, and JSON that is not an
//! object are discarded rather than reported, so one bad line never tears
//! down a connection.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::error::{JmsgError, Result};
use crate::protocol::envelope::Envelope;

/// Encode `env` as a single `\n`-terminated line.
pub fn encode_line(env: &Envelope) -> Result<Bytes> {
    let json = serde_json::to_vec(env)
        .map_err(|e| JmsgError::Internal(format!("envelope encode failed: {e}")))?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Decode one line (with or without its terminator).
pub fn decode_line(line: &[u8]) -> Option<Envelope> {
    let line = trim_ascii(line);
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!(error = %e, "discarding non-json line");
            return None;
        }
    };
    if !value.is_object() {
        tracing::trace!("discarding non-object line");
        return None;
    }

    serde_json::from_value(value)
        .map_err(|e| tracing::trace!(error = %e, "discarding malformed envelope"))
        .ok()
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if !first.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    while let [rest @ .., last] = s {
        if !last.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    s
}
