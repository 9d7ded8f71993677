//! Wire envelope (one protocol message).
//!
//! Field names are single letters on the wire. Every field is optional and
//! unknown fields are ignored so peers can extend the format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number assigned to an outbound message that expects a reply.
pub type Seq = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Action/event type name (`t`).
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Payload (`v`).
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Present iff the sender registered a reply callback (`s`).
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<Seq>,
    /// Sequence number this message replies to (`r`).
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Seq>,
    /// Serialized error carried by a failing reply (`e`).
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Envelope {
    /// Fresh action/event.
    pub fn action(action: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            action: Some(action.into()),
            value,
            ..Self::default()
        }
    }

    /// Reply to `seq`.
    pub fn reply(seq: Seq, error: Option<Value>, value: Option<Value>) -> Self {
        Self {
            reply_to: Some(seq),
            error,
            value,
            ..Self::default()
        }
    }

    /// True if the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.seq.is_some()
    }

    /// True if this is a reply rather than a named action.
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}
