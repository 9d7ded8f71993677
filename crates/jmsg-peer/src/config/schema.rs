use std::time::Duration;

use jmsg_core::error::{JmsgError, Result};
use serde::Deserialize;

use crate::correlator::DEFAULT_TIMEOUT_MS;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub version: u32,

    #[serde(default)]
    pub peer: PeerSection,
}

impl PeerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(JmsgError::UnsupportedVersion);
        }
        self.peer.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-call reply timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Longer inbound lines are discarded.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            timeout_ms: default_timeout_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl PeerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=3_600_000).contains(&self.timeout_ms) {
            return Err(JmsgError::BadRequest(
                "peer.timeout_ms must be between 1 and 3600000".into(),
            ));
        }
        if !(64..=64 * 1024 * 1024).contains(&self.max_line_bytes) {
            return Err(JmsgError::BadRequest(
                "peer.max_line_bytes must be between 64 and 67108864".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_listen() -> String {
    "127.0.0.1:7411".into()
}
fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
fn default_max_line_bytes() -> usize {
    1024 * 1024
}
