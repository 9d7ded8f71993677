//! Peer config loader (strict parsing).

pub mod schema;

use std::fs;

use jmsg_core::error::{JmsgError, Result};

pub use schema::{PeerConfig, PeerSection};

pub fn load_from_file(path: &str) -> Result<PeerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| JmsgError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<PeerConfig> {
    let cfg: PeerConfig = serde_yaml::from_str(s)
        .map_err(|e| JmsgError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
