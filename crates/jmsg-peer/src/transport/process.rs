//! Parent/child control channel over the child's stdio.
//!
//! The parent spawns the child with piped stdin/stdout and speaks the line
//! protocol over them; the child speaks it over its own stdio. When the child
//! exits its stdout reaches EOF, which closes the parent's correlator.

use std::process::Stdio;

use tokio::process::{Child, Command};

use jmsg_core::error::{JmsgError, Result};

use crate::correlator::Correlator;
use crate::dispatch::HandlerTable;
use crate::transport::line::{self, LineOptions};

/// Spawn `command` as a child peer.
pub fn spawn(command: Command, handlers: HandlerTable) -> Result<(Correlator, Child)> {
    spawn_with(command, handlers, LineOptions::default())
}

pub fn spawn_with(mut command: Command, handlers: HandlerTable, opts: LineOptions) -> Result<(Correlator, Child)> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| JmsgError::Internal(format!("spawn child failed: {e}")))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| JmsgError::Internal("child stdin not piped".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| JmsgError::Internal("child stdout not piped".into()))?;

    tracing::debug!(pid = ?child.id(), "spawned child peer");
    Ok((line::streams_with(stdout, stdin, handlers, opts), child))
}

/// Child side: talk to the parent over this process's stdin/stdout.
pub fn stdio(handlers: HandlerTable) -> Correlator {
    line::streams(tokio::io::stdin(), tokio::io::stdout(), handlers)
}
