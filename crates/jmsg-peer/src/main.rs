//! jmsg peer server.
//!
//! - Loads `jmsg.yaml` (or the path given as the first argument)
//! - Listens on TCP and speaks newline-delimited JSON on each connection
//! - `--stdio`: runs as a child peer over stdin/stdout instead
//! - Built-in actions: `ping` replies `"pong"`, `echo` replies its payload
//!
//! Logs go to stderr; in `--stdio` mode stdout carries only protocol lines.

use std::net::SocketAddr;

use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use jmsg_core::error::{JmsgError, Result};
use jmsg_peer::config::{self, PeerConfig};
use jmsg_peer::transport::line::{self, LineOptions};
use jmsg_peer::transport::process;
use jmsg_peer::HandlerTable;

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--stdio") {
        run_stdio().await;
        return;
    }

    let path = arg.unwrap_or_else(|| "jmsg.yaml".to_string());
    if let Err(e) = run(&path).await {
        tracing::error!(error = %e, "jmsg-peer failed");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let listen: SocketAddr = cfg
        .peer
        .listen
        .parse()
        .map_err(|e| JmsgError::BadRequest(format!("peer.listen must be a valid SocketAddr: {e}")))?;

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| JmsgError::Internal(format!("bind failed: {e}")))?;
    tracing::info!(%listen, "jmsg-peer starting");

    loop {
        let (socket, remote) = listener
            .accept()
            .await
            .map_err(|e| JmsgError::Internal(format!("accept failed: {e}")))?;
        serve(socket, remote, &cfg);
    }
}

async fn run_stdio() {
    let correlator = process::stdio(builtin_handlers());
    tracing::debug!("serving on stdio");
    correlator.closed().await;
}

fn serve(socket: tokio::net::TcpStream, remote: SocketAddr, cfg: &PeerConfig) {
    let handlers = builtin_handlers();
    let correlator = line::stream_with(socket, handlers, LineOptions::from(&cfg.peer));
    correlator.set_timeout(cfg.peer.timeout());
    tracing::info!(%remote, "peer connected");

    tokio::spawn(async move {
        correlator.closed().await;
        tracing::info!(%remote, "peer disconnected");
    });
}

fn builtin_handlers() -> HandlerTable {
    HandlerTable::new()
        .with("ping", |_, reply, _| reply.ok(json!("pong")))
        .with("echo", |value, reply, _| reply.ok(value))
}
