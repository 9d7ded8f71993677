//! Newline-delimited JSON over a byte stream.
//!
//! - Reader task: bounded line reads, lenient decode, dispatch; EOF or read
//!   error closes the correlator.
//! - Writer task: drains the outbound queue one line at a time, flushing after
//!   each so compressing or buffering writers deliver promptly.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;

use jmsg_core::protocol::envelope::Envelope;
use jmsg_core::protocol::line::{decode_line, encode_line};

use crate::config::PeerSection;
use crate::correlator::Correlator;
use crate::dispatch::HandlerTable;

/// Framing limits.
#[derive(Debug, Clone, Copy)]
pub struct LineOptions {
    /// Longer inbound lines are discarded without decoding.
    pub max_line_bytes: usize,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024 * 1024,
        }
    }
}

impl From<&PeerSection> for LineOptions {
    fn from(cfg: &PeerSection) -> Self {
        Self {
            max_line_bytes: cfg.max_line_bytes,
        }
    }
}

/// Speak the line protocol over one duplex stream.
pub fn stream<S>(io: S, handlers: HandlerTable) -> Correlator
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    stream_with(io, handlers, LineOptions::default())
}

pub fn stream_with<S>(io: S, handlers: HandlerTable, opts: LineOptions) -> Correlator
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    streams_with(reader, writer, handlers, opts)
}

/// Speak the line protocol over a separate reader and writer.
pub fn streams<R, W>(reader: R, writer: W, handlers: HandlerTable) -> Correlator
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    streams_with(reader, writer, handlers, LineOptions::default())
}

pub fn streams_with<R, W>(reader: R, writer: W, handlers: HandlerTable, opts: LineOptions) -> Correlator
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Envelope>();

    let correlator = Correlator::new(
        move |env, _handle| {
            if out_tx.send(env).is_err() {
                tracing::trace!("line writer gone, dropping envelope");
            }
        },
        handlers,
    );

    tokio::spawn(write_loop(writer, out_rx, correlator.clone()));
    tokio::spawn(read_loop(reader, correlator.clone(), opts));

    correlator
}

async fn write_loop<W>(mut writer: W, mut out_rx: mpsc::UnboundedReceiver<Envelope>, correlator: Correlator)
where
    W: AsyncWrite + Unpin,
{
    while let Some(env) = out_rx.recv().await {
        let line = match encode_line(&env) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unencodable envelope");
                continue;
            }
        };

        let res = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = res {
            tracing::warn!(error = %e, "line write failed");
            correlator.close(None);
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn read_loop<R>(reader: R, correlator: Correlator, opts: LineOptions)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let limit = opts.max_line_bytes;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take((limit as u64).saturating_add(1))
            .read_until(b'\n', &mut buf)
            .await;

        match read {
            Ok(0) => {
                tracing::debug!("line stream ended");
                break;
            }
            Ok(_) if buf.len() > limit && buf.last() != Some(&b'\n') => {
                tracing::warn!(limit, "discarding oversize line");
                if let Err(e) = skip_line(&mut reader).await {
                    tracing::warn!(error = %e, "line read failed");
                    break;
                }
            }
            Ok(_) => {
                if let Some(env) = decode_line(&buf) {
                    correlator.dispatch(env, None);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "line read failed");
                break;
            }
        }
    }

    correlator.close(None);
}

/// Consume input up to and including the next `\n` (or EOF).
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let n = chunk.len();
                reader.consume(n);
            }
        }
    }
}
