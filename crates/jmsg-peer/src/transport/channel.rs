//! Message-channel transport.
//!
//! Carries envelope values (plus optional side-channel handles) instead of
//! bytes, so nothing is encoded. Works over any `Stream`/`Sink` pair; `pair`
//! links two correlators inside one process.

use std::fmt::Display;

use futures_util::{sink, stream, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use jmsg_core::error::JmsgError;
use jmsg_core::protocol::envelope::Envelope;

use crate::correlator::{Correlator, Handle};
use crate::dispatch::HandlerTable;

/// One message on the channel.
pub type Packet = (Envelope, Option<Handle>);

/// Attach a correlator to a channel. The correlator closes when `inbound`
/// ends or `outbound` fails.
pub fn attach<St, Si>(inbound: St, outbound: Si, handlers: HandlerTable) -> Correlator
where
    St: Stream<Item = Packet> + Send + Unpin + 'static,
    Si: Sink<Packet> + Send + Unpin + 'static,
    Si::Error: Display + Send,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Packet>();

    let correlator = Correlator::new(
        move |env, handle| {
            if out_tx.send((env, handle)).is_err() {
                tracing::trace!("channel writer gone, dropping envelope");
            }
        },
        handlers,
    );

    tokio::spawn(forward_out(out_rx, outbound, correlator.clone()));
    tokio::spawn(forward_in(inbound, correlator.clone()));

    correlator
}

/// Two correlators wired to each other in-process.
///
/// Closing either side ends the channel, which closes the other side too.
pub fn pair(left: HandlerTable, right: HandlerTable) -> (Correlator, Correlator) {
    let (to_left, left_rx) = mpsc::unbounded_channel::<Packet>();
    let (to_right, right_rx) = mpsc::unbounded_channel::<Packet>();

    let l = attach(receiver_stream(left_rx), sender_sink(to_right), left);
    let r = attach(receiver_stream(right_rx), sender_sink(to_left), right);
    (l, r)
}

async fn forward_in<St>(mut inbound: St, correlator: Correlator)
where
    St: Stream<Item = Packet> + Unpin,
{
    while let Some((env, handle)) = inbound.next().await {
        correlator.dispatch(env, handle);
    }
    tracing::debug!("channel ended");
    correlator.close(None);
}

async fn forward_out<Si>(mut out_rx: mpsc::UnboundedReceiver<Packet>, mut outbound: Si, correlator: Correlator)
where
    Si: Sink<Packet> + Unpin,
    Si::Error: Display,
{
    while let Some(packet) = out_rx.recv().await {
        if let Err(e) = outbound.send(packet).await {
            tracing::warn!(error = %e, "channel send failed");
            correlator.close(None);
            break;
        }
    }
    let _ = outbound.close().await;
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<Packet>) -> impl Stream<Item = Packet> + Send + Unpin {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|packet| (packet, rx))
    }))
}

fn sender_sink(tx: mpsc::UnboundedSender<Packet>) -> impl Sink<Packet, Error = JmsgError> + Send + Unpin {
    Box::pin(sink::unfold(tx, |tx, packet: Packet| async move {
        tx.send(packet).map_err(|_| JmsgError::ConnectionClosed)?;
        Ok::<_, JmsgError>(tx)
    }))
}
