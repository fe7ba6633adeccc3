// src/connection/writer.rs

//! The per-connection writer task.

use crate::core::RelayError;
use futures::{Sink, SinkExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::debug;

/// Drains the connection's outbound queue into its socket in FIFO order.
///
/// Frames are flushed whenever the queue runs dry, so a burst of relayed
/// measurements goes out in as few writes as possible. Returns when every
/// sender is gone or the socket fails; dropping the receiver then marks the
/// transport closed for anyone still holding a sender.
pub(crate) async fn pump<W, E>(
    mut rx: mpsc::Receiver<String>,
    mut sink: W,
    addr: SocketAddr,
) -> Result<(), RelayError>
where
    W: Sink<String, Error = E> + Unpin,
    RelayError: From<E>,
{
    while let Some(frame) = rx.recv().await {
        sink.feed(frame).await?;
        if rx.is_empty() {
            sink.flush().await?;
        }
    }
    debug!("Outbound queue for {} drained; closing the writer.", addr);
    sink.close().await?;
    Ok(())
}
