// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::session::SessionState;
use super::writer;
use crate::core::RelayError;
use crate::core::handler::action_router::{ActionRouter, RouteResponse};
use crate::core::metrics;
use crate::core::protocol::ServerMessage;
use crate::core::relay::{ConnectionId, Transport};
use crate::core::state::ServerState;
use futures::{Sink, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a closing connection waits for its writer to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one connection to completion over any framed text transport.
///
/// `frames` yields inbound frames and `sink` accepts outbound ones. The
/// connection is entered into the hub before the first frame is read and is
/// closed in the hub when this function returns, including on panic.
pub async fn serve<R, W, E>(
    frames: R,
    sink: W,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RelayError>
where
    R: Stream<Item = Result<String, RelayError>> + Unpin + Send,
    W: Sink<String, Error = E> + Unpin + Send + 'static,
    E: Send + 'static,
    RelayError: From<E>,
{
    let (tx, rx) = mpsc::channel(state.config.connection.outbound_buffer);
    let id = state.hub.accept(addr, tx.clone())?;
    state.stats.increment_total_connections();
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
    let guard = ConnectionGuard::new(state.hub.clone(), id, addr);

    let mut writer_task = tokio::spawn(writer::pump(rx, sink, addr));

    let mut handler = ConnectionHandler::new(frames, state, id, addr, tx, shutdown_rx);
    let result = handler.run().await;
    info!(
        "Connection {} from {} finished after {} frames.",
        id, addr, handler.session.frames_received
    );

    // Both remaining senders go away here: the handler's own, then the
    // registry's when the guard closes the connection in the hub.
    drop(handler);
    drop(guard);

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!("Writer for {} stopped: {}", addr, e),
        Ok(Err(e)) => warn!("Writer for {} panicked: {:?}", addr, e),
        Err(_) => {
            warn!("Writer for {} did not drain in time; aborting.", addr);
            writer_task.abort();
        }
    }
    result
}

/// Reads frames for one connection and answers them.
pub struct ConnectionHandler<R> {
    frames: R,
    state: Arc<ServerState>,
    session: SessionState,
    outbound: Transport,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<R> ConnectionHandler<R>
where
    R: Stream<Item = Result<String, RelayError>> + Unpin,
{
    pub fn new(
        frames: R,
        state: Arc<ServerState>,
        id: ConnectionId,
        addr: SocketAddr,
        outbound: Transport,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            frames,
            state,
            session: SessionState::new(id, addr),
            outbound,
            shutdown_rx,
        }
    }

    /// The main event loop for the connection, handling incoming frames and signals.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        if self.state.config.relay.greet_on_connect {
            reply(&self.outbound, ServerMessage::greeting()).await?;
        }
        let idle_timeout = self.state.config.connection.idle_timeout;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection {} received shutdown signal.", self.session.id);
                    break;
                }
                _ = idle_deadline(idle_timeout, self.session.last_activity) => {
                    info!(
                        "Connection {} from {} idle for {:?}; closing.",
                        self.session.id, self.session.addr, idle_timeout.unwrap_or_default()
                    );
                    break;
                }
                result = self.frames.next() => {
                    match result {
                        Some(Ok(frame)) => {
                            self.session.touch();
                            debug!("Connection {}: received frame: {}", self.session.id, frame);
                            self.process_frame(&frame).await?;
                        }
                        Some(Err(RelayError::FrameTooLong)) => {
                            metrics::PROTOCOL_ERRORS_TOTAL.inc();
                            warn!("Connection {} sent an oversized frame; closing.", self.session.id);
                            let _ = reply(&self.outbound, ServerMessage::from(&RelayError::FrameTooLong)).await;
                            break;
                        }
                        Some(Err(e)) if e.is_recoverable() => {
                            metrics::PROTOCOL_ERRORS_TOTAL.inc();
                            reply(&self.outbound, ServerMessage::from(&e)).await?;
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection {} closed by peer: {}", self.session.id, e);
                            } else {
                                warn!("Connection error for {}: {}", self.session.addr, e);
                            }
                            break;
                        }
                        None => {
                            debug!("Connection {} closed by peer.", self.session.id);
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Routes one frame and queues the reply, if any, for the sender.
    async fn process_frame(&mut self, frame: &str) -> Result<(), RelayError> {
        let mut router = ActionRouter::new(self.state.clone(), &mut self.session);
        match router.route(frame).await {
            Ok(RouteResponse::Single(message)) => reply(&self.outbound, message).await,
            Ok(RouteResponse::NoOp) => Ok(()),
            Err(e) if e.is_recoverable() => {
                metrics::PROTOCOL_ERRORS_TOTAL.inc();
                debug!("Connection {}: rejected frame: {:?}", self.session.id, e);
                reply(&self.outbound, ServerMessage::from(&e)).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Queues a reply on the connection's own outbound transport.
///
/// Takes the transport rather than the handler so that nothing but the sender
/// is borrowed across the await.
async fn reply(outbound: &Transport, message: ServerMessage) -> Result<(), RelayError> {
    let text = message.encode()?;
    outbound.send(text).await.map_err(|_| {
        RelayError::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "outbound queue closed",
        )))
    })
}

/// Resolves once the connection has been silent for `timeout`. Never resolves
/// when no timeout is configured.
async fn idle_deadline(timeout: Option<Duration>, last_activity: Instant) {
    match timeout {
        Some(timeout) => tokio::time::sleep_until(last_activity + timeout).await,
        None => std::future::pending().await,
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &RelayError) -> bool {
    matches!(e, RelayError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
