// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::relay::{ConnectionId, RelayHub};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Closes the connection in the hub when the connection's task ends, however
/// it ends (peer hang-up, protocol error, shutdown or panic).
pub struct ConnectionGuard {
    hub: Arc<RelayHub>,
    id: ConnectionId,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(hub: Arc<RelayHub>, id: ConnectionId, addr: SocketAddr) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self { hub, id, addr }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        match self.hub.close(self.id) {
            Some(conn) => debug!(
                "Connection {} from {} closed after {:?}.",
                self.id,
                self.addr,
                conn.connected_at.elapsed()
            ),
            None => debug!(
                "Connection {} from {} was already gone from the registry.",
                self.id, self.addr
            ),
        }
    }
}
