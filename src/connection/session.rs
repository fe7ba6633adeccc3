// src/connection/session.rs

//! Defines the state associated with a single client session.

use crate::core::relay::{ConnectionId, Role};
use std::net::SocketAddr;
use tokio::time::Instant;

/// Per-connection bookkeeping owned by the connection's own task.
///
/// `role` mirrors the registry entry. It is only ever written after the hub
/// accepted the registration, so the two cannot disagree.
#[derive(Debug)]
pub struct SessionState {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub role: Role,
    pub frames_received: u64,
    pub last_activity: Instant,
}

impl SessionState {
    pub(crate) fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            role: Role::Unset,
            frames_received: 0,
            last_activity: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.frames_received += 1;
        self.last_activity = Instant::now();
    }
}
