// src/core/relay/registry.rs

//! The live set of open connections and their declared roles.

use super::{ConnectionId, Role, Transport};
use crate::core::RelayError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// One entry per open socket.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub role: Role,
    /// The account this connection reports for. Only consumers carry one.
    pub identity: Option<String>,
    pub transport: Transport,
    pub connected_at: Instant,
}

impl Connection {
    pub fn is_registered(&self) -> bool {
        self.role != Role::Unset
    }
}

/// Maps connection ids to their `Connection` entries. It never touches the wire.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh, unregistered entry.
    pub fn register(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        transport: Transport,
    ) -> Result<&Connection, RelayError> {
        if self.connections.contains_key(&id) {
            return Err(RelayError::DuplicateConnection(id));
        }
        let conn = Connection {
            id,
            addr,
            role: Role::Unset,
            identity: None,
            transport,
            connected_at: Instant::now(),
        };
        Ok(self.connections.entry(id).or_insert(conn))
    }

    /// Sets the role and identity of a connection. A role can only be set once.
    pub fn set_role(
        &mut self,
        id: ConnectionId,
        role: Role,
        identity: Option<String>,
    ) -> Result<(), RelayError> {
        if role == Role::Unset {
            return Err(RelayError::RoleViolation(
                "A connection must register as producer or consumer",
            ));
        }
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(RelayError::UnknownConnection(id))?;
        if conn.is_registered() {
            return Err(RelayError::AlreadyRegistered);
        }
        conn.role = role;
        conn.identity = identity;
        Ok(())
    }

    /// Removes a connection. Calling this for an absent id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn find(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.connections.values().filter(|c| c.role == role).count()
    }
}
