// src/core/relay/lifecycle.rs

//! The connection lifecycle manager.
//!
//! `RelayHub` is the only owner of the `ConnectionRegistry` and the
//! `PairingIndex`. Both live behind a single mutex, and every public method is
//! one critical section, so no caller can ever observe a connection that is
//! half registered, half paired or half removed. The lock is synchronous and
//! is never held across an `.await`.

use super::pairing::PairingIndex;
use super::registry::{Connection, ConnectionRegistry};
use super::{ConnectionId, Role, Transport};
use crate::core::RelayError;
use crate::core::metrics;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// The lifecycle state of a single connection, derived from the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered(Role),
    Paired(Role),
    Closed,
}

/// Point-in-time counts, used for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    pub connections: usize,
    pub producers: usize,
    pub consumers: usize,
    pub pairings: usize,
    pub unpaired_producers: usize,
}

#[derive(Debug, Default)]
struct HubInner {
    registry: ConnectionRegistry,
    pairing: PairingIndex,
}

impl HubInner {
    fn publish_gauges(&self) {
        metrics::ACTIVE_PAIRINGS.set(self.pairing.pair_count() as f64);
        metrics::REGISTERED_PRODUCERS.set(self.registry.count_role(Role::Producer) as f64);
        metrics::REGISTERED_CONSUMERS.set(self.registry.count_role(Role::Consumer) as f64);
    }
}

#[derive(Debug)]
pub struct RelayHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assigns a fresh id to a newly accepted socket and records it as
    /// `Connecting`.
    pub fn accept(&self, addr: SocketAddr, transport: Transport) -> Result<ConnectionId, RelayError> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock();
        inner.registry.register(id, addr, transport)?;
        debug!("Connection {} from {} entered the registry.", id, addr);
        Ok(id)
    }

    /// Handles a registration message. Producers become eligible for pairing
    /// as soon as they are registered.
    pub fn register(
        &self,
        id: ConnectionId,
        role: Role,
        identity: Option<String>,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.lock();
        inner.registry.set_role(id, role, identity)?;
        if role == Role::Producer {
            inner.pairing.add_producer(id);
        }
        inner.publish_gauges();
        info!("Connection {} registered as {}.", id, role);
        Ok(())
    }

    /// Handles a consumer's connect request. Returns the producer it is now
    /// paired with, or `None` if no producer is free at the moment.
    pub fn connect_to_producer(&self, id: ConnectionId) -> Result<Option<ConnectionId>, RelayError> {
        let mut inner = self.inner.lock();
        let conn = inner
            .registry
            .find(id)
            .ok_or(RelayError::UnknownConnection(id))?;
        if conn.role != Role::Consumer {
            return Err(RelayError::RoleViolation(
                "Only registered consumers may connect to a producer",
            ));
        }
        let producer = inner.pairing.request_pairing(id);
        inner.publish_gauges();
        match producer {
            Some(p) => info!("Consumer {} connected to producer {}.", id, p),
            None => debug!("Consumer {} found no free producer.", id),
        }
        Ok(producer)
    }

    /// Handles an explicit unpair request from either side. Returns the pair
    /// that was dissolved, if any.
    pub fn disconnect(
        &self,
        id: ConnectionId,
    ) -> Result<Option<(ConnectionId, ConnectionId)>, RelayError> {
        let mut inner = self.inner.lock();
        let conn = inner
            .registry
            .find(id)
            .ok_or(RelayError::UnknownConnection(id))?;
        if !conn.is_registered() {
            return Err(RelayError::RoleViolation(
                "Register before disconnecting from a producer",
            ));
        }
        let removed = inner.pairing.unpair(id);
        inner.publish_gauges();
        if let Some((p, c)) = removed {
            info!("Pairing {} <-> {} dissolved on request of {}.", p, c, id);
        }
        Ok(removed)
    }

    /// Removes any pairing involving `id`. Idempotent.
    pub fn unpair(&self, id: ConnectionId) -> Option<(ConnectionId, ConnectionId)> {
        let mut inner = self.inner.lock();
        let removed = inner.pairing.unpair(id);
        inner.publish_gauges();
        removed
    }

    /// Drops the pairing `producer <-> consumer` only if it still exists. Used
    /// when a relay attempt finds the consumer's transport already closed, so
    /// that a newer pairing made in the meantime is left alone.
    pub fn drop_stale_pairing(&self, producer: ConnectionId, consumer: ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        let dropped = inner.pairing.unpair_exact(producer, consumer);
        inner.publish_gauges();
        if dropped {
            info!(
                "Dropped stale pairing {} <-> {}: consumer transport is closed.",
                producer, consumer
            );
        }
        dropped
    }

    /// Unwinds the pairing and then removes the connection from the registry,
    /// in one critical section. Calling it twice is harmless.
    pub fn close(&self, id: ConnectionId) -> Option<Connection> {
        let mut inner = self.inner.lock();
        if let Some((p, c)) = inner.pairing.unpair(id) {
            info!("Pairing {} <-> {} dissolved: connection {} closed.", p, c, id);
        }
        inner.pairing.remove_producer(id);
        let removed = inner.registry.remove(id);
        inner.publish_gauges();
        removed
    }

    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.inner.lock().pairing.partner_of(id)
    }

    /// Resolves the current partner of `id` together with its entry.
    pub fn resolve_partner(&self, id: ConnectionId) -> Option<Connection> {
        let inner = self.inner.lock();
        let partner = inner.pairing.partner_of(id)?;
        inner.registry.find(partner).cloned()
    }

    pub fn state_of(&self, id: ConnectionId) -> ConnectionState {
        let inner = self.inner.lock();
        match inner.registry.find(id) {
            None => ConnectionState::Closed,
            Some(conn) if !conn.is_registered() => ConnectionState::Connecting,
            Some(conn) if inner.pairing.is_paired(id) => ConnectionState::Paired(conn.role),
            Some(conn) => ConnectionState::Registered(conn.role),
        }
    }

    /// True if neither the registry nor the pairing index mentions `id`.
    pub fn is_forgotten(&self, id: ConnectionId) -> bool {
        let inner = self.inner.lock();
        !inner.registry.contains(id) && !inner.pairing.references(id)
    }

    /// Active pairings as `(producer, consumer)`.
    pub fn pairs(&self) -> Vec<(ConnectionId, ConnectionId)> {
        self.inner.lock().pairing.pairs().collect()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let inner = self.inner.lock();
        HubSnapshot {
            connections: inner.registry.len(),
            producers: inner.registry.count_role(Role::Producer),
            consumers: inner.registry.count_role(Role::Consumer),
            pairings: inner.pairing.pair_count(),
            unpaired_producers: inner.pairing.unpaired_producer_count(),
        }
    }
}
