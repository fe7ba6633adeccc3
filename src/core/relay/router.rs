// src/core/relay/router.rs

//! Forwards producer measurements to the paired consumer and hands readings to
//! the account store.

use super::{ConnectionId, RelayHub};
use crate::core::RelayError;
use crate::core::accounts::AccountStore;
use crate::core::metrics;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// The result of relaying one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Forwarded to the consumer's outbound queue.
    Delivered {
        consumer: ConnectionId,
        identity: Option<String>,
    },
    /// The producer is not paired. The measurement is dropped.
    NoPartner,
    /// The consumer's outbound queue was full. The measurement is dropped for
    /// the live view; the pairing stays.
    ConsumerLagging {
        consumer: ConnectionId,
        identity: Option<String>,
    },
    /// The consumer's transport had already closed. The pairing was dropped.
    StalePartner {
        consumer: ConnectionId,
        identity: Option<String>,
    },
}

impl DeliveryOutcome {
    /// The identity of the consumer the measurement was meant for, if a
    /// partner was resolved at all.
    pub fn consumer_identity(&self) -> Option<Option<&str>> {
        match self {
            DeliveryOutcome::Delivered { identity, .. }
            | DeliveryOutcome::ConsumerLagging { identity, .. }
            | DeliveryOutcome::StalePartner { identity, .. } => Some(identity.as_deref()),
            DeliveryOutcome::NoPartner => None,
        }
    }
}

/// The result of handing readings to the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PersistOutcome {
    Success,
    UnknownIdentity,
    StorageFailure,
}

/// Reads pairings through the hub and never mutates them itself; the only
/// corrective action it takes (dropping a stale pairing) is delegated back to
/// the hub.
#[derive(Debug, Clone)]
pub struct RelayRouter {
    hub: Arc<RelayHub>,
    accounts: Arc<dyn AccountStore>,
}

impl RelayRouter {
    pub fn new(hub: Arc<RelayHub>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { hub, accounts }
    }

    /// Forwards `payload` verbatim to the consumer paired with `producer`.
    ///
    /// Never waits on the consumer. The hub lock is released before the
    /// payload is queued, and a consumer whose queue is full loses this
    /// measurement instead of stalling the producer's task. Whatever is queued
    /// reaches the consumer in the order the producer sent it.
    pub fn route_measurement(&self, producer: ConnectionId, payload: &str) -> DeliveryOutcome {
        let Some(consumer) = self.hub.resolve_partner(producer) else {
            metrics::MEASUREMENTS_DROPPED_TOTAL
                .with_label_values(&["no_partner"])
                .inc();
            debug!("Producer {} has no partner; dropping measurement.", producer);
            return DeliveryOutcome::NoPartner;
        };

        match consumer.transport.try_send(payload.to_string()) {
            Ok(()) => {
                metrics::MEASUREMENTS_RELAYED_TOTAL.inc();
                DeliveryOutcome::Delivered {
                    consumer: consumer.id,
                    identity: consumer.identity,
                }
            }
            Err(TrySendError::Full(_)) => {
                metrics::MEASUREMENTS_DROPPED_TOTAL
                    .with_label_values(&["consumer_lagging"])
                    .inc();
                debug!(
                    "Consumer {} is not keeping up with producer {}; dropping measurement.",
                    consumer.id, producer
                );
                DeliveryOutcome::ConsumerLagging {
                    consumer: consumer.id,
                    identity: consumer.identity,
                }
            }
            Err(TrySendError::Closed(_)) => {
                metrics::MEASUREMENTS_DROPPED_TOTAL
                    .with_label_values(&["stale_partner"])
                    .inc();
                warn!(
                    "Consumer {} paired with producer {} is gone; unpairing.",
                    consumer.id, producer
                );
                self.hub.drop_stale_pairing(producer, consumer.id);
                DeliveryOutcome::StalePartner {
                    consumer: consumer.id,
                    identity: consumer.identity,
                }
            }
        }
    }

    /// Appends readings to the account identified by `identity`.
    pub async fn persist(&self, identity: Option<&str>, readings: Vec<Value>) -> PersistOutcome {
        let outcome = match identity {
            None => PersistOutcome::UnknownIdentity,
            Some(identity) => match self.accounts.append_readings(identity, readings).await {
                Ok(()) => PersistOutcome::Success,
                Err(RelayError::UnknownIdentity(_)) => PersistOutcome::UnknownIdentity,
                Err(e) => {
                    warn!("Failed to persist readings for '{}': {}", identity, e);
                    PersistOutcome::StorageFailure
                }
            },
        };
        metrics::PERSIST_OUTCOMES_TOTAL
            .with_label_values(&[outcome.as_ref()])
            .inc();
        outcome
    }
}
