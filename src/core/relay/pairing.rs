// src/core/relay/pairing.rs

//! The bidirectional producer/consumer pairing index.
//!
//! Unpaired producers are kept in an ordered queue keyed by their registration
//! sequence, so `request_pairing` always hands out the oldest registered
//! producer that is currently free. A producer whose consumer leaves goes back
//! to its original place in that queue.

use super::ConnectionId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct PairingIndex {
    producer_to_consumer: HashMap<ConnectionId, ConnectionId>,
    consumer_to_producer: HashMap<ConnectionId, ConnectionId>,
    /// Registration sequence of every known producer.
    producer_seq: HashMap<ConnectionId, u64>,
    /// Unpaired producers, oldest registration first.
    available: BTreeMap<u64, ConnectionId>,
    next_seq: u64,
}

impl PairingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a registered producer eligible for pairing. Adding the same
    /// producer twice keeps its original position.
    pub fn add_producer(&mut self, producer: ConnectionId) {
        if self.producer_seq.contains_key(&producer) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.producer_seq.insert(producer, seq);
        if !self.producer_to_consumer.contains_key(&producer) {
            self.available.insert(seq, producer);
        }
    }

    /// Forgets a producer entirely, unwinding its pairing if it has one.
    pub fn remove_producer(&mut self, producer: ConnectionId) {
        self.unpair(producer);
        if let Some(seq) = self.producer_seq.remove(&producer) {
            self.available.remove(&seq);
        }
    }

    /// Pairs `consumer` with the oldest unpaired producer and returns it.
    ///
    /// A consumer that is already paired gets its current producer back and no
    /// new pairing is made.
    pub fn request_pairing(&mut self, consumer: ConnectionId) -> Option<ConnectionId> {
        if let Some(producer) = self.consumer_to_producer.get(&consumer) {
            return Some(*producer);
        }
        let (_, producer) = self.available.pop_first()?;
        self.producer_to_consumer.insert(producer, consumer);
        self.consumer_to_producer.insert(consumer, producer);
        Some(producer)
    }

    /// The live partner of a connection in either direction.
    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.producer_to_consumer
            .get(&id)
            .or_else(|| self.consumer_to_producer.get(&id))
            .copied()
    }

    /// Removes any pairing involving `id`, in either role. Returns the removed
    /// `(producer, consumer)` pair, or `None` if `id` was not paired.
    pub fn unpair(&mut self, id: ConnectionId) -> Option<(ConnectionId, ConnectionId)> {
        let (producer, consumer) = if let Some(consumer) = self.producer_to_consumer.get(&id) {
            (id, *consumer)
        } else if let Some(producer) = self.consumer_to_producer.get(&id) {
            (*producer, id)
        } else {
            return None;
        };

        self.producer_to_consumer.remove(&producer);
        self.consumer_to_producer.remove(&consumer);
        if let Some(seq) = self.producer_seq.get(&producer) {
            self.available.insert(*seq, producer);
        }
        Some((producer, consumer))
    }

    /// Removes the pairing only if it is still exactly `producer <-> consumer`.
    pub fn unpair_exact(&mut self, producer: ConnectionId, consumer: ConnectionId) -> bool {
        if self.producer_to_consumer.get(&producer) == Some(&consumer) {
            self.unpair(producer);
            true
        } else {
            false
        }
    }

    pub fn is_paired(&self, id: ConnectionId) -> bool {
        self.partner_of(id).is_some()
    }

    pub fn is_known_producer(&self, id: ConnectionId) -> bool {
        self.producer_seq.contains_key(&id)
    }

    /// References `id` in any role, paired or not.
    pub fn references(&self, id: ConnectionId) -> bool {
        self.is_known_producer(id)
            || self.producer_to_consumer.values().any(|c| *c == id)
            || self.consumer_to_producer.contains_key(&id)
            || self.available.values().any(|p| *p == id)
    }

    /// Active pairings as `(producer, consumer)`.
    pub fn pairs(&self) -> impl Iterator<Item = (ConnectionId, ConnectionId)> + '_ {
        self.producer_to_consumer.iter().map(|(p, c)| (*p, *c))
    }

    pub fn pair_count(&self) -> usize {
        self.producer_to_consumer.len()
    }

    pub fn unpaired_producer_count(&self) -> usize {
        self.available.len()
    }
}
