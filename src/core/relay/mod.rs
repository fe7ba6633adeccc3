// src/core/relay/mod.rs

//! The pairing and relay core: who is connected, who is paired with whom, and
//! how a producer's measurement reaches its consumer.
//!
//! `ConnectionRegistry` and `PairingIndex` are plain single-threaded data
//! structures. They are only ever mutated through `RelayHub`, which keeps both
//! behind one lock so that every lifecycle step is observed atomically.
//! `RelayRouter` reads through the hub and never mutates it directly.

pub mod lifecycle;
pub mod pairing;
pub mod registry;
pub mod router;

pub use lifecycle::{ConnectionState, HubSnapshot, RelayHub};
pub use pairing::PairingIndex;
pub use registry::{Connection, ConnectionRegistry};
pub use router::{DeliveryOutcome, PersistOutcome, RelayRouter};

use std::fmt;
use tokio::sync::mpsc;

/// The sending half of a connection's outbound queue. Each queued item is one
/// complete text frame; the connection's writer task drains it to the socket.
pub type Transport = mpsc::Sender<String>;

/// An opaque, process-unique identifier assigned to a connection at accept time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The declared role of a connection.
///
/// `device` and `client` are the role names used by older capture devices
/// and dashboards; they parse to `Producer` and `Consumer` respectively.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Role {
    #[default]
    #[strum(to_string = "unset")]
    Unset,
    #[strum(to_string = "producer", serialize = "device")]
    Producer,
    #[strum(to_string = "consumer", serialize = "client")]
    Consumer,
}
