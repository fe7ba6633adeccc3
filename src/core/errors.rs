// src/core/errors.rs

//! Defines the primary error type for the entire application.

use crate::core::relay::ConnectionId;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// The main error enum, representing all possible failures within the relay.
///
/// Every variant is scoped to the connection that triggered it; none of them
/// is allowed to tear down another connection's state.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// A frame that is not a JSON object or lacks a usable shape.
    #[error("Invalid message format")]
    Protocol(String),

    #[error("Unknown action")]
    UnknownAction(String),

    #[error("Frame exceeds the maximum allowed length")]
    FrameTooLong,

    #[error("Connection {0} is not registered with the relay")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} already exists")]
    DuplicateConnection(ConnectionId),

    #[error("Already registered")]
    AlreadyRegistered,

    #[error("{0}")]
    RoleViolation(&'static str),

    #[error("Account '{0}' does not exist")]
    UnknownIdentity(String),

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::Protocol(s) => RelayError::Protocol(s.clone()),
            RelayError::UnknownAction(s) => RelayError::UnknownAction(s.clone()),
            RelayError::FrameTooLong => RelayError::FrameTooLong,
            RelayError::UnknownConnection(id) => RelayError::UnknownConnection(*id),
            RelayError::DuplicateConnection(id) => RelayError::DuplicateConnection(*id),
            RelayError::AlreadyRegistered => RelayError::AlreadyRegistered,
            RelayError::RoleViolation(s) => RelayError::RoleViolation(s),
            RelayError::UnknownIdentity(s) => RelayError::UnknownIdentity(s.clone()),
            RelayError::Storage(s) => RelayError::Storage(s.clone()),
            RelayError::Internal(s) => RelayError::Internal(s.clone()),
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.to_string() == e2.to_string(),
            (RelayError::Protocol(s1), RelayError::Protocol(s2)) => s1 == s2,
            (RelayError::UnknownAction(s1), RelayError::UnknownAction(s2)) => s1 == s2,
            (RelayError::UnknownConnection(a), RelayError::UnknownConnection(b)) => a == b,
            (RelayError::DuplicateConnection(a), RelayError::DuplicateConnection(b)) => a == b,
            (RelayError::RoleViolation(s1), RelayError::RoleViolation(s2)) => s1 == s2,
            (RelayError::UnknownIdentity(s1), RelayError::UnknownIdentity(s2)) => s1 == s2,
            (RelayError::Storage(s1), RelayError::Storage(s2)) => s1 == s2,
            (RelayError::Internal(s1), RelayError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl RelayError {
    /// True for errors that should be reported to the peer while keeping the
    /// connection open. Everything else ends the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::Protocol(_)
                | RelayError::UnknownAction(_)
                | RelayError::AlreadyRegistered
                | RelayError::RoleViolation(_)
                | RelayError::UnknownIdentity(_)
                | RelayError::Storage(_)
        )
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Protocol(e.to_string())
    }
}

impl From<LinesCodecError> for RelayError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => RelayError::FrameTooLong,
            LinesCodecError::Io(io) => RelayError::from(io),
        }
    }
}

impl From<axum::Error> for RelayError {
    fn from(e: axum::Error) -> Self {
        RelayError::Io(Arc::new(std::io::Error::other(e)))
    }
}
