// src/core/protocol/server_message.rs

//! Outbound frames. Each variant serializes to an object whose `action` field
//! names the reply.

use crate::core::RelayError;
use serde::Serialize;

pub const MSG_CONNECTED_TO_DEVICE: &str = "Connected to Device";
pub const MSG_UNABLE_TO_CONNECT: &str = "Unable to Connect";
pub const MSG_DISCONNECTED: &str = "Disconnected";
pub const MSG_NOT_CONNECTED: &str = "Not connected";
pub const MSG_SUCCESSFUL_UPDATE: &str = "Successful update";
pub const MSG_USER_NOT_EXISTS: &str = "User not exists!!";
pub const MSG_STORAGE_FAILURE: &str = "Unable to store reading";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Connected,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent as soon as a socket is accepted.
    ConnectionResponse { status: Status, message: String },
    RegisterResponse {
        status: Status,
        #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ConnectToProducerResult { status: Status, message: String },
    DisconnectFromProducerResult { status: Status, message: String },
    PostureDataUpdate { status: Status, message: String },
    DeviceId { device_id: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn greeting() -> Self {
        ServerMessage::ConnectionResponse {
            status: Status::Connected,
            message: MSG_CONNECTED_TO_DEVICE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes the message into one text frame.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::Internal(format!("Failed to encode reply: {e}")))
    }
}

impl From<&RelayError> for ServerMessage {
    /// The error reply for a recoverable error.
    fn from(e: &RelayError) -> Self {
        match e {
            RelayError::AlreadyRegistered => ServerMessage::RegisterResponse {
                status: Status::Failure,
                client_id: None,
                message: Some(e.to_string()),
            },
            other => ServerMessage::error(other.to_string()),
        }
    }
}
