// src/core/protocol/client_message.rs

//! Parsing of inbound frames.

use crate::core::RelayError;
use crate::core::relay::Role;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register { role: Role, email: Option<String> },
    ConnectToProducer,
    DisconnectFromProducer,
    /// A measurement from a producer. `readings` is what gets persisted; the
    /// frame itself is relayed verbatim.
    Measurement { readings: Vec<Value> },
    RequestDeviceId,
}

/// The fields the relay looks at. Anything else in the frame is carried along
/// untouched.
#[derive(Deserialize, Debug, Default)]
struct Envelope {
    action: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    email: Option<String>,
}

impl ClientMessage {
    /// Parses and classifies one text frame.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let mut value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(RelayError::Protocol("frame is not a JSON object".into()));
        }
        let envelope = Envelope::deserialize(&value)?;

        let Some(action) = envelope.action.as_deref() else {
            // Older clients register with a bare `{ type, email }` object.
            return match envelope.kind {
                Some(kind) => Self::register(&kind, envelope.email),
                None => Err(RelayError::Protocol("frame has no action".into())),
            };
        };

        match action {
            "register" => {
                let kind = envelope
                    .kind
                    .ok_or_else(|| RelayError::Protocol("register requires a type".into()))?;
                Self::register(&kind, envelope.email)
            }
            "connect_to_producer" => Ok(ClientMessage::ConnectToProducer),
            "disconnect_from_producer" => Ok(ClientMessage::DisconnectFromProducer),
            "request_device_id" => Ok(ClientMessage::RequestDeviceId),
            "update" | "send_data_to_consumer" => {
                let posture = value.get_mut("posture").map(Value::take);
                let readings = match posture {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => vec![value],
                    Some(reading) => vec![reading],
                };
                Ok(ClientMessage::Measurement { readings })
            }
            other => Err(RelayError::UnknownAction(other.to_string())),
        }
    }

    fn register(kind: &str, email: Option<String>) -> Result<Self, RelayError> {
        let role = Role::from_str(kind)
            .ok()
            .filter(|r| *r != Role::Unset)
            .ok_or_else(|| RelayError::Protocol(format!("unknown registration type '{kind}'")))?;
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        Ok(ClientMessage::Register { role, email })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::ConnectToProducer => "connect_to_producer",
            ClientMessage::DisconnectFromProducer => "disconnect_from_producer",
            ClientMessage::Measurement { .. } => "update",
            ClientMessage::RequestDeviceId => "request_device_id",
        }
    }
}
