// src/core/handler/action_router.rs

//! Routes one parsed inbound frame to the relay operation it names.
//!
//! The `ActionRouter` is created per frame by the `ConnectionHandler`. It
//! checks that the sender's role allows the action, calls into the hub or
//! the relay router, and turns the result into the reply for the sender.
//! Replies to other connections (the relayed measurement itself) are pushed
//! by the relay router directly onto the partner's transport.

use crate::connection::SessionState;
use crate::core::RelayError;
use crate::core::metrics;
use crate::core::protocol::server_message::{
    MSG_CONNECTED_TO_DEVICE, MSG_DISCONNECTED, MSG_NOT_CONNECTED, MSG_STORAGE_FAILURE,
    MSG_SUCCESSFUL_UPDATE, MSG_UNABLE_TO_CONNECT, MSG_USER_NOT_EXISTS,
};
use crate::core::protocol::{ClientMessage, ServerMessage, Status};
use crate::core::relay::{PersistOutcome, Role};
use crate::core::state::ServerState;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};

/// What the connection handler should send back to the frame's sender.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResponse {
    Single(ServerMessage),
    /// Nothing goes back to the sender.
    NoOp,
}

pub struct ActionRouter<'a> {
    state: Arc<ServerState>,
    session: &'a mut SessionState,
}

impl<'a> ActionRouter<'a> {
    pub fn new(state: Arc<ServerState>, session: &'a mut SessionState) -> Self {
        Self { state, session }
    }

    /// Parses `raw` and executes it. `raw` is also the exact text relayed to a
    /// consumer when the frame is a measurement.
    pub async fn route(&mut self, raw: &str) -> Result<RouteResponse, RelayError> {
        self.state.stats.increment_total_frames();
        metrics::FRAMES_PROCESSED_TOTAL.inc();

        let message = ClientMessage::parse(raw)?;
        let span = info_span!(
            "action",
            name = %message.name(),
            client.addr = %self.session.addr,
            client.id = %self.session.id,
        );

        async move {
            match message {
                ClientMessage::Register { role, email } => self.register(role, email),
                ClientMessage::ConnectToProducer => self.connect_to_producer(),
                ClientMessage::DisconnectFromProducer => self.disconnect_from_producer(),
                ClientMessage::Measurement { readings } => self.measurement(raw, readings).await,
                ClientMessage::RequestDeviceId => Ok(RouteResponse::Single(ServerMessage::DeviceId {
                    device_id: uuid::Uuid::new_v4().to_string(),
                })),
            }
        }
        .instrument(span)
        .await
    }

    fn register(&mut self, role: Role, email: Option<String>) -> Result<RouteResponse, RelayError> {
        if self.session.role != Role::Unset {
            return Err(RelayError::AlreadyRegistered);
        }
        self.state.hub.register(self.session.id, role, email)?;
        self.session.role = role;
        Ok(RouteResponse::Single(ServerMessage::RegisterResponse {
            status: Status::Success,
            client_id: Some(self.session.id.to_string()),
            message: None,
        }))
    }

    fn connect_to_producer(&mut self) -> Result<RouteResponse, RelayError> {
        let reply = match self.state.hub.connect_to_producer(self.session.id)? {
            Some(_) => ServerMessage::ConnectToProducerResult {
                status: Status::Success,
                message: MSG_CONNECTED_TO_DEVICE.to_string(),
            },
            None => ServerMessage::ConnectToProducerResult {
                status: Status::Failure,
                message: MSG_UNABLE_TO_CONNECT.to_string(),
            },
        };
        Ok(RouteResponse::Single(reply))
    }

    fn disconnect_from_producer(&mut self) -> Result<RouteResponse, RelayError> {
        let reply = match self.state.hub.disconnect(self.session.id)? {
            Some(_) => ServerMessage::DisconnectFromProducerResult {
                status: Status::Success,
                message: MSG_DISCONNECTED.to_string(),
            },
            None => ServerMessage::DisconnectFromProducerResult {
                status: Status::Failure,
                message: MSG_NOT_CONNECTED.to_string(),
            },
        };
        Ok(RouteResponse::Single(reply))
    }

    async fn measurement(
        &mut self,
        raw: &str,
        readings: Vec<Value>,
    ) -> Result<RouteResponse, RelayError> {
        if self.session.role != Role::Producer {
            return Err(RelayError::RoleViolation(
                "Only registered producers may send measurements",
            ));
        }

        let outcome = self.state.router.route_measurement(self.session.id, raw);
        let Some(identity) = outcome.consumer_identity() else {
            return Ok(RouteResponse::NoOp);
        };

        let persisted = self.state.router.persist(identity, readings).await;
        debug!("Measurement outcome: {:?}, persisted: {:?}", outcome, persisted);
        if !self.state.config.relay.persistence_ack {
            return Ok(RouteResponse::NoOp);
        }

        let (status, message) = match persisted {
            PersistOutcome::Success => (Status::Success, MSG_SUCCESSFUL_UPDATE),
            PersistOutcome::UnknownIdentity => (Status::Failure, MSG_USER_NOT_EXISTS),
            PersistOutcome::StorageFailure => (Status::Failure, MSG_STORAGE_FAILURE),
        };
        Ok(RouteResponse::Single(ServerMessage::PostureDataUpdate {
            status,
            message: message.to_string(),
        }))
    }
}
