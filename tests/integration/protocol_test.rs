// tests/integration/protocol_test.rs

//! Integration tests for registration, error replies and connection-level
//! behavior (greeting, idle timeout, shutdown).

use super::test_helpers::{ANN, TestContext};
use posture_relay::config::Config;
use posture_relay::core::RelayError;
use posture_relay::core::relay::{ConnectionState, Role};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_register_returns_client_id() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    let reply = client.register("producer", None).await;
    assert_eq!(reply["status"], "success");
    assert!(reply["clientId"].is_string());
    assert_eq!(
        ctx.state.hub.state_of(client.id()),
        ConnectionState::Registered(Role::Producer)
    );
}

#[tokio::test]
async fn test_reregistration_is_rejected() {
    let ctx = TestContext::new().await;
    let mut client = ctx.consumer(Some(ANN)).await;

    let reply = client.register("producer", None).await;
    assert_eq!(reply["status"], "failure");
    assert_eq!(reply["message"], "Already registered");

    assert_eq!(
        ctx.state.hub.state_of(client.id()),
        ConnectionState::Registered(Role::Consumer)
    );

    // The original identity still decides where readings are stored.
    let mut producer = ctx.producer().await;
    client.connect_to_producer().await;
    producer.send(json!({"action": "update", "posture": {"overall": "GOOD"}}));
    client.recv().await;
    assert_eq!(producer.recv().await["status"], "success");
    assert_eq!(ctx.stored_readings(ANN).await.len(), 1);
}

#[tokio::test]
async fn test_legacy_registration_without_action() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    client.send(json!({"type": "client", "email": ANN}));
    let reply = client.recv().await;
    assert_eq!(reply["action"], "register_response");
    assert_eq!(reply["status"], "success");

    let mut device = ctx.connect().await;
    device.send(json!({"action": "register", "type": "device"}));
    assert_eq!(device.recv().await["status"], "success");
    assert_eq!(ctx.state.hub.snapshot().producers, 1);
    assert_eq!(ctx.state.hub.snapshot().consumers, 1);
}

#[tokio::test]
async fn test_malformed_frames_get_error_and_keep_connection() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    for frame in ["not json", "[1,2]", "\"text\"", "{\"email\":\"x\"}"] {
        client.send_raw(frame);
        let reply = client.recv().await;
        assert_eq!(reply["action"], "error");
        assert_eq!(reply["message"], "Invalid message format");
    }

    // Still usable afterwards.
    assert_eq!(client.register("producer", None).await["status"], "success");
}

#[tokio::test]
async fn test_unknown_action() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    client.send(json!({"action": "dance"}));
    let reply = client.recv().await;
    assert_eq!(reply, json!({"action": "error", "message": "Unknown action"}));
}

#[tokio::test]
async fn test_unregistered_measurement_is_a_role_violation() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    client.send(json!({"action": "update", "posture": {}}));
    assert_eq!(client.recv().await["action"], "error");
}

#[tokio::test]
async fn test_request_device_id() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;

    client.send(json!({"action": "request_device_id"}));
    let first = client.recv().await;
    client.send(json!({"action": "request_device_id"}));
    let second = client.recv().await;

    assert_eq!(first["action"], "device_id");
    let id = first["device_id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert_ne!(first["device_id"], second["device_id"]);
}

#[tokio::test]
async fn test_greeting_can_be_disabled() {
    let mut config = Config::default();
    config.relay.greet_on_connect = false;
    let ctx = TestContext::with_config(config).await;
    let mut client = ctx.connect().await;

    client.expect_silence().await;
    assert_eq!(client.register("consumer", None).await["status"], "success");
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let mut config = Config::default();
    config.connection.idle_timeout = Some(Duration::from_millis(200));
    let ctx = TestContext::with_config(config).await;
    let mut client = ctx.connect().await;
    client.register("producer", None).await;
    let id = client.id();

    client.wait_closed().await.unwrap();
    assert!(ctx.state.hub.is_forgotten(id));
}

#[tokio::test]
async fn test_shutdown_signal_closes_connections() {
    let ctx = TestContext::new().await;
    let producer = ctx.producer().await;
    let mut consumer = ctx.consumer(None).await;
    consumer.connect_to_producer().await;

    ctx.shutdown_tx.send(()).unwrap();
    let (p, c) = (producer.id(), consumer.id());
    producer.wait_closed().await.unwrap();
    consumer.wait_closed().await.unwrap();

    assert!(ctx.state.hub.is_forgotten(p));
    assert!(ctx.state.hub.is_forgotten(c));
    assert_eq!(ctx.state.hub.snapshot().connections, 0);
}

#[tokio::test]
async fn test_transport_error_closes_only_that_connection() {
    let ctx = TestContext::new().await;
    let producer = ctx.producer().await;
    let mut consumer = ctx.consumer(None).await;
    consumer.connect_to_producer().await;

    let mut broken = ctx.producer().await;
    let broken_id = broken.id();
    broken.fail_with(RelayError::FrameTooLong);
    let reply = broken.recv().await;
    assert_eq!(reply["action"], "error");
    broken.wait_closed().await.unwrap();

    assert!(ctx.state.hub.is_forgotten(broken_id));
    assert_eq!(ctx.partner_of(&consumer), Some(producer.id()));
}
