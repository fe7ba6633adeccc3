// tests/integration/pairing_test.rs

//! Integration tests for pairing: connect_to_producer, disconnect_from_producer
//! and first-available producer selection.

use super::test_helpers::{ANN, BOB, TestContext};
use serde_json::json;

#[tokio::test]
async fn test_consumer_pairs_with_registered_producer() {
    let ctx = TestContext::new().await;
    let producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;

    let reply = consumer.connect_to_producer().await;
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["message"], "Connected to Device");

    assert_eq!(ctx.partner_of(&consumer), Some(producer.id()));
    assert_eq!(ctx.partner_of(&producer), Some(consumer.id()));
}

#[tokio::test]
async fn test_connect_without_producers_fails_softly() {
    let ctx = TestContext::new().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;

    let reply = consumer.connect_to_producer().await;
    assert_eq!(reply["status"], "failure");
    assert_eq!(reply["message"], "Unable to Connect");
    assert_eq!(ctx.partner_of(&consumer), None);

    // The connection stays usable.
    let _producer = ctx.producer().await;
    assert_eq!(consumer.connect_to_producer().await["status"], "success");
}

#[tokio::test]
async fn test_producer_close_unwinds_pairing() {
    let ctx = TestContext::new().await;
    let producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    let producer_id = producer.id();
    producer.close().await;

    assert_eq!(ctx.partner_of(&consumer), None);
    assert!(ctx.state.hub.is_forgotten(producer_id));
    assert_eq!(consumer.connect_to_producer().await["status"], "failure");
}

#[tokio::test]
async fn test_two_producers_two_consumers_first_available() {
    let ctx = TestContext::new().await;
    let p1 = ctx.producer().await;
    let p2 = ctx.producer().await;
    let mut c1 = ctx.consumer(Some(ANN)).await;
    let mut c2 = ctx.consumer(Some(BOB)).await;

    assert_eq!(c1.connect_to_producer().await["status"], "success");
    assert_eq!(c2.connect_to_producer().await["status"], "success");

    assert_eq!(ctx.partner_of(&c1), Some(p1.id()));
    assert_eq!(ctx.partner_of(&c2), Some(p2.id()));
    assert_eq!(ctx.state.hub.snapshot().pairings, 2);
}

#[tokio::test]
async fn test_paired_consumer_reconnect_is_idempotent() {
    let ctx = TestContext::new().await;
    let p1 = ctx.producer().await;
    let _p2 = ctx.producer().await;
    let mut consumer = ctx.consumer(None).await;

    consumer.connect_to_producer().await;
    let reply = consumer.connect_to_producer().await;
    assert_eq!(reply["status"], "success");
    assert_eq!(ctx.partner_of(&consumer), Some(p1.id()));
    assert_eq!(ctx.state.hub.snapshot().pairings, 1);
    assert_eq!(ctx.state.hub.snapshot().unpaired_producers, 1);
}

#[tokio::test]
async fn test_freed_producer_is_offered_again() {
    let ctx = TestContext::new().await;
    let p1 = ctx.producer().await;
    let mut c1 = ctx.consumer(None).await;
    let mut c2 = ctx.consumer(None).await;

    c1.connect_to_producer().await;
    assert_eq!(c2.connect_to_producer().await["status"], "failure");

    c1.close().await;
    assert_eq!(c2.connect_to_producer().await["status"], "success");
    assert_eq!(ctx.partner_of(&c2), Some(p1.id()));
}

#[tokio::test]
async fn test_disconnect_from_producer() {
    let ctx = TestContext::new().await;
    let producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    consumer.send(json!({"action": "disconnect_from_producer"}));
    let reply = consumer.recv().await;
    assert_eq!(reply["action"], "disconnect_from_producer_result");
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["message"], "Disconnected");
    assert_eq!(ctx.partner_of(&producer), None);

    consumer.send(json!({"action": "disconnect_from_producer"}));
    let reply = consumer.recv().await;
    assert_eq!(reply["status"], "failure");
    assert_eq!(reply["message"], "Not connected");
}

#[tokio::test]
async fn test_producer_may_end_its_pairing() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(None).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "disconnect_from_producer"}));
    assert_eq!(producer.recv().await["status"], "success");
    assert_eq!(ctx.partner_of(&consumer), None);
}

#[tokio::test]
async fn test_producer_cannot_request_pairing() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;

    producer.send(json!({"action": "connect_to_producer"}));
    let reply = producer.recv().await;
    assert_eq!(reply["action"], "error");
    assert_eq!(
        reply["message"],
        "Only registered consumers may connect to a producer"
    );
}

#[tokio::test]
async fn test_unregistered_connection_cannot_request_pairing() {
    let ctx = TestContext::new().await;
    let _producer = ctx.producer().await;
    let mut stranger = ctx.connect().await;

    stranger.send(json!({"action": "connect_to_producer"}));
    assert_eq!(stranger.recv().await["action"], "error");
    assert_eq!(ctx.state.hub.snapshot().pairings, 0);
}
