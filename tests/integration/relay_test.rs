// tests/integration/relay_test.rs

//! Integration tests for measurement relay and persistence.

use super::test_helpers::{ANN, BOB, TestContext};
use posture_relay::config::Config;
use serde_json::{Value, json};

#[tokio::test]
async fn test_update_is_forwarded_verbatim_and_persisted_once() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    let frame = r#"{"action":"update","posture":{"overall":"GOOD","neck":12}}"#;
    producer.send_raw(frame);

    assert_eq!(consumer.recv_raw().await, frame);

    let ack = producer.recv().await;
    assert_eq!(ack["action"], "posture_data_update");
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["message"], "Successful update");

    assert_eq!(
        ctx.stored_readings(ANN).await,
        vec![json!({"overall": "GOOD", "neck": 12})]
    );
    assert!(ctx.stored_readings(BOB).await.is_empty());
}

#[tokio::test]
async fn test_measurements_arrive_in_order() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    for n in 0..50 {
        producer.send(json!({"action": "update", "posture": {"n": n}}));
    }
    for n in 0..50 {
        let frame = consumer.recv().await;
        assert_eq!(frame["posture"]["n"], n);
    }
    for _ in 0..50 {
        assert_eq!(producer.recv().await["status"], "success");
    }

    let stored: Vec<Value> = ctx.stored_readings(ANN).await;
    let order: Vec<i64> = stored.iter().map(|r| r["n"].as_i64().unwrap()).collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_unpaired_producer_measurement_is_dropped_silently() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;

    producer.send(json!({"action": "update", "posture": {"overall": "BAD"}}));
    producer.expect_silence().await;
    assert!(ctx.stored_readings(ANN).await.is_empty());
}

#[tokio::test]
async fn test_consumer_without_identity_still_receives_data() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(None).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "update", "posture": {"overall": "BAD"}}));
    assert_eq!(consumer.recv().await["posture"]["overall"], "BAD");

    let ack = producer.recv().await;
    assert_eq!(ack["status"], "failure");
    assert_eq!(ack["message"], "User not exists!!");
}

#[tokio::test]
async fn test_unknown_account_is_reported() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some("nobody@example.com")).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "send_data_to_consumer", "posture": {"overall": "OK"}}));
    consumer.recv().await;
    assert_eq!(producer.recv().await["message"], "User not exists!!");
}

#[tokio::test]
async fn test_persistence_ack_can_be_disabled() {
    let mut config = Config::default();
    config.relay.persistence_ack = false;
    let ctx = TestContext::with_config(config).await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "update", "posture": {"overall": "GOOD"}}));
    consumer.recv().await;
    producer.expect_silence().await;
    assert_eq!(ctx.stored_readings(ANN).await.len(), 1);
}

#[tokio::test]
async fn test_array_posture_appends_each_reading() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "update", "posture": [{"n": 1}, {"n": 2}]}));
    consumer.recv().await;
    producer.recv().await;
    assert_eq!(
        ctx.stored_readings(ANN).await,
        vec![json!({"n": 1}), json!({"n": 2})]
    );
}

#[tokio::test]
async fn test_frame_without_posture_is_stored_whole() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    producer.send(json!({"action": "update", "neckAngle": {"value": 20}}));
    consumer.recv().await;
    producer.recv().await;

    let stored = ctx.stored_readings(ANN).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["neckAngle"]["value"], 20);
}

#[tokio::test]
async fn test_consumer_cannot_send_measurements() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut consumer = ctx.consumer(Some(ANN)).await;
    consumer.connect_to_producer().await;

    consumer.send(json!({"action": "update", "posture": {"overall": "BAD"}}));
    let reply = consumer.recv().await;
    assert_eq!(reply["action"], "error");
    assert_eq!(
        reply["message"],
        "Only registered producers may send measurements"
    );
    producer.expect_silence().await;
    assert!(ctx.stored_readings(ANN).await.is_empty());
}

#[tokio::test]
async fn test_measurements_follow_a_new_pairing() {
    let ctx = TestContext::new().await;
    let mut producer = ctx.producer().await;
    let mut c1 = ctx.consumer(Some(ANN)).await;
    c1.connect_to_producer().await;
    c1.close().await;

    let mut c2 = ctx.consumer(Some(BOB)).await;
    assert_eq!(c2.connect_to_producer().await["status"], "success");

    producer.send(json!({"action": "update", "posture": {"overall": "GOOD"}}));
    assert_eq!(c2.recv().await["posture"]["overall"], "GOOD");
    producer.recv().await;
    assert!(ctx.stored_readings(ANN).await.is_empty());
    assert_eq!(ctx.stored_readings(BOB).await.len(), 1);
}
