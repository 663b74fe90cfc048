// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::clock::FakeClock;

fn broker() -> LocalBroker<FakeClock> {
    LocalBroker::new(FakeClock::new(), Duration::from_millis(500))
}

#[tokio::test]
async fn publish_then_pull_delivers_in_order() {
    let b = broker();
    b.publish("tasks.default.http", b"a".to_vec()).await.unwrap();
    b.publish("tasks.default.http", b"b".to_vec()).await.unwrap();

    let d1 = b.pull("tasks.default.http").await.unwrap().unwrap();
    let d2 = b.pull("tasks.default.http").await.unwrap().unwrap();

    assert_eq!(d1.payload, b"a");
    assert_eq!(d2.payload, b"b");
    assert!(b.pull("tasks.default.http").await.unwrap().is_none());
}

#[tokio::test]
async fn publish_rejects_payload_over_notification_budget() {
    let b = broker();
    let big = vec![0u8; NOTIFICATION_BUDGET_BYTES + 1];

    let err = b.publish("tasks.default.http", big).await;

    assert!(matches!(err, Err(BrokerError::PayloadTooLarge { .. })));
}

#[tokio::test]
async fn ack_removes_delivery_permanently() {
    let b = broker();
    b.publish("t", b"x".to_vec()).await.unwrap();
    let d = b.pull("t").await.unwrap().unwrap();

    b.ack("t", d.delivery_id).await.unwrap();

    assert!(b.ack("t", d.delivery_id).await.is_err());
}

#[tokio::test]
async fn nak_requeues_for_immediate_redelivery_with_incremented_attempt() {
    let b = broker();
    b.publish("t", b"x".to_vec()).await.unwrap();
    let d = b.pull("t").await.unwrap().unwrap();
    assert_eq!(d.attempt, 1);

    b.nak("t", d.delivery_id).await.unwrap();
    let redelivered = b.pull("t").await.unwrap().unwrap();

    assert_eq!(redelivered.attempt, 2);
}

#[tokio::test]
async fn unacked_delivery_is_redelivered_after_timeout_elapses() {
    let clock = FakeClock::new();
    let b = LocalBroker::new(clock.clone(), Duration::from_millis(1_000));
    b.publish("t", b"x".to_vec()).await.unwrap();
    let d = b.pull("t").await.unwrap().unwrap();
    assert!(b.pull("t").await.unwrap().is_none());

    clock.advance(Duration::from_millis(1_001));
    let redelivered = b.pull("t").await.unwrap().unwrap();

    assert_eq!(redelivered.delivery_id, d.delivery_id);
    assert_eq!(redelivered.attempt, 2);
}

#[tokio::test]
async fn kv_put_if_absent_only_succeeds_once() {
    let b = broker();
    assert!(b.kv_put_if_absent("k", b"1".to_vec(), None).await.unwrap());
    assert!(!b.kv_put_if_absent("k", b"2".to_vec(), None).await.unwrap());
    assert_eq!(b.kv_get("k").await.unwrap(), Some(b"1".to_vec()));
}

#[tokio::test]
async fn kv_compare_and_set_only_succeeds_on_matching_expected() {
    let b = broker();
    b.kv_put("k", b"1".to_vec(), None).await.unwrap();

    assert!(!b.kv_compare_and_set("k", Some(b"wrong".to_vec()), b"2".to_vec(), None).await.unwrap());
    assert!(b.kv_compare_and_set("k", Some(b"1".to_vec()), b"2".to_vec(), None).await.unwrap());
    assert_eq!(b.kv_get("k").await.unwrap(), Some(b"2".to_vec()));
}

#[tokio::test]
async fn kv_entry_expires_after_ttl() {
    let clock = FakeClock::new();
    let b = LocalBroker::new(clock.clone(), Duration::from_millis(500));
    b.kv_put("k", b"1".to_vec(), Some(Duration::from_millis(100))).await.unwrap();
    assert_eq!(b.kv_get("k").await.unwrap(), Some(b"1".to_vec()));

    clock.advance(Duration::from_millis(101));

    assert_eq!(b.kv_get("k").await.unwrap(), None);
}

#[tokio::test]
async fn request_reply_round_trips() {
    let b = std::sync::Arc::new(broker());
    let responder = b.clone();
    let handle = tokio::spawn(async move {
        loop {
            if let Some(d) = responder.pull("gateway.callback.req-1").await.unwrap() {
                let mut reply = d.payload;
                reply.extend_from_slice(b"-ack");
                responder.respond("gateway.callback.req-1", reply).await.unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let reply = b.request("gateway.callback.req-1", b"hello".to_vec(), Duration::from_secs(1)).await.unwrap();
    handle.await.unwrap();

    assert_eq!(reply, b"hello-ack");
}

#[tokio::test]
async fn request_times_out_when_nobody_responds() {
    let b = broker();

    let err = b.request("nobody.home", b"x".to_vec(), Duration::from_millis(20)).await;

    assert!(matches!(err, Err(BrokerError::RequestTimeout { .. })));
}
