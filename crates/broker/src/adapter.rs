// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker capability surface the rest of the workspace depends on.
//! Kept broker-agnostic: a real durable broker (NATS JetStream, SQS,
//! etc.) can implement this trait without the engine/dispatcher/worker
//! noticing the difference.

use std::time::Duration;

/// The default notification budget: published notifications and K/V
/// values are bounded by this static size, enforced at publish time
/// regardless of what the underlying broker's own hard limit is.
pub const NOTIFICATION_BUDGET_BYTES: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("payload of {size} bytes exceeds the {budget}-byte notification budget")]
    PayloadTooLarge { size: usize, budget: usize },
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("request to {subject} timed out")]
    RequestTimeout { subject: String },
    #[error("no such delivery {delivery_id} on {subject}")]
    UnknownDelivery { subject: String, delivery_id: u64 },
}

/// One pulled message, carrying the id a consumer must `ack`/`nak`
/// against to close out (or requeue) at-least-once delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: u64,
    pub payload: Vec<u8>,
    pub attempt: u32,
}

/// The capability surface the engine, dispatcher, loop aggregator, and
/// worker runtime consume from a durable message broker.
#[async_trait::async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Publish a message to `subject`. Rejects payloads over
    /// [`NOTIFICATION_BUDGET_BYTES`] — the engine must never ask the
    /// broker to carry a full step result.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Pull the next undelivered (or redelivery-due) message for
    /// `subject`, if any. Competing consumers on the same subject each
    /// get a disjoint subset — this is a work queue, not a fanout.
    async fn pull(&self, subject: &str) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge successful processing of a delivery, removing it
    /// from the in-flight set for good.
    async fn ack(&self, subject: &str, delivery_id: u64) -> Result<(), BrokerError>;

    /// Negatively acknowledge a delivery, making it immediately
    /// available for redelivery.
    async fn nak(&self, subject: &str, delivery_id: u64) -> Result<(), BrokerError>;

    /// Unconditional K/V write with optional TTL.
    async fn kv_put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), BrokerError>;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, BrokerError>;

    async fn kv_delete(&self, key: &str) -> Result<(), BrokerError>;

    /// Write `value` only if `key` has no live entry. Returns whether
    /// the write happened — the primitive the engine's per-execution
    /// lease acquisition is built on.
    async fn kv_put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool, BrokerError>;

    /// Compare-and-swap: write `new_value` only if the current value
    /// equals `expected` (`None` meaning "absent"). Returns whether the
    /// write happened — backs lease renewal and the loop aggregator's
    /// `increment_completed_count` CAS loop.
    async fn kv_compare_and_set(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, BrokerError>;

    /// Send a request on `subject` and block for a reply on the
    /// matching callback, up to `timeout` — the short blocking round-
    /// trip primitive.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, BrokerError>;

    /// Deliver a reply to the oldest outstanding `request` on `subject`.
    async fn respond(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

pub(crate) fn enforce_budget(payload: &[u8]) -> Result<(), BrokerError> {
    if payload.len() > NOTIFICATION_BUDGET_BYTES {
        return Err(BrokerError::PayloadTooLarge { size: payload.len(), budget: NOTIFICATION_BUDGET_BYTES });
    }
    Ok(())
}
