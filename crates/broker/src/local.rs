// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`BrokerAdapter`]: an in-process event bus generalized
//! from one fixed channel into subject-keyed queues plus a shared K/V
//! map. See DESIGN.md for why no `async-nats`/`tonic` dependency was
//! added as a default backend.

use crate::adapter::{enforce_budget, BrokerAdapter, BrokerError, Delivery};
use noetl_core::clock::Clock;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::oneshot;

struct QueuedMessage {
    id: u64,
    payload: Vec<u8>,
    attempt: u32,
}

#[derive(Default)]
struct Queue {
    next_id: u64,
    pending: VecDeque<QueuedMessage>,
    in_flight: HashMap<u64, (QueuedMessage, u64)>,
}

struct KvEntry {
    value: Vec<u8>,
    expires_at: Option<u64>,
}

/// The in-process default [`BrokerAdapter`]. A real durable broker is a
/// documented extension point behind the same trait; this is the
/// grounded default for tests and single-process deployments.
pub struct LocalBroker<C: Clock> {
    clock: C,
    redelivery_timeout_ms: u64,
    queues: Mutex<HashMap<String, Queue>>,
    kv: Mutex<HashMap<String, KvEntry>>,
    #[allow(clippy::type_complexity)]
    waiters: Mutex<HashMap<String, VecDeque<oneshot::Sender<Vec<u8>>>>>,
}

impl<C: Clock> LocalBroker<C> {
    pub fn new(clock: C, redelivery_timeout: Duration) -> Self {
        Self {
            clock,
            redelivery_timeout_ms: redelivery_timeout.as_millis() as u64,
            queues: Mutex::new(HashMap::new()),
            kv: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    fn requeue_expired(queue: &mut Queue, now: u64) {
        let expired: Vec<u64> = queue
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some((mut msg, _)) = queue.in_flight.remove(&id) {
                msg.attempt += 1;
                queue.pending.push_back(msg);
            }
        }
    }

    fn kv_live(&self, kv: &HashMap<String, KvEntry>, key: &str, now: u64) -> Option<Vec<u8>> {
        kv.get(key).filter(|e| e.expires_at.is_none_or(|exp| exp > now)).map(|e| e.value.clone())
    }
}

#[async_trait::async_trait]
impl<C: Clock> BrokerAdapter for LocalBroker<C> {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        enforce_budget(&payload)?;
        let mut queues = self.queues.lock();
        let queue = queues.entry(subject.to_string()).or_default();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.pending.push_back(QueuedMessage { id, payload, attempt: 1 });
        Ok(())
    }

    async fn pull(&self, subject: &str) -> Result<Option<Delivery>, BrokerError> {
        let now = self.clock.epoch_ms();
        let mut queues = self.queues.lock();
        let queue = queues.entry(subject.to_string()).or_default();
        Self::requeue_expired(queue, now);
        let Some(msg) = queue.pending.pop_front() else {
            return Ok(None);
        };
        let delivery = Delivery { delivery_id: msg.id, payload: msg.payload.clone(), attempt: msg.attempt };
        let deadline = now + self.redelivery_timeout_ms;
        queue.in_flight.insert(msg.id, (msg, deadline));
        Ok(Some(delivery))
    }

    async fn ack(&self, subject: &str, delivery_id: u64) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let queue = queues.entry(subject.to_string()).or_default();
        queue
            .in_flight
            .remove(&delivery_id)
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownDelivery { subject: subject.to_string(), delivery_id })
    }

    async fn nak(&self, subject: &str, delivery_id: u64) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let queue = queues.entry(subject.to_string()).or_default();
        let (mut msg, _) = queue
            .in_flight
            .remove(&delivery_id)
            .ok_or(BrokerError::UnknownDelivery { subject: subject.to_string(), delivery_id })?;
        msg.attempt += 1;
        queue.pending.push_front(msg);
        Ok(())
    }

    async fn kv_put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), BrokerError> {
        enforce_budget(&value)?;
        let now = self.clock.epoch_ms();
        let expires_at = ttl.map(|d| now + d.as_millis() as u64);
        self.kv.lock().insert(key.to_string(), KvEntry { value, expires_at });
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        let now = self.clock.epoch_ms();
        let kv = self.kv.lock();
        Ok(self.kv_live(&kv, key, now))
    }

    async fn kv_delete(&self, key: &str) -> Result<(), BrokerError> {
        self.kv.lock().remove(key);
        Ok(())
    }

    async fn kv_put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool, BrokerError> {
        enforce_budget(&value)?;
        let now = self.clock.epoch_ms();
        let mut kv = self.kv.lock();
        if self.kv_live(&kv, key, now).is_some() {
            return Ok(false);
        }
        let expires_at = ttl.map(|d| now + d.as_millis() as u64);
        kv.insert(key.to_string(), KvEntry { value, expires_at });
        Ok(true)
    }

    async fn kv_compare_and_set(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, BrokerError> {
        enforce_budget(&new_value)?;
        let now = self.clock.epoch_ms();
        let mut kv = self.kv.lock();
        let current = self.kv_live(&kv, key, now);
        if current != expected {
            return Ok(false);
        }
        let expires_at = ttl.map(|d| now + d.as_millis() as u64);
        kv.insert(key.to_string(), KvEntry { value: new_value, expires_at });
        Ok(true)
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, BrokerError> {
        enforce_budget(&payload)?;
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().entry(subject.to_string()).or_default().push_back(tx);
        self.publish(subject, payload).await?;
        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| BrokerError::RequestTimeout { subject: subject.to_string() })?
            .map_err(|_| BrokerError::Unavailable("responder dropped".into()))
    }

    async fn respond(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        enforce_budget(&payload)?;
        let waiter = self.waiters.lock().get_mut(subject).and_then(|q| q.pop_front());
        match waiter {
            Some(tx) => {
                let _ = tx.send(payload);
                Ok(())
            }
            None => Err(BrokerError::Unavailable(format!("no waiter on {subject}"))),
        }
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
