// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Loop/Aggregator: bounded-concurrency admission over a loop's
//! collection, and manifest assembly from the event log
//! once every iteration has reported in. The K/V only ever holds a small
//! counter record — iteration results live in the event log and result
//! store, never in the broker.

use noetl_broker::{BrokerAdapter, BrokerError};
use noetl_core::event::{CombineStrategy, EventKind, ResultValue};
use noetl_core::id::{ExecutionId, ResultId};
use noetl_storage::result_store::{PutHints, ResultBackend, ResultStore, ResultStoreError};
use noetl_storage::wal::{EventFilter, EventLogStore, WalError};
use noetl_core::result::Manifest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    ResultStore(#[from] ResultStoreError),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("loop {0}:{1} has no counter record")]
    MissingCounter(ExecutionId, String),
}

/// The only thing the broker's K/V holds per loop — never per-iteration
/// values. The K/V holds only a small counter record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopCounter {
    pub total: u64,
    pub completed: u64,
    pub next_index: u64,
}

/// What to do after one iteration reports completion: which further
/// indices (if any) the sliding window now admits, and whether the
/// whole loop is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopProgress {
    pub admit: Vec<u64>,
    pub done: bool,
}

fn kv_key(execution_id: ExecutionId, loop_name: &str) -> String {
    format!("loop:{}:{}", execution_id.as_u64(), loop_name)
}

pub struct LoopAggregator<Br: BrokerAdapter> {
    broker: Arc<Br>,
}

impl<Br: BrokerAdapter> LoopAggregator<Br> {
    pub fn new(broker: Arc<Br>) -> Self {
        Self { broker }
    }

    /// Start a loop over a `collection_size`-element collection, bounded
    /// to `concurrency` in-flight iterations, and return the indices
    /// admitted right away.
    pub async fn start(
        &self,
        execution_id: ExecutionId,
        loop_name: &str,
        collection_size: u64,
        concurrency: u32,
    ) -> Result<Vec<u64>, LoopError> {
        let admitted = collection_size.min(concurrency as u64);
        let counter = LoopCounter { total: collection_size, completed: 0, next_index: admitted };
        let payload = serde_json::to_vec(&counter)?;
        self.broker.kv_put(&kv_key(execution_id, loop_name), payload, None).await?;
        Ok((0..admitted).collect())
    }

    async fn read_counter(&self, execution_id: ExecutionId, loop_name: &str) -> Result<(LoopCounter, Vec<u8>), LoopError> {
        let key = kv_key(execution_id, loop_name);
        let raw = self.broker.kv_get(&key).await?.ok_or_else(|| LoopError::MissingCounter(execution_id, loop_name.to_string()))?;
        let counter: LoopCounter = serde_json::from_slice(&raw)?;
        Ok((counter, raw))
    }

    /// Record one more completed iteration and admit the next index, if
    /// the collection isn't exhausted — a CAS retry loop against the
    /// broker's K/V, since multiple iterations can complete concurrently.
    pub async fn on_iteration_complete(&self, execution_id: ExecutionId, loop_name: &str) -> Result<LoopProgress, LoopError> {
        let key = kv_key(execution_id, loop_name);
        loop {
            let (counter, raw) = self.read_counter(execution_id, loop_name).await?;
            let completed = counter.completed + 1;
            let admit: Vec<u64> = if counter.next_index < counter.total { vec![counter.next_index] } else { Vec::new() };
            let next_index = counter.next_index + admit.len() as u64;
            let updated = LoopCounter { total: counter.total, completed, next_index };
            let new_payload = serde_json::to_vec(&updated)?;
            let swapped = self.broker.kv_compare_and_set(&key, Some(raw), new_payload, None).await?;
            if swapped {
                return Ok(LoopProgress { admit, done: completed >= counter.total });
            }
        }
    }
}

/// Assemble a loop's manifest from the `step.completed` events its
/// iterations emitted, once [`LoopAggregator::on_iteration_complete`]
/// reports `done`.
#[allow(clippy::too_many_arguments)]
pub fn build_manifest<Rb: ResultBackend>(
    event_log: &EventLogStore,
    result_store: &ResultStore<Rb>,
    execution_id: ExecutionId,
    loop_name: &str,
    manifest_id: ResultId,
    strategy: CombineStrategy,
    merge_path: Option<String>,
    completed_at: u64,
) -> Result<Manifest, LoopError> {
    let filter = EventFilter { node_id: None, event_type: Some("step.completed"), loop_name: Some(loop_name.to_string()) };
    let mut events = event_log.filter(execution_id, &filter)?;
    events.sort_by_key(|e| match &e.kind {
        EventKind::StepCompleted { current_index, .. } => current_index.unwrap_or(u64::MAX),
        _ => u64::MAX,
    });

    for event in &events {
        let EventKind::StepCompleted { result, current_index, .. } = &event.kind else { continue };
        let Some(index) = current_index else { continue };
        let payload = match result {
            Some(ResultValue::Inline(v)) => v.clone(),
            Some(ResultValue::Ref { reference }) => result_store.resolve(&serde_json::Value::String(reference.clone()))?,
            None => serde_json::Value::Null,
        };
        let part_id = ResultId::new(event.event_id.as_u64());
        result_store.put_part(
            manifest_id,
            execution_id,
            strategy,
            merge_path.clone(),
            part_id,
            format!("{loop_name}[{index}]"),
            *index,
            payload,
            PutHints::default(),
        )?;
    }

    Ok(result_store.close_manifest(manifest_id, completed_at)?)
}

#[cfg(test)]
#[path = "loop_state_tests.rs"]
mod tests;
