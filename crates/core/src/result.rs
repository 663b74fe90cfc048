// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result Store data model: logical references to out-of-band payloads
//! and the manifests that aggregate loop iteration results.

use crate::event::CombineStrategy;
use crate::id::{ExecutionId, ResultId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How long a [`ResultRef`] lives and who is responsible for expiring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultScope {
    Step,
    Execution,
    Workflow,
    Permanent,
}

/// Which physical backend a [`ResultRef`] is stored in. Chosen by the
/// tier-selection heuristic in the Result Store (hint, then size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    Inline,
    EventLog,
    BrokerKv,
    ObjectStore,
}

/// Correlation keys that let a caller find a specific part of a
/// fan-out's output without reading the whole manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
}

/// A logical pointer to a step result stored out-of-band, per the
/// external interface's URI format:
/// `noetl://execution/<execution_id>/result/<name>/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRef {
    pub id: ResultId,
    pub execution_id: ExecutionId,
    pub name: String,
    pub scope: ResultScope,
    pub tier: StorageTier,
    pub physical_uri: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<Value>,
    #[serde(default, skip_serializing_if = "is_default_correlation")]
    pub correlation: CorrelationKeys,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

fn is_default_correlation(c: &CorrelationKeys) -> bool {
    c == &CorrelationKeys::default()
}

impl ResultRef {
    /// The `noetl://...` URI other components use to refer to this
    /// result from an event's `result` field or a rendered template.
    pub fn uri(&self) -> String {
        format!(
            "noetl://execution/{}/result/{}/{}",
            self.execution_id, self.name, self.id
        )
    }

    /// A permanent-scope ref never expires; all others must have either
    /// an `expires_at` or be owned by an execution that will eventually
    /// terminate — invariant 4 of the data model.
    pub fn is_permanent(&self) -> bool {
        self.scope == ResultScope::Permanent
    }
}

/// One part of a [`Manifest`]: a single iteration's result, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPart {
    pub part_index: u64,
    pub result_ref: ResultRef,
}

/// An ordered collection of result parts aggregated from a loop's
/// iterations, closed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: ResultId,
    pub execution_id: ExecutionId,
    pub strategy: CombineStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_path: Option<String>,
    pub parts: Vec<ManifestPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

/// Errors a manifest mutation can fail with; these enforce invariant 5
/// (closed exactly once, parts strictly increasing) independent of the
/// storage backend.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest is already closed")]
    AlreadyClosed,
    #[error("part_index {given} is not greater than the last part_index {last}")]
    PartIndexNotIncreasing { given: u64, last: u64 },
}

impl Manifest {
    pub fn new(id: ResultId, execution_id: ExecutionId, strategy: CombineStrategy, merge_path: Option<String>) -> Self {
        Self {
            id,
            execution_id,
            strategy,
            merge_path,
            parts: Vec::new(),
            completed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Append a part. Parts must have strictly increasing `part_index`
    /// and cannot be added once the manifest is closed.
    pub fn push_part(&mut self, part_index: u64, result_ref: ResultRef) -> Result<(), ManifestError> {
        if self.is_closed() {
            return Err(ManifestError::AlreadyClosed);
        }
        if let Some(last) = self.parts.last() {
            if part_index <= last.part_index {
                return Err(ManifestError::PartIndexNotIncreasing { given: part_index, last: last.part_index });
            }
        }
        self.parts.push(ManifestPart { part_index, result_ref });
        Ok(())
    }

    /// Close the manifest at the given time. Idempotent closing is
    /// rejected, not silently ignored, so a caller's double-close bug
    /// surfaces immediately.
    pub fn close(&mut self, now_epoch_ms: u64) -> Result<(), ManifestError> {
        if self.is_closed() {
            return Err(ManifestError::AlreadyClosed);
        }
        self.completed_at = Some(now_epoch_ms);
        Ok(())
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
