// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Result Store: logical `ResultRef` pointers over a tiered
//! physical backend, chosen by a hint-then-size heuristic. The "object
//! store / DB" tier is a pluggable [`ResultBackend`] rather than a
//! concrete SDK client (see DESIGN.md).

use noetl_core::id::{ExecutionId, ResultId};
use noetl_core::result::{CorrelationKeys, Manifest, ManifestError, ResultRef, ResultScope, StorageTier};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PREVIEW_LIMIT: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ResultStoreError {
    #[error("result {0} not found")]
    NotFound(ResultId),
    #[error("manifest {0} not found")]
    ManifestNotFound(ResultId),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The pluggable physical tier backing `BrokerKv`/`ObjectStore`-tier
/// results. `Inline`/`EventLog`-tier payloads never reach a backend;
/// they are kept in the store's own in-memory map.
pub trait ResultBackend: Send + Sync {
    fn write(&self, physical_uri: &str, payload: &[u8]) -> Result<(), ResultStoreError>;
    fn read(&self, physical_uri: &str) -> Result<Vec<u8>, ResultStoreError>;
    fn delete(&self, physical_uri: &str) -> Result<(), ResultStoreError>;
}

/// Content-addressed filesystem backend: the default `ResultBackend`.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, physical_uri: &str) -> PathBuf {
        self.root.join(physical_uri.trim_start_matches("file://"))
    }
}

impl ResultBackend for FilesystemBackend {
    fn write(&self, physical_uri: &str, payload: &[u8]) -> Result<(), ResultStoreError> {
        let path = self.path_for(physical_uri);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResultStoreError::Backend(e.to_string()))?;
        }
        std::fs::write(&path, payload).map_err(|e| ResultStoreError::Backend(e.to_string()))
    }

    fn read(&self, physical_uri: &str) -> Result<Vec<u8>, ResultStoreError> {
        std::fs::read(self.path_for(physical_uri)).map_err(|e| ResultStoreError::Backend(e.to_string()))
    }

    fn delete(&self, physical_uri: &str) -> Result<(), ResultStoreError> {
        let path = self.path_for(physical_uri);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResultStoreError::Backend(e.to_string())),
        }
    }
}

/// Hint a caller may pass to `put`, short-circuiting the size-based
/// tier heuristic.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PutHints {
    pub tier: Option<StorageTier>,
    pub expires_at: Option<u64>,
    pub correlation: CorrelationKeys,
}

struct Entry {
    result_ref: ResultRef,
    inline_value: Option<Value>,
}

/// The Result Store. Ids are minted by the caller (the engine's ID
/// Allocator, C2) and handed in already formed, since allocation itself
/// is out of scope for this crate.
pub struct ResultStore<B: ResultBackend> {
    backend: B,
    inline_threshold: u64,
    kv_threshold: u64,
    entries: Mutex<HashMap<ResultId, Entry>>,
    manifests: Mutex<HashMap<ResultId, Manifest>>,
}

impl<B: ResultBackend> ResultStore<B> {
    pub fn new(backend: B, inline_threshold: u64, kv_threshold: u64) -> Self {
        Self { backend, inline_threshold, kv_threshold, entries: Mutex::new(HashMap::new()), manifests: Mutex::new(HashMap::new()) }
    }

    fn choose_tier(&self, hint: Option<StorageTier>, size: u64) -> StorageTier {
        if let Some(tier) = hint {
            return tier;
        }
        if size <= self.inline_threshold {
            StorageTier::Inline
        } else if size <= self.kv_threshold {
            StorageTier::BrokerKv
        } else {
            StorageTier::ObjectStore
        }
    }

    /// Store `payload` under `name`, returning the `ResultRef` other
    /// components address it by.
    pub fn put(
        &self,
        id: ResultId,
        execution_id: ExecutionId,
        name: impl Into<String>,
        scope: ResultScope,
        payload: Value,
        hints: PutHints,
    ) -> Result<ResultRef, ResultStoreError> {
        let name = name.into();
        let bytes = serde_json::to_vec(&payload)?;
        let size = bytes.len() as u64;
        let tier = self.choose_tier(hints.tier, size);

        let preview = if bytes.len() <= PREVIEW_LIMIT { Some(payload.clone()) } else { None };
        let physical_uri = match tier {
            StorageTier::Inline | StorageTier::EventLog => format!("mem://{id}"),
            StorageTier::BrokerKv => format!("kv://{execution_id}/{name}/{id}"),
            StorageTier::ObjectStore => format!("file://{execution_id}/{name}-{id}.json"),
        };
        if !matches!(tier, StorageTier::Inline | StorageTier::EventLog) {
            self.backend.write(&physical_uri, &bytes)?;
        }

        let result_ref = ResultRef {
            id,
            execution_id,
            name,
            scope,
            tier,
            physical_uri,
            size,
            preview,
            extracted_fields: None,
            correlation: hints.correlation,
            expires_at: hints.expires_at,
        };
        let inline_value = matches!(tier, StorageTier::Inline | StorageTier::EventLog).then(|| payload);
        self.entries.lock().insert(id, Entry { result_ref: result_ref.clone(), inline_value });
        Ok(result_ref)
    }

    /// Fetch the full payload a `ResultRef` points to.
    pub fn get(&self, result_ref: &ResultRef) -> Result<Value, ResultStoreError> {
        if matches!(result_ref.tier, StorageTier::Inline | StorageTier::EventLog) {
            let entries = self.entries.lock();
            let entry = entries.get(&result_ref.id).ok_or(ResultStoreError::NotFound(result_ref.id))?;
            return entry.inline_value.clone().ok_or(ResultStoreError::NotFound(result_ref.id));
        }
        let bytes = self.backend.read(&result_ref.physical_uri)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Resolve either a `noetl://` URI (looked up by id embedded in the
    /// URI's last path segment) or a literal inline JSON value.
    pub fn resolve(&self, ref_like: &Value) -> Result<Value, ResultStoreError> {
        match ref_like {
            Value::String(s) if s.starts_with("noetl://") => {
                let raw_id = s.rsplit('/').next().unwrap_or_default();
                let id = raw_id.parse::<u64>().map(ResultId::new).map_err(|_| ResultStoreError::Backend(format!("malformed ref: {s}")))?;
                let entries = self.entries.lock();
                let result_ref = entries.get(&id).map(|e| e.result_ref.clone()).ok_or(ResultStoreError::NotFound(id))?;
                drop(entries);
                self.get(&result_ref)
            }
            other => Ok(other.clone()),
        }
    }

    /// Start (or continue) a manifest for a loop/fan-out aggregation.
    pub fn put_part(
        &self,
        manifest_id: ResultId,
        execution_id: ExecutionId,
        strategy: noetl_core::event::CombineStrategy,
        merge_path: Option<String>,
        part_id: ResultId,
        name: impl Into<String>,
        index: u64,
        payload: Value,
        hints: PutHints,
    ) -> Result<ResultRef, ResultStoreError> {
        let part_ref = self.put(part_id, execution_id, name, ResultScope::Step, payload, hints)?;
        let mut manifests = self.manifests.lock();
        let manifest = manifests.entry(manifest_id).or_insert_with(|| Manifest::new(manifest_id, execution_id, strategy, merge_path.clone()));
        manifest.push_part(index, part_ref.clone())?;
        Ok(part_ref)
    }

    pub fn close_manifest(&self, manifest_id: ResultId, completed_at: u64) -> Result<Manifest, ResultStoreError> {
        let mut manifests = self.manifests.lock();
        let manifest = manifests.get_mut(&manifest_id).ok_or(ResultStoreError::ManifestNotFound(manifest_id))?;
        manifest.close(completed_at)?;
        Ok(manifest.clone())
    }

    /// A finite, one-shot sequence of a manifest's parts in order — not
    /// restartable.
    pub fn stream(&self, manifest_id: ResultId) -> Result<Vec<ResultRef>, ResultStoreError> {
        let manifests = self.manifests.lock();
        let manifest = manifests.get(&manifest_id).ok_or(ResultStoreError::ManifestNotFound(manifest_id))?;
        Ok(manifest.parts.iter().map(|p| p.result_ref.clone()).collect())
    }

    /// Delete every ref with scope `step` or `execution` owned by
    /// `execution_id`, and any manifests it owns.
    pub fn cleanup_execution(&self, execution_id: ExecutionId) -> Result<(), ResultStoreError> {
        let mut entries = self.entries.lock();
        let doomed: Vec<ResultId> = entries
            .iter()
            .filter(|(_, e)| e.result_ref.execution_id == execution_id && matches!(e.result_ref.scope, ResultScope::Step | ResultScope::Execution))
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            if let Some(entry) = entries.remove(&id) {
                if !matches!(entry.result_ref.tier, StorageTier::Inline | StorageTier::EventLog) {
                    self.backend.delete(&entry.result_ref.physical_uri)?;
                }
            }
        }
        drop(entries);
        self.manifests.lock().retain(|_, m| m.execution_id != execution_id);
        Ok(())
    }

    /// Background sweep: delete every ref with a past `expires_at` and
    /// non-`permanent` scope.
    pub fn sweep_expired(&self, now: u64) -> Result<usize, ResultStoreError> {
        let mut entries = self.entries.lock();
        let doomed: Vec<ResultId> = entries
            .iter()
            .filter(|(_, e)| e.result_ref.expires_at.is_some_and(|exp| exp < now) && !e.result_ref.is_permanent())
            .map(|(id, _)| *id)
            .collect();
        let count = doomed.len();
        for id in &doomed {
            if let Some(entry) = entries.remove(id) {
                if !matches!(entry.result_ref.tier, StorageTier::Inline | StorageTier::EventLog) {
                    self.backend.delete(&entry.result_ref.physical_uri)?;
                }
            }
        }
        Ok(count)
    }
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        Self { result_ref: self.result_ref.clone(), inline_value: self.inline_value.clone() }
    }
}

pub fn filesystem_backend(root: impl AsRef<Path>) -> FilesystemBackend {
    FilesystemBackend::new(root.as_ref().to_path_buf())
}

#[cfg(test)]
#[path = "result_store_tests.rs"]
mod tests;
