// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Transient Variable Store: an in-process, write-through cache
//! of per-execution `(name -> JSON value)` pairs, typed for debugging and
//! carrying access counters and an optional TTL.
//!
//! Structurally this mirrors `result_store.rs`'s write-through-cache
//! shape: an in-memory map guarded by a single lock, keyed by
//! `(execution_id, var_name)`.

use noetl_core::id::ExecutionId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum TransientError {
    #[error("variable {0} not found")]
    NotFound(String),
}

/// How a transient variable came to exist, kept for debugging only —
/// values themselves are arbitrary JSON regardless of tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    UserDefined,
    StepResult,
    Computed,
    IteratorState,
}

#[derive(Debug, Clone)]
struct Var {
    value: Value,
    kind: VarKind,
    ttl_epoch_ms: Option<u64>,
    access_count: u64,
    accessed_at: u64,
}

/// One execution's set of transient variables.
#[derive(Debug, Clone, Default)]
pub struct TransientScope {
    vars: HashMap<String, Var>,
}

/// The Transient Variable Store: one [`TransientScope`] per execution,
/// all guarded by a single lock (contention is expected to be low —
/// reads/writes are per-step, not per-tick).
#[derive(Default)]
pub struct TransientStore {
    scopes: Mutex<HashMap<ExecutionId, TransientScope>>,
}

impl TransientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write (or overwrite) a variable. Overwriting resets the access
    /// counter, matching the "fresh value, fresh provenance" semantics a
    /// retry or re-evaluation of a `when` condition expects.
    pub fn set(
        &self,
        execution_id: ExecutionId,
        name: impl Into<String>,
        value: Value,
        kind: VarKind,
        ttl_epoch_ms: Option<u64>,
        now: u64,
    ) {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(execution_id).or_default();
        scope.vars.insert(name.into(), Var { value, kind, ttl_epoch_ms, access_count: 0, accessed_at: now });
    }

    /// Read a variable, incrementing its access counter and bumping
    /// `accessed_at`. Expired variables are treated as absent (and
    /// removed) rather than returned stale.
    pub fn get(&self, execution_id: ExecutionId, name: &str, now: u64) -> Result<Value, TransientError> {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(execution_id).or_default();
        if let Some(var) = scope.vars.get(name) {
            if var.ttl_epoch_ms.is_some_and(|ttl| ttl < now) {
                scope.vars.remove(name);
                return Err(TransientError::NotFound(name.to_string()));
            }
        }
        let var = scope.vars.get_mut(name).ok_or_else(|| TransientError::NotFound(name.to_string()))?;
        var.access_count += 1;
        var.accessed_at = now;
        Ok(var.value.clone())
    }

    pub fn access_count(&self, execution_id: ExecutionId, name: &str) -> Option<u64> {
        self.scopes.lock().get(&execution_id).and_then(|s| s.vars.get(name)).map(|v| v.access_count)
    }

    pub fn kind_of(&self, execution_id: ExecutionId, name: &str) -> Option<VarKind> {
        self.scopes.lock().get(&execution_id).and_then(|s| s.vars.get(name)).map(|v| v.kind)
    }

    /// A point-in-time snapshot of every live variable's value, for
    /// building a template rendering context. Expired entries are
    /// dropped as a side effect, same as `get` would do one at a time.
    pub fn snapshot(&self, execution_id: ExecutionId, now: u64) -> HashMap<String, Value> {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(execution_id).or_default();
        scope.vars.retain(|_, v| v.ttl_epoch_ms.is_none_or(|ttl| ttl >= now));
        scope.vars.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect()
    }

    /// Drop every variable an execution owns — called when the
    /// execution terminates.
    pub fn drop_execution(&self, execution_id: ExecutionId) {
        self.scopes.lock().remove(&execution_id);
    }

    /// Drop variables whose TTL has elapsed, across all executions.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let mut scopes = self.scopes.lock();
        let mut dropped = 0;
        for scope in scopes.values_mut() {
            let before = scope.vars.len();
            scope.vars.retain(|_, v| v.ttl_epoch_ms.is_none_or(|ttl| ttl >= now));
            dropped += before - scope.vars.len();
        }
        dropped
    }
}

#[cfg(test)]
#[path = "transient_tests.rs"]
mod tests;
