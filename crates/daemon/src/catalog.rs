// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog and schedule loading from pre-normalized JSON descriptors.
//!
//! Parsing a playbook source file into `CatalogEntry` + `Vec<Step>` is
//! out of scope here; deployments that need it run that step upstream
//! and drop the result in: one JSON file per catalog entry under
//! [`crate::env::catalog_dir`], and an optional `schedules.json`
//! listing schedule descriptors for `noetl-scheduler`.

use std::path::Path;

use async_trait::async_trait;
use noetl_core::catalog::{CatalogEntry, CatalogKind};
use noetl_core::id::{CatalogId, ExecutionId, IdAllocator};
use noetl_core::playbook::Step;
use noetl_scheduler::{Schedule, Trigger};
use noetl_worker::{SubExecutionSpawner, ToolError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::wiring::AppEngine;

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
}

/// One catalog entry as dropped on disk: everything `CatalogEntry`
/// needs, minus `id` and `created_at` (minted here) plus the step graph
/// `Engine::register_catalog` stores alongside it.
#[derive(Debug, Deserialize)]
struct CatalogDescriptor {
    path: String,
    version: String,
    kind: CatalogKind,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    content: Value,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDescriptor {
    catalog_path: String,
    #[serde(default)]
    catalog_version: Option<String>,
    #[serde(default)]
    workload: Value,
    trigger: Trigger,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Scan `dir` for `*.json` catalog descriptors and register each with
/// `engine`, minting a fresh [`CatalogId`] through `id_allocator`. A
/// missing directory is not an error — a deployment with no catalog yet
/// (or one driven entirely by `CreateExecution` against ids minted some
/// other way) simply starts with an empty catalog.
pub fn load_catalog_dir(
    dir: &Path,
    engine: &AppEngine,
    id_allocator: &dyn IdAllocator,
    now_ms: u64,
) -> Result<usize, CatalogLoadError> {
    if !dir.is_dir() {
        info!(dir = %dir.display(), "no catalog directory found, starting with an empty catalog");
        return Ok(0);
    }
    let mut loaded = 0;
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| CatalogLoadError::Read { path: dir.display().to_string(), source })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| path.file_name().is_some_and(|name| name != "schedules.json"))
        .collect();
    paths.sort();

    for path in paths {
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| CatalogLoadError::Read { path: path.display().to_string(), source })?;
        let descriptor: CatalogDescriptor = serde_json::from_str(&raw)
            .map_err(|source| CatalogLoadError::Parse { path: path.display().to_string(), source })?;
        let catalog_id: CatalogId = id_allocator.next_id().into();
        let entry = CatalogEntry {
            id: catalog_id,
            path: descriptor.path.clone(),
            version: descriptor.version,
            kind: descriptor.kind,
            content: descriptor.content,
            layout: descriptor.layout,
            created_at: now_ms,
        };
        info!(path = %descriptor.path, catalog_id = %catalog_id.as_u64(), "registered catalog entry");
        engine.register_catalog(entry, descriptor.steps);
        loaded += 1;
    }
    Ok(loaded)
}

/// Load `schedules.json` from `dir`, if present, registering each
/// schedule with `scheduler`. Absent is not an error.
pub async fn load_schedules(
    dir: &Path,
    scheduler: &crate::wiring::AppScheduler,
    id_allocator: &dyn IdAllocator,
) -> Result<usize, CatalogLoadError> {
    let path = dir.join("schedules.json");
    if !path.is_file() {
        return Ok(0);
    }
    let raw = std::fs::read_to_string(&path)
        .map_err(|source| CatalogLoadError::Read { path: path.display().to_string(), source })?;
    let descriptors: Vec<ScheduleDescriptor> = serde_json::from_str(&raw)
        .map_err(|source| CatalogLoadError::Parse { path: path.display().to_string(), source })?;

    let mut loaded = 0;
    for descriptor in descriptors {
        let id = id_allocator.next_id().into();
        let schedule = Schedule {
            id,
            catalog_path: descriptor.catalog_path.clone(),
            catalog_version: descriptor.catalog_version,
            workload: descriptor.workload,
            trigger: descriptor.trigger,
            enabled: descriptor.enabled,
        };
        if let Err(error) = scheduler.register_schedule(schedule).await {
            warn!(catalog_path = %descriptor.catalog_path, %error, "failed to register schedule");
            continue;
        }
        loaded += 1;
    }
    Ok(loaded)
}

/// Wires a worker's `sub_playbook` tool straight to `Engine::create_execution`
/// in-process, rather than through the wire RPC a separate worker process
/// would use (see `noetl_worker::registry::SubExecutionSpawner`'s doc comment).
pub struct EngineSpawner {
    pub engine: std::sync::Arc<AppEngine>,
}

#[async_trait]
impl SubExecutionSpawner for EngineSpawner {
    async fn create_sub_execution(
        &self,
        catalog_path: &str,
        catalog_version: Option<&str>,
        workload: Value,
        parent_execution_id: ExecutionId,
    ) -> Result<ExecutionId, ToolError> {
        let catalog_id = self
            .engine
            .resolve_catalog(catalog_path, catalog_version)
            .ok_or_else(|| ToolError::SubPlaybook(format!("unknown catalog path {catalog_path}")))?;
        self.engine
            .create_execution(catalog_id, workload, Some(parent_execution_id))
            .map_err(|error| ToolError::SubPlaybook(error.to_string()))
    }
}
