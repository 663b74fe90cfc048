// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Event Log Store: an append-only, newline-delimited-JSON log
//! partitioned one file per `execution_id`, so that `drop_range` is an
//! O(1) directory-entry removal rather than a scan.
//!
//! Supports `open`/`append`/`entries_after` with a corruption-tolerant
//! reopen backed by bounded `.bak` rotation, one log file per
//! `execution_id` under a shared directory.

use noetl_core::event::{EventKind, StoredEvent};
use noetl_core::id::{EventId, ExecutionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const MAX_BACKUPS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A filter for `EventLogStore::filter`:
/// `filter(execution_id, node_id?|type?|status?)`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub node_id: Option<noetl_core::event::NodeId>,
    pub event_type: Option<&'static str>,
    pub loop_name: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        if let Some(ref node_id) = self.node_id {
            if event.kind.node_id() != Some(node_id) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.kind.type_name() != event_type {
                return false;
            }
        }
        if let Some(ref loop_name) = self.loop_name {
            let matches_loop = match &event.kind {
                EventKind::SinkStarted { loop_name: Some(n), .. }
                | EventKind::SinkCompleted { loop_name: Some(n), .. }
                | EventKind::StepStarted { loop_name: Some(n), .. }
                | EventKind::StepDispatched { loop_name: Some(n), .. }
                | EventKind::StepCompleted { loop_name: Some(n), .. }
                | EventKind::StepFailed { loop_name: Some(n), .. }
                | EventKind::StepSkipped { loop_name: Some(n), .. } => n == loop_name,
                EventKind::LoopStarted { loop_name: n, .. }
                | EventKind::LoopCompleted { loop_name: n, .. } => n == loop_name,
                _ => false,
            };
            if !matches_loop {
                return false;
            }
        }
        true
    }
}

/// Per-execution file state: the next `event_id` to assign and the open
/// append handle.
struct ExecutionLog {
    path: PathBuf,
    next_event_id: u64,
    writer: File,
}

impl ExecutionLog {
    fn open(path: PathBuf) -> Result<Self, WalError> {
        let next_event_id = recover(&path)?;
        let writer = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, next_event_id, writer })
    }

    fn append(&mut self, event: &StoredEvent) -> Result<(), WalError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        self.next_event_id = event.event_id.as_u64() + 1;
        Ok(())
    }
}

/// On open, read the file line by line; the first line that fails to
/// parse as UTF-8 or as a `StoredEvent` is corruption. The valid prefix
/// is kept, the corrupt tail (and everything after) is preserved in a
/// rotated `.bak` file, bounded to the `MAX_BACKUPS` most recent
/// rotations, and the clean prefix is rewritten in place. Returns the
/// next event id to assign.
fn recover(path: &Path) -> Result<u64, WalError> {
    if !path.exists() {
        return Ok(1);
    }
    let bytes = std::fs::read(path)?;
    let mut valid_end = 0usize;
    let mut max_seen: u64 = 0;
    let mut cursor = 0usize;
    let mut corrupt = false;
    while cursor < bytes.len() {
        let rest = &bytes[cursor..];
        let newline = rest.iter().position(|&b| b == b'\n');
        let (line, consumed) = match newline {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        if line.is_empty() && newline.is_some() {
            cursor += consumed;
            continue;
        }
        let parsed = std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<StoredEvent>(s).ok());
        match parsed {
            Some(event) if newline.is_some() => {
                max_seen = max_seen.max(event.event_id.as_u64());
                cursor += consumed;
                valid_end = cursor;
            }
            _ => {
                corrupt = true;
                break;
            }
        }
    }
    if corrupt {
        rotate_backup(path)?;
        std::fs::write(path, &bytes[..valid_end])?;
    }
    Ok(max_seen + 1)
}

/// Rotate up to `MAX_BACKUPS` numbered `.bak` files, oldest evicted,
/// then copy the (about to be truncated) corrupt file into `.bak`.
fn rotate_backup(path: &Path) -> Result<(), WalError> {
    let bak = |n: u32| -> PathBuf {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };
    for n in (1..MAX_BACKUPS).rev() {
        let from = bak(n);
        if from.exists() {
            std::fs::rename(&from, bak(n + 1))?;
        }
    }
    std::fs::copy(path, bak(1))?;
    Ok(())
}

/// Read all parseable events from a file, stopping at the first
/// corrupt or non-UTF-8 line (mirrors `recover`'s stop-at-corruption
/// behavior for live reads without mutating the file).
fn read_all(path: &Path) -> Result<Vec<StoredEvent>, WalError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredEvent>(&line) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    Ok(events)
}

/// The Event Log Store: one append-only file per `execution_id` under a
/// shared directory, single-writer-per-execution enforced by the
/// engine's lease, not by this store.
pub struct EventLogStore {
    dir: PathBuf,
    open_logs: Mutex<HashMap<ExecutionId, ExecutionLog>>,
}

impl EventLogStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, WalError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, open_logs: Mutex::new(HashMap::new()) })
    }

    fn file_path(&self, execution_id: ExecutionId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", execution_id.as_u64()))
    }

    /// Append a new event for `execution_id`, assigning the next
    /// monotonic `event_id` for that execution.
    pub fn append(
        &self,
        execution_id: ExecutionId,
        parent_event_id: Option<EventId>,
        parent_execution_id: Option<ExecutionId>,
        created_at: u64,
        kind: EventKind,
    ) -> Result<EventId, WalError> {
        let mut logs = self.open_logs.lock();
        let log = match logs.entry(execution_id) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(ExecutionLog::open(self.file_path(execution_id))?)
            }
        };
        let event_id = EventId::new(log.next_event_id);
        let stored = StoredEvent { execution_id, event_id, parent_event_id, parent_execution_id, created_at, kind };
        log.append(&stored)?;
        Ok(event_id)
    }

    /// Read events for `execution_id` starting after `from_event_id`
    /// (`None` reads from the start), truncated to `limit` if given.
    pub fn read(
        &self,
        execution_id: ExecutionId,
        from_event_id: Option<EventId>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>, WalError> {
        // Flush any buffered writer state before reading our own writes back.
        {
            let mut logs = self.open_logs.lock();
            if let Some(log) = logs.get_mut(&execution_id) {
                log.writer.flush()?;
            }
        }
        let mut events = read_all(&self.file_path(execution_id))?;
        if let Some(from) = from_event_id {
            events.retain(|e| e.event_id > from);
        }
        if let Some(limit) = limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    /// Read events for `execution_id` matching `filter`, in order.
    pub fn filter(&self, execution_id: ExecutionId, filter: &EventFilter) -> Result<Vec<StoredEvent>, WalError> {
        Ok(self.read(execution_id, None, None)?.into_iter().filter(|e| filter.matches(e)).collect())
    }

    /// Every execution id this store currently holds a log file for,
    /// regardless of whether that execution's log is open in memory —
    /// used by the daemon at startup to rebuild in-flight execution
    /// state after a restart — the event log, not the engine's
    /// in-memory registries, is the durable source of truth.
    pub fn known_execution_ids(&self) -> Result<Vec<ExecutionId>, WalError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if let Ok(raw) = stem.parse::<u64>() {
                ids.push(ExecutionId::new(raw));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Drop all events for executions whose id falls in
    /// `[low, high]` — an O(1) partition drop.
    pub fn drop_range(&self, low: ExecutionId, high: ExecutionId) -> Result<(), WalError> {
        let mut logs = self.open_logs.lock();
        logs.retain(|id, _| !(low..=high).contains(id));
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let Ok(raw) = stem.parse::<u64>() else { continue };
            let id = ExecutionId::new(raw);
            if (low..=high).contains(&id) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
