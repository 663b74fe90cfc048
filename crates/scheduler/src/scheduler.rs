// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: a single-writer loop that selects
//! due schedules, atomically advances each one's `next_run_at` via the
//! broker's K/V compare-and-set, and invokes the engine to start an
//! execution. The CAS follows the same pattern as the loop aggregator's
//! `increment_completed_count` (`noetl_engine::loop_state`) — several
//! scheduler instances may tick concurrently, and only the one whose CAS
//! wins actually fires.

use chrono::{TimeZone, Utc};
use noetl_broker::{BrokerAdapter, BrokerError};
use noetl_core::id::{ExecutionId, ScheduleId};
use noetl_engine::{Engine, EngineError};
use noetl_storage::result_store::ResultBackend;
use noetl_core::clock::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),
    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),
    #[error("cron expression {0:?} has no upcoming run in its declared timezone")]
    NoUpcomingRun(String),
    #[error("no such schedule {0:?}")]
    UnknownSchedule(ScheduleId),
    #[error("no catalog entry at path {0:?}")]
    UnknownCatalog(String),
}

/// A trigger evaluated in its own declared timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Cron { expression: String, timezone: String },
    Interval { every_ms: u64 },
}

impl Trigger {
    /// The next fire time strictly after `now_ms`, in epoch milliseconds.
    fn next_after(&self, now_ms: u64) -> Result<u64, SchedulerError> {
        match self {
            Trigger::Interval { every_ms } => Ok(now_ms.saturating_add(*every_ms)),
            Trigger::Cron { expression, timezone } => {
                let tz: chrono_tz::Tz = timezone.parse().map_err(|_| SchedulerError::InvalidTimezone(timezone.clone()))?;
                let schedule = cron::Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron(expression.clone(), e.to_string()))?;
                let now = Utc
                    .timestamp_millis_opt(now_ms as i64)
                    .single()
                    .ok_or_else(|| SchedulerError::InvalidCron(expression.clone(), "timestamp out of range".to_string()))?
                    .with_timezone(&tz);
                let next = schedule.after(&now).next().ok_or_else(|| SchedulerError::NoUpcomingRun(expression.clone()))?;
                Ok(next.with_timezone(&Utc).timestamp_millis() as u64)
            }
        }
    }
}

/// Trigger spec bound to a playbook path; the path, not a resolved
/// [`noetl_core::id::CatalogId`], is what's declared here, since a
/// schedule created before a catalog's latest version should still pick
/// it up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: ScheduleId,
    pub catalog_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
    #[serde(default)]
    pub workload: Value,
    pub trigger: Trigger,
    pub enabled: bool,
}

/// What a schedule's most recent attempt produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Started { execution_id: ExecutionId },
    Failed { error: String },
}

/// The run-state record held in the broker's K/V under
/// `schedule:<id>:state` — the single-writer CAS target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub next_run_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunOutcome>,
}

fn state_key(id: ScheduleId) -> String {
    format!("schedule:{}:state", id.as_u64())
}

/// The scheduler: owns the set of registered schedules and drives
/// the tick loop. Holds an `Engine` directly rather than going through
/// the dispatcher — `CreateExecution` is an engine-level, not
/// worker-level, call.
pub struct Scheduler<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> {
    broker: Arc<Br>,
    engine: Arc<Engine<Br, Rb, C>>,
    clock: C,
    schedules: Mutex<HashMap<ScheduleId, Schedule>>,
}

impl<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> Scheduler<Br, Rb, C> {
    pub fn new(broker: Arc<Br>, engine: Arc<Engine<Br, Rb, C>>, clock: C) -> Self {
        Self { broker, engine, clock, schedules: Mutex::new(HashMap::new()) }
    }

    /// Register a schedule and seed its K/V run-state with the first
    /// computed `next_run_at`. Re-registering the same id reseeds the
    /// state, which is only safe for schedules that aren't already live
    /// elsewhere — callers update an existing schedule via
    /// [`Scheduler::set_enabled`] instead of re-registering it.
    pub async fn register_schedule(&self, schedule: Schedule) -> Result<(), SchedulerError> {
        let now = self.clock.epoch_ms();
        let next_run_at = schedule.trigger.next_after(now)?;
        let state = ScheduleState { next_run_at, last_run_at: None, last_status: None };
        self.broker.kv_put(&state_key(schedule.id), serde_json::to_vec(&state)?, None).await?;
        self.schedules.lock().insert(schedule.id, schedule);
        Ok(())
    }

    pub fn set_enabled(&self, id: ScheduleId, enabled: bool) -> Result<(), SchedulerError> {
        let mut schedules = self.schedules.lock();
        let schedule = schedules.get_mut(&id).ok_or(SchedulerError::UnknownSchedule(id))?;
        schedule.enabled = enabled;
        Ok(())
    }

    pub fn schedule_state(&self, id: ScheduleId) -> Option<Schedule> {
        self.schedules.lock().get(&id).cloned()
    }

    /// One tick: every enabled schedule whose `next_run_at` has passed is
    /// considered, in registration order. Returns the executions this
    /// tick actually started (a schedule whose CAS lost this round is
    /// silently skipped, not retried within the same tick).
    pub async fn tick(&self) -> Result<Vec<ExecutionId>, SchedulerError> {
        let now = self.clock.epoch_ms();
        let due: Vec<Schedule> = self.schedules.lock().values().filter(|s| s.enabled).cloned().collect();
        let mut started = Vec::new();
        for schedule in due {
            if let Some(execution_id) = self.try_fire(&schedule, now).await? {
                started.push(execution_id);
            }
        }
        Ok(started)
    }

    async fn try_fire(&self, schedule: &Schedule, now: u64) -> Result<Option<ExecutionId>, SchedulerError> {
        let key = state_key(schedule.id);
        let Some(raw) = self.broker.kv_get(&key).await? else {
            return Ok(None);
        };
        let current: ScheduleState = serde_json::from_slice(&raw)?;
        if current.next_run_at > now {
            return Ok(None);
        }

        let next_run_at = schedule.trigger.next_after(now)?;
        let reserved = ScheduleState { next_run_at, last_run_at: current.last_run_at, last_status: current.last_status.clone() };
        let won = self.broker.kv_compare_and_set(&key, Some(raw), serde_json::to_vec(&reserved)?, None).await?;
        if !won {
            return Ok(None);
        }

        let outcome = self.fire(schedule);
        let (last_status, execution_id) = match &outcome {
            Ok(execution_id) => (RunOutcome::Started { execution_id: *execution_id }, Some(*execution_id)),
            Err(error) => (RunOutcome::Failed { error: error.to_string() }, None),
        };
        let recorded = ScheduleState { next_run_at, last_run_at: Some(now), last_status: Some(last_status) };
        self.broker.kv_put(&key, serde_json::to_vec(&recorded)?, None).await?;

        outcome.map(Some)
    }

    fn fire(&self, schedule: &Schedule) -> Result<ExecutionId, SchedulerError> {
        let catalog_id = self
            .engine
            .resolve_catalog(&schedule.catalog_path, schedule.catalog_version.as_deref())
            .ok_or_else(|| SchedulerError::UnknownCatalog(schedule.catalog_path.clone()))?;
        Ok(self.engine.create_execution(catalog_id, schedule.workload.clone(), None)?)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
