// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry-policy consultation and jittered backoff. Pure decision
//! logic: given a step's [`RetryPolicy`] and the error
//! kind a `step.failed`/`step.lost` event carries, decide whether
//! another attempt is permitted and after how long. No randomness
//! crate is in the workspace dependency stack, so jitter is derived
//! deterministically from a caller-supplied seed (typically the node's
//! `created_at` epoch millis) via a splitmix64 mix — good enough to
//! spread concurrent retries without pulling in `rand`.

use noetl_core::playbook::{RetryPolicy, RetryableError};
use std::time::Duration;

/// The outcome of consulting a step's retry policy against one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_attempt: u32, delay_ms: u64 },
    Terminal,
}

fn parse_retryable(kind: &str) -> Option<RetryableError> {
    match kind {
        "ToolExecutionError" => Some(RetryableError::ToolExecutionError),
        "TaskTimeout" => Some(RetryableError::TaskTimeout),
        "BrokerUnavailable" => Some(RetryableError::BrokerUnavailable),
        "ResultStoreUnavailable" => Some(RetryableError::ResultStoreUnavailable),
        _ => None,
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Add up to 20% jitter to `base`, deterministic given `seed` and `attempt`.
pub fn jitter_delay(base: Duration, attempt: u32, seed: u64) -> Duration {
    let mixed = splitmix64(seed ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    let frac = (mixed % 1000) as f64 / 1000.0;
    let jitter_ms = (base.as_millis() as f64 * 0.2 * frac) as u64;
    base + Duration::from_millis(jitter_ms)
}

/// Decide whether a step's `attempt`-th failure, carrying error kind
/// `error_kind` (the `ErrorInfo::kind` discriminant), earns another
/// attempt under `policy`. `None` policy means no retries at all.
pub fn decide_retry(policy: Option<&RetryPolicy>, attempt: u32, error_kind: &str, seed: u64) -> RetryDecision {
    let Some(policy) = policy else { return RetryDecision::Terminal };
    let Some(retryable) = parse_retryable(error_kind) else { return RetryDecision::Terminal };
    if !policy.permits(attempt, retryable) {
        return RetryDecision::Terminal;
    }
    let base = policy.backoff.delay_for_attempt(attempt);
    let delay = jitter_delay(base, attempt, seed);
    RetryDecision::Retry { next_attempt: attempt + 1, delay_ms: delay.as_millis() as u64 }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
