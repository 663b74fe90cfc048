// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types.
//!
//! Two families are used across the workspace:
//!
//! - [`Snowflake`] — a time-ordered 64-bit id for entities whose id must
//!   sort chronologically and partition cleanly (executions, events,
//!   results, catalog entries, schedules). See `noetl_engine::snowflake`
//!   for the allocator that produces these.
//! - Opaque string ids, generated by [`define_string_id!`], for entities
//!   that only need uniqueness, not ordering (workers, runtimes).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A time-ordered 64-bit id produced by the ID allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake(pub u64);

impl Snowflake {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Generate an opaque, string-backed id type with a fixed human-readable
/// prefix. Unlike [`Snowflake`], these carry no ordering guarantee; they
/// exist to name ephemeral, process-local entities (workers, runtimes)
/// where uniqueness, not sort order, is what matters.
#[macro_export]
macro_rules! define_string_id {
    ($name:ident, $prefix:expr) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random id with this type's prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, $crate::id::random_suffix()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Random suffix used by [`define_string_id!`]-generated types. Not
/// cryptographically significant; collisions are a correctness bug, not
/// a security one, since these ids never cross a trust boundary alone.
pub fn random_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = NEXT_SUFFIX.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("{nanos:x}{counter:x}")
}

static NEXT_SUFFIX: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

define_string_id!(WorkerId, "worker_");
define_string_id!(RuntimeId, "runtime_");

/// Generate a newtype wrapper around [`Snowflake`] for a specific entity
/// kind, so `ExecutionId` and `EventId` cannot be confused at a call site
/// even though both are time-ordered 64-bit ids under the hood.
#[macro_export]
macro_rules! define_snowflake_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $crate::id::Snowflake);

        impl $name {
            pub fn new(raw: u64) -> Self {
                Self($crate::id::Snowflake::new(raw))
            }

            pub fn as_u64(self) -> u64 {
                self.0.as_u64()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::id::Snowflake> for $name {
            fn from(raw: $crate::id::Snowflake) -> Self {
                Self(raw)
            }
        }
    };
}

define_snowflake_id!(ExecutionId);
define_snowflake_id!(EventId);
define_snowflake_id!(ResultId);
define_snowflake_id!(CatalogId);
define_snowflake_id!(ScheduleId);

/// Mints the raw time-ordered values behind every [`Snowflake`]-backed
/// id. The concrete bit-packed allocator lives in `noetl_engine::snowflake`
/// (it owns the shard assignment); expressed as a trait here so layers
/// below the engine (the dispatcher, the result store's RPC callers) can
/// mint ids without depending on the engine crate itself.
pub trait IdAllocator: Send + Sync {
    fn next_id(&self) -> Snowflake;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
