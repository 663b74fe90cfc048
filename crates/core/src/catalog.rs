// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog entries: immutable, versioned playbook definitions.
//!
//! The DSL parser that produces a `CatalogEntry`'s `content` is out of
//! scope; this module only stores and versions already-normalized
//! entries. Callers supply the normalized step graph (`Vec<Step>`)
//! alongside the entry — see [`crate::playbook::Step`].

use crate::id::CatalogId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a catalog entry represents. Only `Playbook` is exercised by the
/// engine; the others are modeled so `CatalogEntry` can stand in for the
/// DSL's full catalog without requiring its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Playbook,
    Dataset,
    Book,
}

/// An immutable catalog entry. New versions append; nothing is mutated
/// or deleted in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogId,
    pub path: String,
    pub version: String,
    pub kind: CatalogKind,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    pub created_at: u64,
}

impl CatalogEntry {
    /// A version-qualified identifier suitable for logging and lookup
    /// keys that must distinguish two versions of the same path.
    pub fn qualified_path(&self) -> String {
        format!("{}:{}", self.path, self.version)
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
