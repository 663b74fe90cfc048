// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::ExecutionId;

fn result_ref(name: &str) -> ResultRef {
    ResultRef {
        id: ResultId::new(1),
        execution_id: ExecutionId::new(1),
        name: name.to_string(),
        scope: ResultScope::Step,
        tier: StorageTier::Inline,
        physical_uri: "mem://1".to_string(),
        size: 4,
        preview: None,
        extracted_fields: None,
        correlation: CorrelationKeys::default(),
        expires_at: Some(10_000),
    }
}

#[test]
fn result_ref_uri_matches_canonical_format() {
    let r = result_ref("a");
    assert_eq!(r.uri(), "noetl://execution/1/result/a/1");
}

#[test]
fn permanent_scope_is_recognized() {
    let mut r = result_ref("a");
    assert!(!r.is_permanent());
    r.scope = ResultScope::Permanent;
    assert!(r.is_permanent());
}

#[test]
fn manifest_push_part_requires_strictly_increasing_index() {
    let mut m = Manifest::new(ResultId::new(1), ExecutionId::new(1), CombineStrategy::Append, None);
    m.push_part(0, result_ref("a")).unwrap();
    m.push_part(1, result_ref("b")).unwrap();
    let err = m.push_part(1, result_ref("c")).unwrap_err();
    assert_eq!(err, ManifestError::PartIndexNotIncreasing { given: 1, last: 1 });
}

#[test]
fn manifest_cannot_be_closed_twice() {
    let mut m = Manifest::new(ResultId::new(1), ExecutionId::new(1), CombineStrategy::Append, None);
    m.close(100).unwrap();
    assert_eq!(m.close(200).unwrap_err(), ManifestError::AlreadyClosed);
}

#[test]
fn manifest_rejects_parts_after_closure() {
    let mut m = Manifest::new(ResultId::new(1), ExecutionId::new(1), CombineStrategy::Append, None);
    m.close(100).unwrap();
    assert_eq!(m.push_part(0, result_ref("a")).unwrap_err(), ManifestError::AlreadyClosed);
}

#[test]
fn empty_manifest_closes_cleanly() {
    let mut m = Manifest::new(ResultId::new(1), ExecutionId::new(1), CombineStrategy::Append, None);
    assert!(m.parts.is_empty());
    m.close(1).unwrap();
    assert!(m.is_closed());
}
