// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn with_builtin_tools_registers_all_four_kinds() {
    let registry = ToolRegistry::with_builtin_tools();
    let mut kinds: Vec<&str> = registry.kinds().collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["http", "python", "shell", "sub_playbook"]);
}

#[test]
fn unregistered_kind_resolves_to_none() {
    let registry = ToolRegistry::with_builtin_tools();
    assert!(registry.get("sql").is_none());
}

#[test]
fn unsupported_tool_error_has_a_stable_kind() {
    assert_eq!(ToolError::UnsupportedTool("sql".into()).kind(), "UnsupportedTool");
    assert_eq!(ToolError::Http("boom".into()).kind(), "ToolExecutionError");
}
