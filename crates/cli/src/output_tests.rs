// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn json_format_emits_parseable_json() {
    let value = json!({"a": 1});
    // Can't capture stdout here, but a non-erroring call is the
    // meaningful assertion: serialization must not fail.
    format_or_json(OutputFormat::Json, &value, |_| panic!("should not take the text branch")).unwrap();
}

#[test]
fn text_format_calls_the_text_renderer() {
    let value = json!({"a": 1});
    let mut called = false;
    format_or_json(OutputFormat::Text, &value, |_| called = true).unwrap();
    assert!(called);
}
