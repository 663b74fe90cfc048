// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn ctx<'a>(workload: &'a Value, vars: &'a HashMap<String, Value>, results: &'a HashMap<String, Value>) -> TemplateContext<'a> {
    TemplateContext { workload, vars, results }
}

#[test]
fn whole_expression_preserves_native_type() {
    let workload = json!({"count": 3, "nested": {"x": 1}});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    assert_eq!(render_value(&json!("{{ workload.count }}"), &c), json!(3));
    assert_eq!(render_value(&json!("{{ workload.nested.x }}"), &c), json!(1));
}

#[test]
fn embedded_expression_interpolates_as_text() {
    let workload = json!({"city": "Boston"});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    assert_eq!(render_value(&json!("hello {{ workload.city }}!"), &c), json!("hello Boston!"));
}

#[test]
fn missing_path_resolves_to_null_not_an_error() {
    let workload = json!({});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    assert_eq!(render_value(&json!("{{ workload.nope }}"), &c), Value::Null);
}

#[test]
fn object_and_array_inputs_render_recursively() {
    let workload = json!({"id": 7});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    let input = json!({"a": "{{ workload.id }}", "b": ["{{ workload.id }}", "literal"]});
    let rendered = render_value(&input, &c);
    assert_eq!(rendered["a"], json!(7));
    assert_eq!(rendered["b"][0], json!(7));
    assert_eq!(rendered["b"][1], json!("literal"));
}

#[test]
fn numeric_comparison_evaluates_correctly() {
    let workload = json!({});
    let vars = HashMap::new();
    let mut results = HashMap::new();
    results.insert("check".to_string(), json!({"score": 42}));
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("{{ results.check.score }} > 10".to_string());
    assert!(evaluate_when(&condition, &c).unwrap());
    let condition = WhenCondition("{{ results.check.score }} < 10".to_string());
    assert!(!evaluate_when(&condition, &c).unwrap());
}

#[test]
fn string_equality_condition() {
    let workload = json!({});
    let vars = HashMap::new();
    let mut results = HashMap::new();
    results.insert("check".to_string(), json!({"status": "ok"}));
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("{{ results.check.status }} == 'ok'".to_string());
    assert!(evaluate_when(&condition, &c).unwrap());
}

#[test]
fn conjunction_requires_both_sides_true() {
    let workload = json!({"a": 1, "b": 0});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("{{ workload.a }} == 1 && {{ workload.b }} == 1".to_string());
    assert!(!evaluate_when(&condition, &c).unwrap());
}

#[test]
fn disjunction_succeeds_if_either_side_true() {
    let workload = json!({"a": 1, "b": 0});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("{{ workload.a }} == 2 || {{ workload.b }} == 0".to_string());
    assert!(evaluate_when(&condition, &c).unwrap());
}

#[test]
fn bare_truthy_atom_without_an_operator() {
    let workload = json!({"enabled": true});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("{{ workload.enabled }}".to_string());
    assert!(evaluate_when(&condition, &c).unwrap());
}

#[test]
fn empty_condition_is_an_error() {
    let workload = json!({});
    let vars = HashMap::new();
    let results = HashMap::new();
    let c = ctx(&workload, &vars, &results);
    let condition = WhenCondition("   ".to_string());
    assert!(matches!(evaluate_when(&condition, &c), Err(TemplateError::EmptyCondition)));
}
