// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template rendering and `when`-condition evaluation over a step's
//! inputs. The DSL's own template language is out of scope here; this
//! is the small, dependency-free expression language a normalized
//! [`noetl_core::playbook::Step`] is rendered with — dotted-path
//! lookups into `workload`/`vars`/`results`, plus a handful of
//! comparison operators for `when`.

use noetl_core::playbook::WhenCondition;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    #[error("empty condition")]
    EmptyCondition,
    #[error("malformed comparison: {0}")]
    MalformedComparison(String),
}

/// The data a template expression resolves dotted paths against:
/// `workload.*`, `vars.*`, `results.*`.
pub struct TemplateContext<'a> {
    pub workload: &'a Value,
    pub vars: &'a HashMap<String, Value>,
    pub results: &'a HashMap<String, Value>,
}

impl<'a> TemplateContext<'a> {
    /// Resolve a dotted path such as `workload.city` or `results.fetch.id`.
    /// Returns `Value::Null` for any segment that does not resolve,
    /// rather than erroring — an unset optional input is expected, not
    /// exceptional.
    pub fn resolve(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(root) = segments.next() else { return Value::Null };
        let mut current = match root {
            "workload" => self.workload.clone(),
            "vars" => serde_json::to_value(self.vars).unwrap_or(Value::Null),
            "results" => serde_json::to_value(self.results).unwrap_or(Value::Null),
            other => self.vars.get(other).cloned().unwrap_or(Value::Null),
        };
        for segment in segments {
            current = match current {
                Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
                Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i).cloned()).unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }
        current
    }
}

/// Whether `s` is exactly one `{{ ... }}` expression with nothing else
/// around it — in which case the resolved `Value` is returned as-is
/// (an object, array, or number survives, rather than being stringified).
fn whole_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(inner.trim())
}

/// Render every `{{ path }}` occurrence in `value`, recursing through
/// arrays and objects. Strings that are *only* a single `{{ path }}`
/// resolve to the referenced value's native type; strings with embedded
/// expressions are interpolated as text.
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Value {
    match value {
        Value::String(s) => render_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), render_value(v, ctx))).collect())
        }
        other => other.clone(),
    }
}

fn render_string(s: &str, ctx: &TemplateContext) -> Value {
    if let Some(path) = whole_expression(s) {
        return ctx.resolve(path);
    }
    if !s.contains("{{") {
        return Value::String(s.to_string());
    }
    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = after[..end].trim();
        out.push_str(&value_to_text(&ctx.resolve(path)));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Value::String(out)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Path(String),
    Literal(Value),
}

fn parse_atom(raw: &str) -> Atom {
    let raw = raw.trim();
    if let Some(path) = whole_expression(raw) {
        return Atom::Path(path.to_string());
    }
    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Atom::Literal(Value::String(inner.to_string()));
    }
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Atom::Literal(Value::String(inner.to_string()));
    }
    match raw {
        "true" => Atom::Literal(Value::Bool(true)),
        "false" => Atom::Literal(Value::Bool(false)),
        "null" => Atom::Literal(Value::Null),
        _ => {
            if let Ok(n) = raw.parse::<f64>() {
                Atom::Literal(serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))
            } else {
                Atom::Path(raw.to_string())
            }
        }
    }
}

fn resolve_atom(atom: &Atom, ctx: &TemplateContext) -> Value {
    match atom {
        Atom::Path(path) => ctx.resolve(path),
        Atom::Literal(v) => v.clone(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate one comparison or bare-truthy atom, e.g. `{{ results.check.status }} == 'ok'`.
fn eval_atom_expr(expr: &str, ctx: &TemplateContext) -> Result<bool, TemplateError> {
    const OPS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];
    for op in OPS {
        if let Some(idx) = expr.find(op) {
            let lhs = &expr[..idx];
            let rhs = &expr[idx + op.len()..];
            let lhs_val = resolve_atom(&parse_atom(lhs), ctx);
            let rhs_val = resolve_atom(&parse_atom(rhs), ctx);
            return Ok(compare(op, &lhs_val, &rhs_val));
        }
    }
    Ok(is_truthy(&resolve_atom(&parse_atom(expr), ctx)))
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        _ => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => match op {
                ">" => a > b,
                ">=" => a >= b,
                "<" => a < b,
                "<=" => a <= b,
                _ => false,
            },
            _ => false,
        },
    }
}

/// Evaluate a `when` condition. Supports a left-to-right `||` of `&&`-
/// joined comparisons/truthy atoms — no operator precedence nesting
/// beyond that.
pub fn evaluate_when(condition: &WhenCondition, ctx: &TemplateContext) -> Result<bool, TemplateError> {
    let raw = condition.0.trim();
    if raw.is_empty() {
        return Err(TemplateError::EmptyCondition);
    }
    for disjunct in raw.split("||") {
        let mut all = true;
        for conjunct in disjunct.split("&&") {
            if !eval_atom_expr(conjunct.trim(), ctx)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
