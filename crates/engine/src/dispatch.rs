// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step dispatch decisions: evaluate `when`, render `inputs` — pure
//! functions over a [`Step`] and a [`TemplateContext`], mirroring the
//! teacher's `steps.rs` (decide what effects to produce) kept separate
//! from the engine's own event-log/broker I/O.

use crate::template::{self, TemplateContext, TemplateError};
use noetl_core::playbook::Step;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Skipped { reason: String },
    Ready { rendered_inputs: HashMap<String, Value> },
}

/// The result of evaluating one ready step: its `when` verdict (if it
/// declared one — the engine emits a `case.evaluated` event for this)
/// and whether it should run or be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDecision {
    pub case_value: Option<bool>,
    pub outcome: StepOutcome,
}

pub fn decide_step(step: &Step, ctx: &TemplateContext) -> Result<StepDecision, TemplateError> {
    let case_value = match &step.when {
        Some(condition) => Some(template::evaluate_when(condition, ctx)?),
        None => None,
    };

    if case_value == Some(false) {
        let condition = step.when.as_ref().map(|w| w.0.clone()).unwrap_or_default();
        return Ok(StepDecision {
            case_value,
            outcome: StepOutcome::Skipped { reason: format!("when condition `{condition}` evaluated false") },
        });
    }

    let rendered_inputs =
        step.inputs.iter().map(|(k, v)| (k.clone(), template::render_value(v, ctx))).collect();
    Ok(StepDecision { case_value, outcome: StepOutcome::Ready { rendered_inputs } })
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
