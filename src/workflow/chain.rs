use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::step::{StepState, WorkflowStep};
use crate::authz::RequestSubtype;
use crate::errors::{AppError, AppResult};

/// Steps of one request, linked through `previous_step` / `next_step` ids.
///
/// Construction validates that the links form exactly one simple path: a single
/// initial step, a single terminal step, consistent back links, no cycles and no
/// unreachable steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    steps: HashMap<String, WorkflowStep>,
    order: Vec<String>,
}

impl Workflow {
    pub fn from_steps(steps: Vec<WorkflowStep>) -> AppResult<Self> {
        if steps.is_empty() {
            return Err(AppError::invalid_workflow("workflow has no steps"));
        }

        let mut by_id: HashMap<String, WorkflowStep> = HashMap::with_capacity(steps.len());
        for step in steps {
            if step.id.trim().is_empty() {
                return Err(AppError::invalid_workflow("step id cannot be empty"));
            }
            if let Some(existing) = by_id.insert(step.id.clone(), step) {
                return Err(AppError::invalid_workflow(format!("duplicate step id '{}'", existing.id)));
            }
        }

        for step in by_id.values() {
            for (label, link) in [("previous", &step.previous_step), ("next", &step.next_step)] {
                if let Some(target) = link {
                    if !by_id.contains_key(target) {
                        return Err(AppError::invalid_workflow(format!(
                            "step '{}' has unknown {label} step '{target}'",
                            step.id
                        )));
                    }
                    if target == &step.id {
                        return Err(AppError::invalid_workflow(format!("step '{}' links to itself", step.id)));
                    }
                }
            }
            if let Some(next) = &step.next_step {
                if by_id[next].previous_step.as_deref() != Some(step.id.as_str()) {
                    return Err(AppError::invalid_workflow(format!(
                        "step '{next}' does not link back to '{}'",
                        step.id
                    )));
                }
            }
            if let Some(previous) = &step.previous_step {
                if by_id[previous].next_step.as_deref() != Some(step.id.as_str()) {
                    return Err(AppError::invalid_workflow(format!(
                        "step '{previous}' does not link forward to '{}'",
                        step.id
                    )));
                }
            }
        }

        let heads: Vec<&String> = by_id
            .values()
            .filter(|s| s.previous_step.is_none())
            .map(|s| &s.id)
            .collect();
        let tails = by_id.values().filter(|s| s.next_step.is_none()).count();
        if heads.len() != 1 || tails != 1 {
            return Err(AppError::invalid_workflow(format!(
                "expected one initial and one terminal step, found {} and {tails}",
                heads.len()
            )));
        }

        let mut order = Vec::with_capacity(by_id.len());
        let mut seen = HashSet::new();
        let mut cursor = Some(heads[0].clone());
        while let Some(id) = cursor {
            if !seen.insert(id.clone()) {
                return Err(AppError::invalid_workflow(format!("cycle detected at step '{id}'")));
            }
            cursor = by_id[&id].next_step.clone();
            order.push(id);
        }
        if order.len() != by_id.len() {
            return Err(AppError::invalid_workflow(format!(
                "{} step(s) are not reachable from the initial step",
                by_id.len() - order.len()
            )));
        }

        Ok(Self { steps: by_id, order })
    }

    /// Fresh workflow for `subtype` with the initial step started.
    pub fn for_subtype(subtype: RequestSubtype, now: DateTime<Utc>) -> AppResult<Self> {
        let names = subtype.steps();
        let steps = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mut step = WorkflowStep::new(name.as_str(), title_case(name.as_str()));
                step.previous_step = index.checked_sub(1).map(|i| names[i].as_str().to_string());
                step.next_step = names.get(index + 1).map(|n| n.as_str().to_string());
                step
            })
            .collect();

        let mut workflow = Self::from_steps(steps)?;
        let first = workflow.order[0].clone();
        workflow.step_mut(&first)?.start(now)?;
        Ok(workflow)
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.get(id)
    }

    pub fn step_mut(&mut self, id: &str) -> AppResult<&mut WorkflowStep> {
        self.steps
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("workflow step '{id}'")))
    }

    /// Steps from the initial to the terminal step.
    pub fn steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.order.iter().map(move |id| &self.steps[id])
    }

    pub fn initial_step(&self) -> &WorkflowStep {
        &self.steps[&self.order[0]]
    }

    pub fn terminal_step(&self) -> &WorkflowStep {
        &self.steps[&self.order[self.order.len() - 1]]
    }

    pub fn next_of(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps
            .get(id)
            .and_then(|s| s.next_step.as_deref())
            .and_then(|next| self.steps.get(next))
    }

    /// The started step that is still pending, if any.
    pub fn active_step(&self) -> Option<&WorkflowStep> {
        self.steps()
            .find(|s| s.state == StepState::Pending && s.is_started())
    }

    pub fn is_completed(&self) -> bool {
        self.terminal_step().is_completed()
    }

    pub fn is_rejected(&self) -> bool {
        self.steps().any(|s| s.state == StepState::Rejected)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Serialize for Workflow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.steps())
    }
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let steps = Vec::<WorkflowStep>::deserialize(deserializer)?;
        Workflow::from_steps(steps).map_err(serde::de::Error::custom)
    }
}
