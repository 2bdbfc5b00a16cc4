use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::actor::Actor;
use crate::errors::{AppError, AppResult};

/// Per-step state. `Unknown` only ever comes from reading an unrecognized persisted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
    Pending,
    Approved,
    Rejected,
    Skipped,
    Unknown,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Approved => "approved",
            StepState::Rejected => "rejected",
            StepState::Skipped => "skipped",
            StepState::Unknown => "unknown",
        }
    }

    /// Total parse; anything unrecognized becomes `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => StepState::Pending,
            "approved" => StepState::Approved,
            "rejected" => StepState::Rejected,
            "skipped" => StepState::Skipped,
            _ => StepState::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Approved | StepState::Rejected | StepState::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StepState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StepState::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub state: StepState,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<Actor>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub previous_step: Option<String>,
    #[serde(default)]
    pub next_step: Option<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: StepState::Pending,
            started: None,
            completed: None,
            due_date: None,
            completed_by: None,
            description: None,
            reason: None,
            previous_step: None,
            next_step: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.state != StepState::Pending {
            return Err(AppError::InvalidTransition {
                step: self.id.clone(),
                from: self.state,
                to: StepState::Pending,
            });
        }
        if self.started.is_none() {
            self.started = Some(now);
        }
        Ok(())
    }

    pub fn approve(&mut self, actor: Actor, now: DateTime<Utc>) -> AppResult<()> {
        self.complete(StepState::Approved, Some(actor), None, now)
    }

    pub fn reject(&mut self, actor: Actor, reason: impl Into<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.complete(StepState::Rejected, Some(actor), Some(reason.into()), now)
    }

    /// System-driven completion; leaves `completed_by` empty.
    pub fn skip(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.complete(StepState::Skipped, None, None, now)
    }

    fn complete(
        &mut self,
        to: StepState,
        actor: Option<Actor>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.state != StepState::Pending {
            return Err(AppError::InvalidTransition {
                step: self.id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.started.get_or_insert(now);
        self.completed = Some(now);
        self.completed_by = actor;
        if reason.is_some() {
            self.reason = reason;
        }
        Ok(())
    }
}
