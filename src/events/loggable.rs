use serde::{Deserialize, Serialize};

/// Severity levels for audit events.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that can be recorded in the audit log.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name, the prefix in event names like "workflow_step.approved"
    fn entity_type() -> &'static str;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action (e.g., "rejected" -> Critical)
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "rejected" | "denied" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
