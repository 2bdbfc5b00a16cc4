use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::department::DepartmentPath;

/// Snapshot of the request fields the evaluator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub subtype: String,
    pub current_step: String,
    #[serde(default)]
    pub assigned_department: Option<DepartmentPath>,
    pub project_id: Uuid,
    #[serde(default)]
    pub position_id: Option<Uuid>,
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    pub created_by: Uuid,
}

impl RequestContext {
    pub fn new(
        request_id: Uuid,
        subtype: impl Into<String>,
        current_step: impl Into<String>,
        project_id: Uuid,
        created_by: Uuid,
    ) -> Self {
        Self {
            request_id,
            subtype: subtype.into(),
            current_step: current_step.into(),
            assigned_department: None,
            project_id,
            position_id: None,
            instance_id: None,
            created_by,
        }
    }

    pub fn with_department(mut self, department: impl Into<DepartmentPath>) -> Self {
        self.assigned_department = Some(department.into());
        self
    }

    pub fn with_position(mut self, position_id: Uuid, instance_id: Option<Uuid>) -> Self {
        self.position_id = Some(position_id);
        self.instance_id = instance_id;
        self
    }

    /// The assigned department, if set and not blank.
    pub fn department(&self) -> Option<&DepartmentPath> {
        self.assigned_department.as_ref().filter(|d| !d.is_empty())
    }
}
