use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::principal::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

/// Answers org-chart membership questions for a principal.
///
/// Implementations work over data fetched before evaluation starts; the evaluator
/// never blocks on them.
pub trait OrgChartRoleResolver: Send + Sync {
    /// Task owner for any position in the project.
    fn is_task_owner_in_project(&self, principal: &Principal, project_id: Uuid) -> bool;

    /// Task owner for one specific position instance.
    fn is_task_owner_for_instance(
        &self,
        principal: &Principal,
        project_id: Uuid,
        position_id: Uuid,
        instance_id: Uuid,
    ) -> bool;

    fn has_position_access(
        &self,
        principal: &Principal,
        project_id: Uuid,
        position_id: Uuid,
        level: AccessLevel,
    ) -> bool;

    /// Write access to the org chart of the whole project.
    fn has_project_write_access(&self, principal: &Principal, project_id: Uuid) -> bool;

    /// Holds any position in the project.
    fn is_project_member(&self, principal: &Principal, project_id: Uuid) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskOwnership {
    pub project_id: Uuid,
    pub position_id: Uuid,
    pub instance_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionGrant {
    pub project_id: Uuid,
    pub position_id: Uuid,
    pub level: AccessLevel,
}

/// Snapshot of one principal's org-chart roles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgChartMemberships {
    #[serde(default)]
    pub task_ownerships: HashSet<TaskOwnership>,
    #[serde(default)]
    pub position_grants: HashSet<PositionGrant>,
    #[serde(default)]
    pub project_writers: HashSet<Uuid>,
    #[serde(default)]
    pub project_memberships: HashSet<Uuid>,
}

impl OrgChartMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_ownership(mut self, project_id: Uuid, position_id: Uuid, instance_id: Uuid) -> Self {
        self.task_ownerships.insert(TaskOwnership {
            project_id,
            position_id,
            instance_id,
        });
        self
    }

    pub fn with_position_grant(mut self, project_id: Uuid, position_id: Uuid, level: AccessLevel) -> Self {
        self.position_grants.insert(PositionGrant {
            project_id,
            position_id,
            level,
        });
        self
    }

    pub fn with_project_write(mut self, project_id: Uuid) -> Self {
        self.project_writers.insert(project_id);
        self
    }

    pub fn with_project_membership(mut self, project_id: Uuid) -> Self {
        self.project_memberships.insert(project_id);
        self
    }
}

impl OrgChartRoleResolver for OrgChartMemberships {
    fn is_task_owner_in_project(&self, _principal: &Principal, project_id: Uuid) -> bool {
        self.task_ownerships.iter().any(|t| t.project_id == project_id)
    }

    fn is_task_owner_for_instance(
        &self,
        _principal: &Principal,
        project_id: Uuid,
        position_id: Uuid,
        instance_id: Uuid,
    ) -> bool {
        self.task_ownerships.contains(&TaskOwnership {
            project_id,
            position_id,
            instance_id,
        })
    }

    fn has_position_access(
        &self,
        principal: &Principal,
        project_id: Uuid,
        position_id: Uuid,
        level: AccessLevel,
    ) -> bool {
        // Write implies read, and project writers may touch every position.
        if self.has_project_write_access(principal, project_id) {
            return true;
        }
        self.position_grants.iter().any(|grant| {
            grant.project_id == project_id
                && grant.position_id == position_id
                && (grant.level == level || grant.level == AccessLevel::Write)
        })
    }

    fn has_project_write_access(&self, _principal: &Principal, project_id: Uuid) -> bool {
        self.project_writers.contains(&project_id)
    }

    fn is_project_member(&self, _principal: &Principal, project_id: Uuid) -> bool {
        self.project_memberships.contains(&project_id)
    }
}
