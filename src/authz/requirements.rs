//! Requirement rules and how they are assembled from a [`WorkflowAccess`] record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::WorkflowAccess;
use super::department::DepartmentPath;
use super::org_chart::{AccessLevel, OrgChartRoleResolver};
use super::principal::Principal;
use super::request::RequestContext;

/// Level in the department tree below which all resource owners may act.
pub const ALL_RESOURCE_OWNERS_LEVEL: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    TrustedApplication,
    FullControl,
    /// Owns any department at or below `scope`.
    AnyResourceOwnerBelow { scope: DepartmentPath },
    /// Owns exactly the parent department.
    ParentResourceOwner { parent: DepartmentPath },
    /// Owns the parent department or anything below it.
    SiblingResourceOwner { parent: DepartmentPath },
    /// Owns exactly the assigned department.
    ResourceOwner { department: DepartmentPath },
    Creator { person_id: Uuid },
    OrgChartTaskOwner { project_id: Uuid },
    OrgChartPositionAccess {
        project_id: Uuid,
        position_id: Uuid,
        level: AccessLevel,
    },
    DirectTaskOwner {
        project_id: Uuid,
        position_id: Uuid,
        instance_id: Uuid,
    },
    OtherProjectMember { project_id: Uuid },
    OrgAdmin { project_id: Uuid },
    /// Placeholder when a step has no configured access path; never satisfied.
    NoAccessPath,
}

impl Requirement {
    pub fn code(&self) -> &'static str {
        match self {
            Requirement::TrustedApplication => "trusted_application",
            Requirement::FullControl => "full_control",
            Requirement::AnyResourceOwnerBelow { .. } => "all_resource_owners",
            Requirement::ParentResourceOwner { .. } => "parent_resource_owner",
            Requirement::SiblingResourceOwner { .. } => "sibling_resource_owner",
            Requirement::ResourceOwner { .. } => "resource_owner",
            Requirement::Creator { .. } => "creator",
            Requirement::OrgChartTaskOwner { .. } => "org_chart_task_owner",
            Requirement::OrgChartPositionAccess { level: AccessLevel::Read, .. } => "org_chart_read",
            Requirement::OrgChartPositionAccess { level: AccessLevel::Write, .. } => "org_chart_write",
            Requirement::DirectTaskOwner { .. } => "direct_task_owner",
            Requirement::OtherProjectMember { .. } => "other_project_member",
            Requirement::OrgAdmin { .. } => "org_admin",
            Requirement::NoAccessPath => "no_access_path",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Requirement::TrustedApplication => "Caller must be a trusted application".to_string(),
            Requirement::FullControl => "Caller must hold a global full-control role".to_string(),
            Requirement::AnyResourceOwnerBelow { scope } => {
                format!("Must be resource owner for a department in '{scope}'")
            }
            Requirement::ParentResourceOwner { parent } => {
                format!("Must be resource owner for the parent department '{parent}'")
            }
            Requirement::SiblingResourceOwner { parent } => {
                format!("Must be resource owner for '{parent}' or one of its sub-departments")
            }
            Requirement::ResourceOwner { department } => {
                format!("Must be resource owner for department '{department}'")
            }
            Requirement::Creator { .. } => "Must be the creator of the request".to_string(),
            Requirement::OrgChartTaskOwner { project_id } => {
                format!("Must be task owner in project {project_id}")
            }
            Requirement::OrgChartPositionAccess { position_id, level, .. } => match level {
                AccessLevel::Read => format!("Must have read access to position {position_id}"),
                AccessLevel::Write => format!("Must have write access to position {position_id}"),
            },
            Requirement::DirectTaskOwner { position_id, .. } => {
                format!("Must be task owner for the requested instance of position {position_id}")
            }
            Requirement::OtherProjectMember { project_id } => {
                format!("Must be a member of project {project_id}")
            }
            Requirement::OrgAdmin { project_id } => {
                format!("Must have org chart admin access to project {project_id}")
            }
            Requirement::NoAccessPath => {
                "No one but administrators may act on this step".to_string()
            }
        }
    }

    /// Bypass requirements are not shown to users.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Requirement::TrustedApplication | Requirement::FullControl)
    }

    pub fn is_satisfied_by(&self, principal: &Principal, org_chart: &dyn OrgChartRoleResolver) -> bool {
        match self {
            Requirement::TrustedApplication => principal.is_trusted_application(),
            Requirement::FullControl => principal.has_full_control(),
            Requirement::AnyResourceOwnerBelow { scope } => principal.owns_any_department_under(scope),
            Requirement::ParentResourceOwner { parent } => principal.owns_department(parent, false),
            Requirement::SiblingResourceOwner { parent } => principal.owns_any_department_under(parent),
            Requirement::ResourceOwner { department } => principal.owns_department(department, false),
            Requirement::Creator { person_id } => principal.person_id == *person_id,
            Requirement::OrgChartTaskOwner { project_id } => {
                org_chart.is_task_owner_in_project(principal, *project_id)
            }
            Requirement::OrgChartPositionAccess {
                project_id,
                position_id,
                level,
            } => org_chart.has_position_access(principal, *project_id, *position_id, *level),
            Requirement::DirectTaskOwner {
                project_id,
                position_id,
                instance_id,
            } => org_chart.is_task_owner_for_instance(principal, *project_id, *position_id, *instance_id),
            Requirement::OtherProjectMember { project_id } => {
                org_chart.is_project_member(principal, *project_id)
            }
            Requirement::OrgAdmin { project_id } => org_chart.has_project_write_access(principal, *project_id),
            Requirement::NoAccessPath => false,
        }
    }
}

/// A requirement the principal did not meet, as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetRequirement {
    pub code: String,
    pub description: String,
}

impl From<&Requirement> for UnmetRequirement {
    fn from(requirement: &Requirement) -> Self {
        Self {
            code: requirement.code().to_string(),
            description: requirement.description(),
        }
    }
}

/// Alternatives that belong to one access path; any one satisfies the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementGroup {
    pub name: &'static str,
    pub requirements: Vec<Requirement>,
}

impl RequirementGroup {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            requirements: Vec::new(),
        }
    }

    fn push_if(&mut self, enabled: bool, requirement: impl FnOnce() -> Option<Requirement>) {
        if enabled {
            if let Some(requirement) = requirement() {
                self.requirements.push(requirement);
            }
        }
    }
}

/// Groups evaluated before anything else; any success grants access outright.
pub fn bypass_group() -> RequirementGroup {
    RequirementGroup {
        name: "always",
        requirements: vec![Requirement::TrustedApplication, Requirement::FullControl],
    }
}

/// Builds the alternative access paths for `ctx` under `access`.
///
/// Empty groups are dropped, so an all-false record yields no groups.
pub fn build_groups(ctx: &RequestContext, access: &WorkflowAccess) -> Vec<RequirementGroup> {
    let mut groups = Vec::new();

    if let Some(department) = ctx.department() {
        let mut group = RequirementGroup::new("department");
        group.push_if(access.is_all_resource_owners_allowed, || {
            department
                .go_to_level(ALL_RESOURCE_OWNERS_LEVEL)
                .map(|scope| Requirement::AnyResourceOwnerBelow { scope })
        });
        group.push_if(access.is_parent_resource_owner_allowed, || {
            department.parent().map(|parent| Requirement::ParentResourceOwner { parent })
        });
        group.push_if(access.is_sibling_resource_owner_allowed, || {
            department.parent().map(|parent| Requirement::SiblingResourceOwner { parent })
        });
        group.push_if(access.is_resource_owner_allowed, || {
            Some(Requirement::ResourceOwner {
                department: department.clone(),
            })
        });
        groups.push(group);
    }

    let mut creator = RequirementGroup::new("creator");
    creator.push_if(access.is_creator_allowed, || {
        Some(Requirement::Creator {
            person_id: ctx.created_by,
        })
    });
    groups.push(creator);

    let mut task_owner = RequirementGroup::new("org_chart_task_owner");
    task_owner.push_if(access.is_org_chart_task_owner_allowed, || {
        Some(Requirement::OrgChartTaskOwner {
            project_id: ctx.project_id,
        })
    });
    groups.push(task_owner);

    let mut members = RequirementGroup::new("project_members");
    members.push_if(access.is_other_project_members_allowed, || {
        Some(Requirement::OtherProjectMember {
            project_id: ctx.project_id,
        })
    });
    groups.push(members);

    if let Some(position_id) = ctx.position_id {
        let project_id = ctx.project_id;
        let mut group = RequirementGroup::new("position");
        group.push_if(access.is_org_chart_write_allowed, || {
            Some(Requirement::OrgChartPositionAccess {
                project_id,
                position_id,
                level: AccessLevel::Write,
            })
        });
        group.push_if(access.is_org_chart_read_allowed, || {
            Some(Requirement::OrgChartPositionAccess {
                project_id,
                position_id,
                level: AccessLevel::Read,
            })
        });
        group.push_if(access.is_direct_task_owner_allowed, || {
            ctx.instance_id.map(|instance_id| Requirement::DirectTaskOwner {
                project_id,
                position_id,
                instance_id,
            })
        });
        groups.push(group);
    }

    let mut admin = RequirementGroup::new("org_admin");
    admin.push_if(access.is_org_admin_allowed, || {
        Some(Requirement::OrgAdmin {
            project_id: ctx.project_id,
        })
    });
    groups.push(admin);

    groups.retain(|group| !group.requirements.is_empty());
    groups
}
