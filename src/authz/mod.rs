//! Authorization module - workflow step access evaluation
//!
//! This module decides who may act on each workflow step of a request:
//! - Department paths and resource-owner claims (direct and delegated)
//! - Claims resolution from line-org role assignments
//! - Per (subtype, step) capability table, failing closed
//! - Requirement groups evaluated against claims and org-chart roles
//! - Trusted application / full control bypass

mod access;
mod claims;
mod department;
mod evaluator;
mod org_chart;
mod org_units;
mod principal;
mod request;
mod requirements;

pub use access::{RequestSubtype, StepName, WorkflowAccess, WorkflowAccessKey, WorkflowAccessTable};
pub use claims::{ClaimsResolver, PersonProfile, RoleAssignment, LINE_ORG_MANAGER_ROLE, RESOURCE_OWNER_ROLE};
pub use department::DepartmentPath;
pub use evaluator::{DefaultPolicyEvaluator, Outcome, PolicyEvaluator};
pub use org_chart::{AccessLevel, OrgChartMemberships, OrgChartRoleResolver, PositionGrant, TaskOwnership};
pub use org_units::{CachingOrgUnitResolver, InMemoryOrgUnitResolver, OrgUnit, OrgUnitIdentifier, OrgUnitResolver};
pub use principal::{Claim, ClaimType, Principal, PrincipalKind};
pub use request::RequestContext;
pub use requirements::{
    build_groups, bypass_group, Requirement, RequirementGroup, UnmetRequirement, ALL_RESOURCE_OWNERS_LEVEL,
};

/// Well-known role names
pub mod roles {
    pub const FULL_CONTROL: &str = "resources.full_control";
    pub const INTERNAL_FULL_CONTROL: &str = "resources.internal.full_control";
}
