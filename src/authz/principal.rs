use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::department::DepartmentPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimType {
    ResourceOwnerForDepartment,
    DelegatedResourceOwnerForDepartment,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::ResourceOwnerForDepartment => "ResourceOwnerForDepartment",
            ClaimType::DelegatedResourceOwnerForDepartment => "DelegatedResourceOwnerForDepartment",
        }
    }
}

/// A synthetic `(type, value)` claim; the value is a full department path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub value: DepartmentPath,
}

impl Claim {
    pub fn resource_owner(department: impl Into<DepartmentPath>) -> Self {
        Self {
            claim_type: ClaimType::ResourceOwnerForDepartment,
            value: department.into(),
        }
    }

    pub fn delegated_resource_owner(department: impl Into<DepartmentPath>) -> Self {
        Self {
            claim_type: ClaimType::DelegatedResourceOwnerForDepartment,
            value: department.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    #[default]
    Person,
    TrustedApplication,
}

/// Principal represents the authenticated caller with its cached claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub person_id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub kind: PrincipalKind,
    #[serde(default)]
    pub roles: HashSet<String>,
    #[serde(default)]
    pub claims: HashSet<Claim>,
}

impl Principal {
    pub fn new(person_id: Uuid) -> Self {
        Self {
            person_id,
            display_name: None,
            kind: PrincipalKind::Person,
            roles: HashSet::new(),
            claims: HashSet::new(),
        }
    }

    pub fn trusted_application(app_id: Uuid) -> Self {
        Self {
            kind: PrincipalKind::TrustedApplication,
            ..Self::new(app_id)
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_claims(mut self, claims: impl IntoIterator<Item = Claim>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_trusted_application(&self) -> bool {
        self.kind == PrincipalKind::TrustedApplication
    }

    pub fn has_full_control(&self) -> bool {
        self.has_role(super::roles::FULL_CONTROL) || self.has_role(super::roles::INTERNAL_FULL_CONTROL)
    }

    /// Departments owned directly or through delegation.
    pub fn owned_departments(&self) -> impl Iterator<Item = &DepartmentPath> {
        self.claims.iter().map(|claim| &claim.value)
    }

    /// Owns `department` exactly, or anything below it when `include_descendants` is set.
    pub fn owns_department(&self, department: &DepartmentPath, include_descendants: bool) -> bool {
        if department.is_empty() {
            return false;
        }
        self.owned_departments().any(|owned| {
            !owned.is_empty()
                && (owned == department || (include_descendants && department.is_ancestor_of(owned)))
        })
    }

    pub fn owns_any_department_under(&self, department: &DepartmentPath) -> bool {
        self.owns_department(department, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ownership_ignores_descendants() {
        let principal = Principal::new(Uuid::new_v4())
            .with_claims(vec![Claim::resource_owner("TPD PRD MY TEST DEP1")]);

        let parent = DepartmentPath::new("TPD PRD MY TEST");
        assert!(!principal.owns_department(&parent, false));
        assert!(principal.owns_department(&parent, true));
    }

    #[test]
    fn delegated_claims_count_as_ownership() {
        let principal = Principal::new(Uuid::new_v4())
            .with_claims(vec![Claim::delegated_resource_owner("TPD PRD MY")]);

        assert!(principal.owns_department(&DepartmentPath::new("tpd prd my"), false));
    }

    #[test]
    fn empty_department_is_never_owned() {
        let principal = Principal::new(Uuid::new_v4())
            .with_claims(vec![Claim::resource_owner("")]);

        assert!(!principal.owns_department(&DepartmentPath::default(), true));
    }

    #[test]
    fn role_match_is_case_insensitive() {
        let principal = Principal::new(Uuid::new_v4())
            .with_roles(vec!["Resources.Full_Control".to_string()]);
        assert!(principal.has_full_control());
    }
}
