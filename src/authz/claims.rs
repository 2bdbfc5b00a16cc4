//! Resolution of raw line-org role assignments into department ownership claims.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::org_units::{OrgUnitIdentifier, OrgUnitResolver};
use super::principal::{Claim, ClaimType};
use crate::errors::{AppError, AppResult};

pub const LINE_ORG_MANAGER_ROLE: &str = "LineOrgManager";
pub const RESOURCE_OWNER_ROLE: &str = "ResourceOwner";

/// A role assignment from the person profile, scoped to an org unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub name: String,
    /// SAP id or full department path.
    pub scope: String,
}

impl RoleAssignment {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
        }
    }

    fn claim_type(&self) -> Option<ClaimType> {
        if self.name.eq_ignore_ascii_case(LINE_ORG_MANAGER_ROLE) {
            Some(ClaimType::ResourceOwnerForDepartment)
        } else if self.name.eq_ignore_ascii_case(RESOURCE_OWNER_ROLE) {
            Some(ClaimType::DelegatedResourceOwnerForDepartment)
        } else {
            None
        }
    }
}

/// Person profile as handed over by the identity layer.
///
/// `roles` is `None` when the profile was fetched without expanding roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonProfile {
    pub person_id: Uuid,
    #[serde(default)]
    pub roles: Option<Vec<RoleAssignment>>,
}

pub struct ClaimsResolver<R> {
    org_units: R,
    lookup_timeout: Duration,
}

impl<R: OrgUnitResolver> ClaimsResolver<R> {
    pub fn new(org_units: R, lookup_timeout: Duration) -> Self {
        Self {
            org_units,
            lookup_timeout,
        }
    }

    /// Builds the ownership claims for `profile`.
    ///
    /// Each scope is resolved independently and concurrently; a scope that fails,
    /// times out or does not exist yields no claim without affecting the others.
    /// A profile without loaded roles is a caller bug and fails loudly.
    pub async fn resolve_ownership_claims(&self, profile: &PersonProfile) -> AppResult<HashSet<Claim>> {
        let roles = profile.roles.as_ref().ok_or_else(|| {
            AppError::contract_violation(format!(
                "roles must be loaded on profile {} before resolving claims",
                profile.person_id
            ))
        })?;

        let lookups = roles.iter().filter_map(|role| {
            let claim_type = role.claim_type()?;
            Some(self.resolve_scope(profile.person_id, role, claim_type))
        });

        let claims: HashSet<Claim> = join_all(lookups).await.into_iter().flatten().collect();

        tracing::debug!(
            person_id = %profile.person_id,
            claims = claims.len(),
            "resolved ownership claims"
        );
        Ok(claims)
    }

    async fn resolve_scope(&self, person_id: Uuid, role: &RoleAssignment, claim_type: ClaimType) -> Option<Claim> {
        let Some(identifier) = OrgUnitIdentifier::parse(&role.scope) else {
            tracing::warn!(%person_id, role = %role.name, "role assignment has an empty scope");
            return None;
        };

        let lookup = self.org_units.resolve_org_unit(&identifier);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(unit))) if !unit.full_department.is_empty() => Some(Claim {
                claim_type,
                value: unit.full_department,
            }),
            Ok(Ok(_)) => {
                tracing::warn!(%person_id, scope = %identifier, "org unit not found, skipping scope");
                None
            }
            Ok(Err(err)) => {
                tracing::warn!(%person_id, scope = %identifier, error = %err, "org unit lookup failed, skipping scope");
                None
            }
            Err(_) => {
                tracing::warn!(
                    %person_id,
                    scope = %identifier,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "org unit lookup timed out, skipping scope"
                );
                None
            }
        }
    }
}
