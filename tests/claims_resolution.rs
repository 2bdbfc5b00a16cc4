use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use resource_authz::authz::{
    CachingOrgUnitResolver, ClaimType, ClaimsResolver, DepartmentPath, InMemoryOrgUnitResolver, OrgUnit,
    OrgUnitIdentifier, OrgUnitResolver, PersonProfile, RoleAssignment, LINE_ORG_MANAGER_ROLE, RESOURCE_OWNER_ROLE,
};
use resource_authz::AppError;

fn unit(sap_id: &str, department: &str) -> OrgUnit {
    OrgUnit {
        sap_id: sap_id.to_string(),
        full_department: DepartmentPath::new(department),
        name: None,
    }
}

/// Fails every SAP id lookup, answers department lookups from a fixed list.
struct FlakyResolver {
    units: InMemoryOrgUnitResolver,
}

#[async_trait]
impl OrgUnitResolver for FlakyResolver {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
        match identifier {
            OrgUnitIdentifier::SapId(_) => Err(AppError::internal("line org service unavailable")),
            OrgUnitIdentifier::Department(_) => self.units.resolve_org_unit(identifier).await,
        }
    }
}

/// Sleeps before answering lookups of one department.
struct SlowResolver {
    slow: DepartmentPath,
    delay: Duration,
    units: InMemoryOrgUnitResolver,
}

#[async_trait]
impl OrgUnitResolver for SlowResolver {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
        if matches!(identifier, OrgUnitIdentifier::Department(path) if *path == self.slow) {
            tokio::time::sleep(self.delay).await;
        }
        self.units.resolve_org_unit(identifier).await
    }
}

struct CountingResolver {
    calls: Arc<AtomicUsize>,
    units: InMemoryOrgUnitResolver,
}

#[async_trait]
impl OrgUnitResolver for CountingResolver {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.units.resolve_org_unit(identifier).await
    }
}

fn profile(roles: Vec<RoleAssignment>) -> PersonProfile {
    PersonProfile {
        person_id: Uuid::new_v4(),
        roles: Some(roles),
    }
}

#[tokio::test]
async fn one_failed_lookup_does_not_drop_the_other_claim() {
    let resolver = ClaimsResolver::new(
        FlakyResolver {
            units: InMemoryOrgUnitResolver::new(vec![unit("52752458", "TPD PRD MY TEST")]),
        },
        Duration::from_secs(1),
    );

    let claims = resolver
        .resolve_ownership_claims(&profile(vec![
            RoleAssignment::new(LINE_ORG_MANAGER_ROLE, "52752458"),
            RoleAssignment::new(LINE_ORG_MANAGER_ROLE, "TPD PRD MY TEST"),
        ]))
        .await
        .unwrap();

    assert_eq!(claims.len(), 1);
    let claim = claims.iter().next().unwrap();
    assert_eq!(claim.claim_type, ClaimType::ResourceOwnerForDepartment);
    assert_eq!(claim.value, DepartmentPath::new("TPD PRD MY TEST"));
}

#[tokio::test]
async fn slow_lookup_times_out_without_blocking_siblings() {
    let resolver = ClaimsResolver::new(
        SlowResolver {
            slow: DepartmentPath::new("TPD PRD SLOW"),
            delay: Duration::from_secs(5),
            units: InMemoryOrgUnitResolver::new(vec![
                unit("1", "TPD PRD SLOW"),
                unit("2", "TPD PRD FAST"),
            ]),
        },
        Duration::from_millis(50),
    );

    let started = std::time::Instant::now();
    let claims = resolver
        .resolve_ownership_claims(&profile(vec![
            RoleAssignment::new(RESOURCE_OWNER_ROLE, "TPD PRD SLOW"),
            RoleAssignment::new(RESOURCE_OWNER_ROLE, "TPD PRD FAST"),
        ]))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(claims.len(), 1);
    let claim = claims.iter().next().unwrap();
    assert_eq!(claim.claim_type, ClaimType::DelegatedResourceOwnerForDepartment);
    assert_eq!(claim.value, DepartmentPath::new("TPD PRD FAST"));
}

#[tokio::test]
async fn unknown_units_and_unrelated_roles_yield_no_claims() {
    let resolver = ClaimsResolver::new(InMemoryOrgUnitResolver::default(), Duration::from_secs(1));

    let claims = resolver
        .resolve_ownership_claims(&profile(vec![
            RoleAssignment::new(LINE_ORG_MANAGER_ROLE, "TPD NOWHERE"),
            RoleAssignment::new("Fusion.Admin", "TPD PRD"),
        ]))
        .await
        .unwrap();

    assert!(claims.is_empty());
}

#[tokio::test]
async fn profile_without_roles_is_a_contract_violation() {
    let resolver = ClaimsResolver::new(InMemoryOrgUnitResolver::default(), Duration::from_secs(1));

    let err = resolver
        .resolve_ownership_claims(&PersonProfile {
            person_id: Uuid::new_v4(),
            roles: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ContractViolation(_)));
}

#[tokio::test]
async fn caching_resolver_serves_repeated_scopes_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cached = CachingOrgUnitResolver::new(
        CountingResolver {
            calls: calls.clone(),
            units: InMemoryOrgUnitResolver::new(vec![unit("52752458", "TPD PRD MY TEST")]),
        },
        Duration::from_secs(900),
    );
    let resolver = ClaimsResolver::new(cached, Duration::from_secs(1));
    let person = profile(vec![RoleAssignment::new(LINE_ORG_MANAGER_ROLE, "52752458")]);

    let first = resolver.resolve_ownership_claims(&person).await.unwrap();
    let second = resolver.resolve_ownership_claims(&person).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
