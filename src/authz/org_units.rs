use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::department::DepartmentPath;
use crate::errors::AppError;

/// A resolved organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub sap_id: String,
    pub full_department: DepartmentPath,
    #[serde(default)]
    pub name: Option<String>,
}

/// Scope value carried by a role assignment: a numeric SAP id or a full department path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrgUnitIdentifier {
    SapId(String),
    Department(DepartmentPath),
}

impl OrgUnitIdentifier {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            Some(Self::SapId(trimmed.to_string()))
        } else {
            Some(Self::Department(DepartmentPath::new(trimmed)))
        }
    }
}

impl fmt::Display for OrgUnitIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrgUnitIdentifier::SapId(id) => write!(f, "sap:{id}"),
            OrgUnitIdentifier::Department(path) => write!(f, "department:{path}"),
        }
    }
}

/// Looks up org units in the line organization.
///
/// A unit that does not exist is `Ok(None)`; `Err` is reserved for the lookup itself failing.
#[async_trait]
pub trait OrgUnitResolver: Send + Sync {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError>;
}

/// Resolver over a fixed set of units.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrgUnitResolver {
    units: Vec<OrgUnit>,
}

impl InMemoryOrgUnitResolver {
    pub fn new(units: impl IntoIterator<Item = OrgUnit>) -> Self {
        Self {
            units: units.into_iter().collect(),
        }
    }
}

#[async_trait]
impl OrgUnitResolver for InMemoryOrgUnitResolver {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
        let found = self.units.iter().find(|unit| match identifier {
            OrgUnitIdentifier::SapId(id) => &unit.sap_id == id,
            OrgUnitIdentifier::Department(path) => &unit.full_department == path,
        });
        Ok(found.cloned())
    }
}

/// Caches lookups of an inner resolver for a bounded TTL.
///
/// Misses (`None`) are cached like hits, errors are not cached.
pub struct CachingOrgUnitResolver<R> {
    inner: R,
    ttl: Duration,
    entries: RwLock<HashMap<OrgUnitIdentifier, (Option<OrgUnit>, Instant)>>,
}

impl<R: OrgUnitResolver> CachingOrgUnitResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn invalidate(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl<R: OrgUnitResolver> OrgUnitResolver for CachingOrgUnitResolver<R> {
    async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
        if let Some((unit, fetched_at)) = self.entries.read().await.get(identifier) {
            if fetched_at.elapsed() < self.ttl {
                return Ok(unit.clone());
            }
        }

        let unit = self.inner.resolve_org_unit(identifier).await?;
        self.entries
            .write()
            .await
            .insert(identifier.clone(), (unit.clone(), Instant::now()));
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingResolver {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OrgUnitResolver for CountingResolver {
        async fn resolve_org_unit(&self, identifier: &OrgUnitIdentifier) -> Result<Option<OrgUnit>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match identifier {
                OrgUnitIdentifier::SapId(id) if id == "500" => Err(AppError::internal("lookup failed")),
                OrgUnitIdentifier::SapId(id) => Ok(Some(OrgUnit {
                    sap_id: id.clone(),
                    full_department: DepartmentPath::new("TPD PRD MY"),
                    name: None,
                })),
                OrgUnitIdentifier::Department(_) => Ok(None),
            }
        }
    }

    #[test]
    fn numeric_scopes_are_sap_ids() {
        assert_eq!(
            OrgUnitIdentifier::parse(" 52345678 "),
            Some(OrgUnitIdentifier::SapId("52345678".to_string()))
        );
        assert_eq!(
            OrgUnitIdentifier::parse("TPD PRD"),
            Some(OrgUnitIdentifier::Department(DepartmentPath::new("TPD PRD")))
        );
        assert_eq!(OrgUnitIdentifier::parse("  "), None);
    }

    #[tokio::test]
    async fn in_memory_resolver_matches_path_case_insensitively() {
        let resolver = InMemoryOrgUnitResolver::new(vec![OrgUnit {
            sap_id: "1".to_string(),
            full_department: DepartmentPath::new("TPD PRD MY"),
            name: Some("My dept".to_string()),
        }]);

        let id = OrgUnitIdentifier::parse("tpd prd my").unwrap();
        assert!(resolver.resolve_org_unit(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingOrgUnitResolver::new(
            CountingResolver { calls: calls.clone() },
            Duration::from_secs(60),
        );
        let id = OrgUnitIdentifier::parse("123").unwrap();

        cache.resolve_org_unit(&id).await.unwrap();
        cache.resolve_org_unit(&id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.resolve_org_unit(&id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_does_not_keep_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingOrgUnitResolver::new(
            CountingResolver { calls: calls.clone() },
            Duration::from_secs(60),
        );
        let id = OrgUnitIdentifier::parse("500").unwrap();

        assert!(cache.resolve_org_unit(&id).await.is_err());
        assert!(cache.resolve_org_unit(&id).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingOrgUnitResolver::new(
            CountingResolver { calls: calls.clone() },
            Duration::from_millis(0),
        );
        let id = OrgUnitIdentifier::parse("123").unwrap();

        cache.resolve_org_unit(&id).await.unwrap();
        cache.resolve_org_unit(&id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
