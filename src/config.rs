use std::path::PathBuf;
use std::time::Duration;

use crate::authz::WorkflowAccessTable;
use crate::errors::{AppError, AppResult};

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 900;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    /// TOML access table; the built-in table is used when unset.
    pub workflow_access_path: Option<PathBuf>,
    pub org_unit_lookup_timeout: Duration,
    pub org_unit_cache_ttl: Duration,
    pub database_url: Option<String>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            workflow_access_path: None,
            org_unit_lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            org_unit_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            database_url: None,
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthzConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_ms = parse_u64(var("ORG_UNIT_LOOKUP_TIMEOUT_MS"), "ORG_UNIT_LOOKUP_TIMEOUT_MS", DEFAULT_LOOKUP_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(AppError::configuration("ORG_UNIT_LOOKUP_TIMEOUT_MS must be greater than zero"));
        }
        let ttl_secs = parse_u64(var("ORG_UNIT_CACHE_TTL_SECS"), "ORG_UNIT_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;

        Ok(Self {
            workflow_access_path: var("WORKFLOW_ACCESS_PATH").map(PathBuf::from),
            org_unit_lookup_timeout: Duration::from_millis(timeout_ms),
            org_unit_cache_ttl: Duration::from_secs(ttl_secs),
            database_url: var("DATABASE_URL"),
        })
    }

    pub fn access_table(&self) -> AppResult<WorkflowAccessTable> {
        match &self.workflow_access_path {
            Some(path) => {
                let table = WorkflowAccessTable::from_path(path)?;
                tracing::info!(path = %path.display(), entries = table.len(), "workflow access table loaded");
                Ok(table)
            }
            None => Ok(WorkflowAccessTable::builtin()),
        }
    }
}

fn parse_u64(value: Option<String>, key: &str, default: u64) -> AppResult<u64> {
    match value {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| AppError::configuration(format!("{key} must be a non-negative integer, got '{raw}'"))),
        None => Ok(default),
    }
}
