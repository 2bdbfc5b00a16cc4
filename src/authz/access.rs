//! Per `(request subtype, workflow step)` capability table.
//!
//! The table is static configuration: built in, or loaded from a TOML file at startup.
//! Known subtypes and steps are typed; entries outside the known vocabulary must be
//! flagged `custom = true` so that typos are rejected at load time instead of silently
//! resolving to "no access". Lookups that miss return [`WorkflowAccess::DEFAULT`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestSubtype {
    Normal,
    Direct,
    JointVenture,
    Enterprise,
    ChangeResource,
    RemoveResource,
    Adjustment,
    Contractor,
}

impl RequestSubtype {
    pub const ALL: [RequestSubtype; 8] = [
        RequestSubtype::Normal,
        RequestSubtype::Direct,
        RequestSubtype::JointVenture,
        RequestSubtype::Enterprise,
        RequestSubtype::ChangeResource,
        RequestSubtype::RemoveResource,
        RequestSubtype::Adjustment,
        RequestSubtype::Contractor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSubtype::Normal => "normal",
            RequestSubtype::Direct => "direct",
            RequestSubtype::JointVenture => "joint-venture",
            RequestSubtype::Enterprise => "enterprise",
            RequestSubtype::ChangeResource => "change-resource",
            RequestSubtype::RemoveResource => "remove-resource",
            RequestSubtype::Adjustment => "adjustment",
            RequestSubtype::Contractor => "contractor",
        }
    }

    /// Steps of this subtype's workflow, initial step first.
    pub fn steps(&self) -> &'static [StepName] {
        use StepName::*;
        match self {
            RequestSubtype::Normal | RequestSubtype::Direct => &[Created, Proposal, Approval, Provisioning],
            RequestSubtype::JointVenture => &[Created, Approval, Provisioning],
            RequestSubtype::Enterprise => &[Created, Provisioning],
            RequestSubtype::ChangeResource | RequestSubtype::RemoveResource | RequestSubtype::Adjustment => {
                &[Created, Proposal, Accept, Provisioning]
            }
            RequestSubtype::Contractor => &[Created, Approval, Provisioning],
        }
    }
}

impl fmt::Display for RequestSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestSubtype {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s);
        RequestSubtype::ALL
            .into_iter()
            .find(|subtype| normalize_key(subtype.as_str()) == key)
            .ok_or_else(|| AppError::bad_request(format!("unknown request subtype '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Created,
    Proposal,
    Approval,
    Accept,
    Provisioning,
}

impl StepName {
    pub const ALL: [StepName; 5] = [
        StepName::Created,
        StepName::Proposal,
        StepName::Approval,
        StepName::Accept,
        StepName::Provisioning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Created => "created",
            StepName::Proposal => "proposal",
            StepName::Approval => "approval",
            StepName::Accept => "accept",
            StepName::Provisioning => "provisioning",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s);
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str() == key)
            .ok_or_else(|| AppError::bad_request(format!("unknown workflow step '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkflowAccessKey {
    Known(RequestSubtype, StepName),
    /// Normalized (lowercase, no separators) pair outside the typed vocabulary.
    Custom { subtype: String, step: String },
}

impl WorkflowAccessKey {
    pub fn new(subtype: RequestSubtype, step: StepName) -> Self {
        Self::Known(subtype, step)
    }

    /// Typed key when both parts are known, a normalized custom key otherwise.
    pub fn parse(subtype: &str, step: &str) -> Self {
        match (subtype.parse::<RequestSubtype>(), step.parse::<StepName>()) {
            (Ok(subtype), Ok(step)) => Self::Known(subtype, step),
            _ => Self::Custom {
                subtype: normalize_key(subtype),
                step: normalize_key(step),
            },
        }
    }
}

impl fmt::Display for WorkflowAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowAccessKey::Known(subtype, step) => write!(f, "{subtype}/{step}"),
            WorkflowAccessKey::Custom { subtype, step } => write!(f, "{subtype}/{step} (custom)"),
        }
    }
}

/// Capability flags for one workflow step. All false means only the bypass applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAccess {
    pub is_resource_owner_allowed: bool,
    pub is_parent_resource_owner_allowed: bool,
    pub is_sibling_resource_owner_allowed: bool,
    pub is_all_resource_owners_allowed: bool,
    pub is_creator_allowed: bool,
    pub is_direct_task_owner_allowed: bool,
    pub is_org_chart_task_owner_allowed: bool,
    pub is_other_project_members_allowed: bool,
    pub is_org_chart_read_allowed: bool,
    pub is_org_chart_write_allowed: bool,
    pub is_org_admin_allowed: bool,
}

impl WorkflowAccess {
    pub const DEFAULT: WorkflowAccess = WorkflowAccess {
        is_resource_owner_allowed: false,
        is_parent_resource_owner_allowed: false,
        is_sibling_resource_owner_allowed: false,
        is_all_resource_owners_allowed: false,
        is_creator_allowed: false,
        is_direct_task_owner_allowed: false,
        is_org_chart_task_owner_allowed: false,
        is_other_project_members_allowed: false,
        is_org_chart_read_allowed: false,
        is_org_chart_write_allowed: false,
        is_org_admin_allowed: false,
    };

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

}

/// Row of the TOML table file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessEntry {
    subtype: String,
    step: String,
    #[serde(default)]
    custom: bool,
    #[serde(default)]
    resource_owner: bool,
    #[serde(default)]
    parent_resource_owner: bool,
    #[serde(default)]
    sibling_resource_owner: bool,
    #[serde(default)]
    all_resource_owners: bool,
    #[serde(default)]
    creator: bool,
    #[serde(default)]
    direct_task_owner: bool,
    #[serde(default)]
    org_chart_task_owner: bool,
    #[serde(default)]
    other_project_members: bool,
    #[serde(default)]
    org_chart_read: bool,
    #[serde(default)]
    org_chart_write: bool,
    #[serde(default)]
    org_admin: bool,
}

impl AccessEntry {
    fn access(&self) -> WorkflowAccess {
        WorkflowAccess {
            is_resource_owner_allowed: self.resource_owner,
            is_parent_resource_owner_allowed: self.parent_resource_owner,
            is_sibling_resource_owner_allowed: self.sibling_resource_owner,
            is_all_resource_owners_allowed: self.all_resource_owners,
            is_creator_allowed: self.creator,
            is_direct_task_owner_allowed: self.direct_task_owner,
            is_org_chart_task_owner_allowed: self.org_chart_task_owner,
            is_other_project_members_allowed: self.other_project_members,
            is_org_chart_read_allowed: self.org_chart_read,
            is_org_chart_write_allowed: self.org_chart_write,
            is_org_admin_allowed: self.org_admin,
        }
    }

    fn key(&self, index: usize) -> AppResult<WorkflowAccessKey> {
        if self.custom {
            if normalize_key(&self.subtype).is_empty() || normalize_key(&self.step).is_empty() {
                return Err(AppError::configuration(format!(
                    "access entry #{index}: custom entries need a subtype and a step"
                )));
            }
            return match WorkflowAccessKey::parse(&self.subtype, &self.step) {
                WorkflowAccessKey::Known(subtype, step) => Err(AppError::configuration(format!(
                    "access entry #{index}: {subtype}/{step} is a known step and cannot be custom (remove custom = true)"
                ))),
                custom => Ok(custom),
            };
        }

        let subtype: RequestSubtype = self.subtype.parse().map_err(|_| {
            AppError::configuration(format!(
                "access entry #{index}: unknown subtype '{}' (set custom = true for non-standard subtypes)",
                self.subtype
            ))
        })?;
        let step: StepName = self.step.parse().map_err(|_| {
            AppError::configuration(format!(
                "access entry #{index}: unknown step '{}' (set custom = true for non-standard steps)",
                self.step
            ))
        })?;
        if !subtype.steps().contains(&step) {
            return Err(AppError::configuration(format!(
                "access entry #{index}: the {subtype} workflow has no '{step}' step"
            )));
        }
        Ok(WorkflowAccessKey::Known(subtype, step))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessFile {
    #[serde(default)]
    access: Vec<AccessEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowAccessTable {
    entries: HashMap<WorkflowAccessKey, WorkflowAccess>,
}

impl WorkflowAccessTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The access rules shipped with the engine.
    pub fn builtin() -> Self {
        let mut table = Self::empty();

        let created_by_line_or_project = WorkflowAccess {
            is_all_resource_owners_allowed: true,
            is_creator_allowed: true,
            is_org_chart_write_allowed: true,
            is_org_admin_allowed: true,
            ..WorkflowAccess::DEFAULT
        };
        let resource_owner_proposal = WorkflowAccess {
            is_resource_owner_allowed: true,
            is_parent_resource_owner_allowed: true,
            is_sibling_resource_owner_allowed: true,
            ..WorkflowAccess::DEFAULT
        };
        let task_owner_approval = WorkflowAccess {
            is_creator_allowed: true,
            is_direct_task_owner_allowed: true,
            is_org_chart_task_owner_allowed: true,
            is_org_chart_write_allowed: true,
            is_org_admin_allowed: true,
            ..WorkflowAccess::DEFAULT
        };

        for subtype in [RequestSubtype::Normal, RequestSubtype::Direct] {
            table.insert_known(subtype, StepName::Created, WorkflowAccess {
                is_org_chart_task_owner_allowed: true,
                ..created_by_line_or_project
            });
            table.insert_known(subtype, StepName::Proposal, resource_owner_proposal);
            table.insert_known(subtype, StepName::Approval, task_owner_approval);
        }

        table.insert_known(RequestSubtype::JointVenture, StepName::Created, created_by_line_or_project);
        table.insert_known(RequestSubtype::JointVenture, StepName::Approval, WorkflowAccess {
            is_direct_task_owner_allowed: true,
            is_org_chart_write_allowed: true,
            is_org_admin_allowed: true,
            ..WorkflowAccess::DEFAULT
        });

        table.insert_known(RequestSubtype::Enterprise, StepName::Created, created_by_line_or_project);

        for subtype in [
            RequestSubtype::ChangeResource,
            RequestSubtype::RemoveResource,
            RequestSubtype::Adjustment,
        ] {
            table.insert_known(subtype, StepName::Created, WorkflowAccess {
                is_creator_allowed: true,
                ..resource_owner_proposal
            });
            table.insert_known(subtype, StepName::Proposal, resource_owner_proposal);
            table.insert_known(subtype, StepName::Accept, WorkflowAccess {
                is_direct_task_owner_allowed: true,
                is_org_chart_task_owner_allowed: true,
                is_org_chart_read_allowed: true,
                is_org_chart_write_allowed: true,
                is_org_admin_allowed: true,
                ..WorkflowAccess::DEFAULT
            });
        }

        table.insert_known(RequestSubtype::Contractor, StepName::Created, WorkflowAccess {
            is_creator_allowed: true,
            is_other_project_members_allowed: true,
            is_org_chart_write_allowed: true,
            is_org_admin_allowed: true,
            ..WorkflowAccess::DEFAULT
        });
        table.insert_known(RequestSubtype::Contractor, StepName::Approval, WorkflowAccess {
            is_org_chart_task_owner_allowed: true,
            is_org_chart_write_allowed: true,
            is_org_admin_allowed: true,
            ..WorkflowAccess::DEFAULT
        });

        // Provisioning steps are driven by the system actor only.
        table
    }

    fn insert_known(&mut self, subtype: RequestSubtype, step: StepName, access: WorkflowAccess) {
        self.entries.insert(WorkflowAccessKey::Known(subtype, step), access);
    }

    /// Parses and validates a TOML table.
    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        let file: AccessFile = toml::from_str(source)
            .map_err(|err| AppError::configuration(format!("invalid workflow access table: {err}")))?;

        let mut entries = HashMap::with_capacity(file.access.len());
        for (index, entry) in file.access.iter().enumerate() {
            let key = entry.key(index)?;
            if entries.insert(key.clone(), entry.access()).is_some() {
                return Err(AppError::configuration(format!(
                    "access entry #{index}: duplicate entry for {key}"
                )));
            }
        }

        tracing::debug!(entries = entries.len(), "loaded workflow access table");
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> AppResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            AppError::configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Fail-closed lookup by raw strings.
    pub fn lookup(&self, subtype: &str, step: &str) -> WorkflowAccess {
        self.get(&WorkflowAccessKey::parse(subtype, step))
    }

    pub fn get(&self, key: &WorkflowAccessKey) -> WorkflowAccess {
        match self.entries.get(key) {
            Some(access) => *access,
            None => {
                tracing::debug!(key = %key, "no workflow access entry, using default");
                WorkflowAccess::DEFAULT
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
