//! Job descriptors and work-item expansion

use crate::resource::{parse_declared_tags, Catalog, TagAction, TagSet, GLOBAL_REGION};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Rejected job input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid account id '{0}': expected 12 digits")]
    InvalidAccount(String),

    #[error("Invalid region '{0}'")]
    InvalidRegion(String),

    #[error("Invalid target '{0}': expected service:Type")]
    InvalidTarget(String),

    #[error("Unsupported target '{0}'")]
    UnknownTarget(String),

    #[error("Tagging jobs need at least one declared tag")]
    EmptyTags,

    #[error("Job has no {0}")]
    Empty(&'static str),
}

/// A `service:Type` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceType {
    pub service: String,
    pub resource_type: String,
}

impl ServiceType {
    pub fn new(service: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            resource_type: resource_type.into(),
        }
    }
}

impl FromStr for ServiceType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (service, resource_type) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| JobError::InvalidTarget(s.to_string()))?;
        let (service, resource_type) = (service.trim(), resource_type.trim());
        if service.is_empty() || resource_type.is_empty() || resource_type.contains(':') {
            return Err(JobError::InvalidTarget(s.to_string()));
        }
        Ok(Self::new(service, resource_type))
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.resource_type)
    }
}

/// What a job does with each triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Discover,
    Tag { action: TagAction, tags: TagSet },
}

/// A validated job
#[derive(Debug, Clone)]
pub struct Job {
    pub accounts: Vec<String>,
    pub regions: Vec<String>,
    pub targets: Vec<ServiceType>,
    pub action: JobAction,
}

/// One `(account, region, service, type)` unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub account_id: String,
    pub region: String,
    pub target: ServiceType,
}

impl WorkItem {
    pub fn label(&self) -> String {
        format!("{} {}/{}", self.target, self.account_id, self.region)
    }
}

pub fn validate_account_id(account_id: &str) -> Result<(), JobError> {
    if account_id.len() == 12 && account_id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(JobError::InvalidAccount(account_id.to_string()))
    }
}

/// Accepts `global` and names like `eu-west-1` or `us-gov-east-1`
pub fn validate_region(region: &str) -> Result<(), JobError> {
    if region == GLOBAL_REGION {
        return Ok(());
    }

    let parts: Vec<&str> = region.split('-').collect();
    let valid = parts.len() >= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
        && parts[0].bytes().all(|b| b.is_ascii_lowercase())
        && parts
            .last()
            .is_some_and(|p| p.bytes().all(|b| b.is_ascii_digit()));

    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidRegion(region.to_string()))
    }
}

impl Job {
    /// Validate inputs against the catalog
    pub fn new(
        accounts: Vec<String>,
        regions: Vec<String>,
        targets: Vec<ServiceType>,
        action: JobAction,
        catalog: &Catalog,
    ) -> Result<Self, JobError> {
        if accounts.is_empty() {
            return Err(JobError::Empty("accounts"));
        }
        if regions.is_empty() {
            return Err(JobError::Empty("regions"));
        }
        if targets.is_empty() {
            return Err(JobError::Empty("targets"));
        }

        for account in &accounts {
            validate_account_id(account)?;
        }
        for region in &regions {
            validate_region(region)?;
        }
        for target in &targets {
            catalog
                .get(&target.service, &target.resource_type)
                .map_err(|_| JobError::UnknownTarget(target.to_string()))?;
        }
        if let JobAction::Tag { tags, .. } = &action {
            if tags.is_empty() {
                return Err(JobError::EmptyTags);
            }
        }

        Ok(Self {
            accounts,
            regions,
            targets,
            action,
        })
    }

    /// Expand the Cartesian product of accounts, targets and regions
    ///
    /// Global adapters yield one item per account with region `global`.
    /// Repeated inputs are expanded once.
    pub fn work_items(&self, catalog: &Catalog) -> Vec<WorkItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for account in &self.accounts {
            for target in &self.targets {
                let global = catalog
                    .get(&target.service, &target.resource_type)
                    .map(|spec| spec.global)
                    .unwrap_or(false);

                let regions: Vec<&str> = if global {
                    vec![GLOBAL_REGION]
                } else {
                    self.regions
                        .iter()
                        .map(String::as_str)
                        .filter(|r| *r != GLOBAL_REGION)
                        .collect()
                };

                for region in regions {
                    let item = WorkItem {
                        account_id: account.clone(),
                        region: region.to_string(),
                        target: target.clone(),
                    };
                    if seen.insert(item.clone()) {
                        items.push(item);
                    }
                }
            }
        }

        items
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorAction {
    #[default]
    Discover,
    Apply,
    Remove,
}

/// Job file contents (YAML or JSON)
///
/// ```yaml
/// accounts: ["123456789012"]
/// regions: [eu-west-1, us-east-1]
/// targets: ["kms:Key", "s3:Bucket"]
/// action: apply
/// tags: "team:core,env:prod"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescriptor {
    pub accounts: Vec<String>,
    pub regions: Vec<String>,
    pub targets: Vec<String>,
    #[serde(default)]
    pub action: DescriptorAction,
    #[serde(default)]
    pub tags: Option<String>,
}

impl JobDescriptor {
    /// Parse a descriptor (JSON is accepted as YAML)
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse job descriptor")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn into_job(self, catalog: &Catalog) -> Result<Job, JobError> {
        let targets = self
            .targets
            .iter()
            .map(|t| t.parse())
            .collect::<Result<Vec<ServiceType>, _>>()?;

        let declared = parse_declared_tags(self.tags.as_deref().unwrap_or(""));
        let action = match self.action {
            DescriptorAction::Discover => JobAction::Discover,
            DescriptorAction::Apply => JobAction::Tag {
                action: TagAction::Apply,
                tags: declared,
            },
            DescriptorAction::Remove => JobAction::Tag {
                action: TagAction::Remove,
                tags: declared,
            },
        };

        Job::new(self.accounts, self.regions, targets, action, catalog)
    }
}
