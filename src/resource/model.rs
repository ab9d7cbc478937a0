//! Canonical records produced by discovery and tagging

use super::tags::Tags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Region reported for global services
pub const GLOBAL_REGION: &str = "global";

/// A discovered resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub resource_type: String,
    pub resource_id: String,
    pub arn: String,
    pub name: String,
    /// ISO-8601, or empty when the provider exposes no creation date
    pub creation_date: String,
    pub tags: Tags,
    pub tags_number: usize,
    pub metadata: Map<String, Value>,
}

impl Resource {
    /// Replace the tag set, keeping `tags_number` in sync
    pub fn set_tags(&mut self, tags: Tags) {
        self.tags_number = tags.len();
        self.tags = tags;
    }

    /// `service:type` label of this resource
    pub fn label(&self) -> String {
        format!("{}:{}", self.service, self.resource_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of discovering one `(account, region, service, type)`
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub label: String,
    pub status: Status,
    pub error: String,
    pub resources: Vec<Resource>,
}

impl Discovery {
    pub fn success(label: String, resources: Vec<Resource>) -> Self {
        Self {
            label,
            status: Status::Success,
            error: String::new(),
            resources,
        }
    }

    /// Failed discovery never carries resources
    pub fn failure(label: String, error: impl Into<String>) -> Self {
        Self {
            label,
            status: Status::Error,
            error: error.into(),
            resources: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Direction of a tagging job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    Apply,
    Remove,
}

impl TagAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Remove => "remove",
        }
    }
}

/// Outcome of tagging one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOutcome {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub resource_type: String,
    /// Human identifier of the resource
    pub resource_id: String,
    pub arn: String,
    pub status: Status,
    pub error: String,
}

impl TagOutcome {
    pub fn for_resource(resource: &Resource, result: Result<(), String>) -> Self {
        let (status, error) = match result {
            Ok(()) => (Status::Success, String::new()),
            Err(e) => (Status::Error, e),
        };
        Self {
            account_id: resource.account_id.clone(),
            region: resource.region.clone(),
            service: resource.service.clone(),
            resource_type: resource.resource_type.clone(),
            resource_id: resource.resource_id.clone(),
            arn: resource.arn.clone(),
            status,
            error,
        }
    }
}

/// Per-triple payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutcomePayload {
    #[serde(rename = "resources")]
    Resources(Vec<Resource>),
    #[serde(rename = "tag_results")]
    Tagging(Vec<TagOutcome>),
}

impl OutcomePayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Resources(r) => r.len(),
            Self::Tagging(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one `(account, region, service, type)` work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub resource_type: String,
    pub status: Status,
    pub error: String,
    #[serde(flatten)]
    pub payload: OutcomePayload,
}

impl RunOutcome {
    pub fn label(&self) -> String {
        format!("{}:{}", self.service, self.resource_type)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
