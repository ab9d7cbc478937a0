//! ARN Builder
//!
//! Renders ARN templates such as
//! `arn:aws:sqs:{region}:{account_id}:{name}` and reads ARNs the provider
//! returns directly.

use super::value::lookup_str;
use crate::error::{EngineError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Placeholders a template may use
pub const PLACEHOLDERS: &[&str] = &["region", "account_id", "resource_id", "name", "database"];

/// Values bound to template placeholders
#[derive(Debug, Clone, Default)]
pub struct ArnVars<'a> {
    vars: HashMap<&'static str, &'a str>,
}

impl<'a> ArnVars<'a> {
    pub fn new(region: &'a str, account_id: &'a str, resource_id: &'a str) -> Self {
        let mut vars = HashMap::new();
        vars.insert("region", region);
        vars.insert("account_id", account_id);
        vars.insert("resource_id", resource_id);
        Self { vars }
    }

    pub fn with_name(mut self, name: &'a str) -> Self {
        self.vars.insert("name", name);
        self
    }

    pub fn with_database(mut self, database: &'a str) -> Self {
        self.vars.insert("database", database);
        self
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.vars.get(key).copied()
    }
}

/// Names of the placeholders in a template
pub fn placeholders(template: &str) -> Result<Vec<&str>> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(EngineError::catalog(format!(
                "Unclosed placeholder in ARN template: {}",
                template
            )));
        };
        names.push(&after[..end]);
        rest = &after[end + 1..];
    }

    Ok(names)
}

/// Substitute placeholders in a template
pub fn build(template: &str, vars: &ArnVars<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(EngineError::catalog(format!(
                "Unclosed placeholder in ARN template: {}",
                template
            )));
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| {
            EngineError::catalog(format!(
                "Missing variable '{}' for ARN template {}",
                name, template
            ))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Read an ARN the provider returned in `field`
pub fn passthrough(item: &Value, field: &str) -> Option<String> {
    lookup_str(item, field).filter(|s| !s.is_empty())
}

/// Last segment after a `:` or `/`
///
/// `arn:aws:ecs:eu-west-1:123456789012:cluster/prod` → `prod`,
/// a queue URL → the queue name, a bare id → itself.
pub fn name_from_arn(arn: &str) -> &str {
    let trimmed = arn.trim_end_matches('/');
    trimmed
        .rsplit(|c: char| c == ':' || c == '/')
        .next()
        .unwrap_or(trimmed)
}
