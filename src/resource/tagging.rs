//! Tagging Engine
//!
//! Applies or removes a declared tag set on discovered resources using the
//! operations and argument spellings the catalog names for each adapter.
//! Resources are processed one after another; a failure on one resource is
//! recorded and the batch continues.

use super::model::{Resource, Status, TagAction, TagOutcome};
use super::registry::{AdapterSpec, Catalog, ReplaceSetSpec, TaggingSpec};
use super::tags::{self, TagSet, Tags};
use super::value::{lookup, set_path};
use crate::cloud::{ApiError, CloudApi, Connector};
use crate::error::{EngineError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Writes tags to resources
#[derive(Clone)]
pub struct Tagger {
    catalog: Arc<Catalog>,
    connector: Arc<dyn Connector>,
}

/// Client handles reused within one batch
type ClientCache = HashMap<(String, String, String), Arc<dyn CloudApi>>;

impl Tagger {
    pub fn new(catalog: Arc<Catalog>, connector: Arc<dyn Connector>) -> Self {
        Self { catalog, connector }
    }

    /// Apply or remove `declared` on every resource, in order
    pub async fn tag(
        &self,
        action: TagAction,
        resources: &[Resource],
        declared: &TagSet,
    ) -> Vec<TagOutcome> {
        let mut clients = ClientCache::new();
        let mut outcomes = Vec::with_capacity(resources.len());

        for resource in resources {
            let result = self
                .tag_one(&mut clients, action, resource, declared)
                .await
                .map_err(|e| e.to_string());

            match &result {
                Ok(()) => debug!(
                    "{} {} on {} ({})",
                    action.as_str(),
                    declared.len(),
                    resource.resource_id,
                    resource.label()
                ),
                Err(e) => warn!(
                    "Failed to {} tags on {} ({}): {}",
                    action.as_str(),
                    resource.resource_id,
                    resource.label(),
                    e
                ),
            }

            outcomes.push(TagOutcome::for_resource(resource, result));
        }

        let failed = outcomes.iter().filter(|o| o.status == Status::Error).count();
        info!(
            "Tag {}: {} resources, {} failed",
            action.as_str(),
            outcomes.len(),
            failed
        );

        outcomes
    }

    async fn tag_one(
        &self,
        clients: &mut ClientCache,
        action: TagAction,
        resource: &Resource,
        declared: &TagSet,
    ) -> Result<()> {
        let spec = self
            .catalog
            .get(&resource.service, &resource.resource_type)?;
        let client = self.client_for(clients, spec, resource).await?;

        match (&spec.tagging, action) {
            (TaggingSpec::ApplyRemove { apply, .. }, TagAction::Apply)
            | (TaggingSpec::ApplyOnly { apply }, TagAction::Apply) => {
                let mut request = apply.target.request(&apply.params, resource);
                request.insert(
                    apply.tags_param.clone(),
                    tags::encode(&declared.to_tags(), apply.shape),
                );
                client.call(&apply.operation, &Value::Object(request)).await?;
            }
            (TaggingSpec::ApplyRemove { remove, .. }, TagAction::Remove) => {
                let mut request = remove.target.request(&remove.params, resource);
                request.insert(
                    remove.keys_param.clone(),
                    tags::encode_keys(declared.keys(), remove.key_form),
                );
                client.call(&remove.operation, &Value::Object(request)).await?;
            }
            (TaggingSpec::ApplyOnly { apply }, TagAction::Remove) => {
                // No remove operation: clear the values instead
                let mut request = apply.target.request(&apply.params, resource);
                request.insert(
                    apply.tags_param.clone(),
                    tags::encode(&declared.to_empty_values(), apply.shape),
                );
                client.call(&apply.operation, &Value::Object(request)).await?;
            }
            (TaggingSpec::ReplaceSet(replace), action) => {
                replace_tag_set(client.as_ref(), replace, action, resource, declared).await?;
            }
        }

        Ok(())
    }

    async fn client_for(
        &self,
        clients: &mut ClientCache,
        spec: &AdapterSpec,
        resource: &Resource,
    ) -> std::result::Result<Arc<dyn CloudApi>, ApiError> {
        let key = (
            resource.account_id.clone(),
            spec.call_region(&resource.region).to_string(),
            spec.client_service().to_string(),
        );
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = self.connector.connect(&key.0, &key.1, &key.2).await?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Read-modify-write of a whole tag set
///
/// Apply writes the union (declared values win), remove writes the
/// difference. An empty result deletes the tag set instead of writing it.
async fn replace_tag_set(
    client: &dyn CloudApi,
    spec: &ReplaceSetSpec,
    action: TagAction,
    resource: &Resource,
    declared: &TagSet,
) -> Result<()> {
    let target = spec.target.request(&Value::Null, resource);

    let current = match client
        .call(&spec.get_operation, &Value::Object(target.clone()))
        .await
    {
        Ok(response) => {
            let payload = lookup(&response, &spec.result_key)
                .cloned()
                .unwrap_or(Value::Null);
            tags::decode(&payload, spec.shape)?
        }
        Err(e) if e.is_not_found() => Tags::new(),
        Err(e) => return Err(EngineError::Api(e)),
    };

    let merged = merge_tag_set(current, action, declared);

    if merged.is_empty() {
        client
            .call(&spec.delete_operation, &Value::Object(target))
            .await?;
        return Ok(());
    }

    let mut request = Value::Object(target);
    set_path(&mut request, &spec.tags_path, tags::encode(&merged, spec.shape));
    client.call(&spec.put_operation, &request).await?;
    Ok(())
}

/// Union (apply) or difference (remove) of a current tag set with declared tags
pub fn merge_tag_set(mut current: Tags, action: TagAction, declared: &TagSet) -> Tags {
    match action {
        TagAction::Apply => {
            for (key, value) in declared.iter() {
                current.insert(key.to_string(), value.to_string());
            }
        }
        TagAction::Remove => {
            for key in declared.keys() {
                current.remove(key);
            }
        }
    }
    current
}
