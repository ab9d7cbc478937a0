//! Discovery Engine
//!
//! One generic listing pipeline driven entirely by the catalog: list through
//! the pagination driver, filter, derive identity, enrich, read tags and
//! normalize each item into a [`Resource`].

use super::arn::{self, ArnVars};
use super::model::{Discovery, Resource};
use super::paginator::{collect_items, paginate};
use super::registry::{AdapterSpec, ArnSource, Catalog, DetailSpec, ItemSpec, TagAccess, TagCall};
use super::tags::{self, Tags, TagWireShape};
use super::value::{lookup, lookup_str, merge_into, substitute_params};
use crate::cloud::{ApiError, CloudApi, Connector};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Epoch values above this are milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// Discovers resources for `(account, region, service, type)` work items
#[derive(Clone)]
pub struct Discoverer {
    catalog: Arc<Catalog>,
    connector: Arc<dyn Connector>,
}

/// Fixed context of one discovery
struct Scope<'a> {
    spec: &'a AdapterSpec,
    client: &'a dyn CloudApi,
    account_id: &'a str,
    /// Region reported on records
    region: &'a str,
    /// Region calls are sent to
    call_region: &'a str,
}

impl Discoverer {
    pub fn new(catalog: Arc<Catalog>, connector: Arc<dyn Connector>) -> Self {
        Self { catalog, connector }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Discover one `(account, region, service, type)`
    ///
    /// Never fails: errors become a `Discovery` with status `error` and no
    /// resources.
    pub async fn discover(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
        resource_type: &str,
    ) -> Discovery {
        let label = format!("{}:{}", service, resource_type);
        match self
            .try_discover(account_id, region, service, resource_type)
            .await
        {
            Ok(resources) => {
                info!(
                    "Discovered {} {} resources in {}/{}",
                    resources.len(),
                    label,
                    account_id,
                    region
                );
                Discovery::success(label, resources)
            }
            Err(e) => {
                error!("Discovery of {} in {}/{} failed: {}", label, account_id, region, e);
                Discovery::failure(label, e.to_string())
            }
        }
    }

    async fn try_discover(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
        resource_type: &str,
    ) -> Result<Vec<Resource>> {
        let spec = self.catalog.get(service, resource_type)?;

        if !spec.available_in(region) {
            debug!("{} is not offered in {}, skipping", spec.label(), region);
            return Ok(Vec::new());
        }

        let call_region = spec.call_region(region);
        let client = match self
            .connector
            .connect(account_id, call_region, spec.client_service())
            .await
        {
            Ok(client) => client,
            Err(e) if e.is_unavailable() => {
                warn!("{} unavailable in {}: {}", spec.label(), call_region, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let scope = Scope {
            spec,
            client: client.as_ref(),
            account_id,
            region: spec.reported_region(region),
            call_region,
        };

        let params = substitute_params(&spec.list.params, account_id, call_region);
        let items = match collect_items(
            scope.client,
            &spec.list.operation,
            &params,
            spec.list.pagination.as_ref(),
            &spec.list.result_key,
        )
        .await
        {
            Ok(items) => items,
            Err(e) if e.is_unavailable() => {
                warn!("{} unavailable in {}: {}", spec.label(), call_region, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut resources = Vec::new();
        let mut seen = HashSet::new();

        for item in items {
            if !spec.filter.iter().all(|f| f.keeps(&item)) {
                continue;
            }

            let built = match &spec.nested {
                Some(_) => self.expand_nested(&scope, &item).await.map(|leaves| {
                    leaves
                        .into_iter()
                        .map(|(parent, leaf)| (leaf, Some(parent)))
                        .collect::<Vec<_>>()
                }),
                None => Ok(vec![(item, None)]),
            };

            let leaves = match built {
                Ok(leaves) => leaves,
                Err(e) => {
                    warn!("{}: nested listing failed: {}", spec.label(), e);
                    continue;
                }
            };

            let leaf_spec = spec.leaf_item();
            for (leaf, parent) in leaves {
                match self
                    .build_resource(&scope, leaf_spec, leaf, parent.as_deref())
                    .await
                {
                    Ok(Some(resource)) => {
                        if seen.insert(resource.resource_id.clone()) {
                            resources.push(resource);
                        } else {
                            debug!(
                                "{}: duplicate resource id {} dropped",
                                spec.label(),
                                resource.resource_id
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{}: skipping item: {}", spec.label(), e),
                }
            }
        }

        Ok(resources)
    }

    /// List the leaves under one parent item
    async fn expand_nested(
        &self,
        scope: &Scope<'_>,
        parent: &Value,
    ) -> std::result::Result<Vec<(String, Value)>, ApiError> {
        let Some(nested) = &scope.spec.nested else {
            return Ok(Vec::new());
        };

        let parent_id = match &nested.parent_field {
            Some(field) => lookup_str(parent, field),
            None => scope.spec.item.raw_id(parent),
        };
        let Some(parent_id) = parent_id else {
            warn!("{}: parent item without identifier", scope.spec.label());
            return Ok(Vec::new());
        };

        let mut params = match substitute_params(&nested.list.params, scope.account_id, scope.call_region) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert(nested.parent_param.clone(), Value::String(parent_id.clone()));

        let leaves = collect_items(
            scope.client,
            &nested.list.operation,
            &Value::Object(params),
            nested.list.pagination.as_ref(),
            &nested.list.result_key,
        )
        .await?;

        Ok(leaves
            .into_iter()
            .map(|leaf| (parent_id.clone(), leaf))
            .collect())
    }

    /// Turn one listed item into a record
    ///
    /// `Ok(None)` means the item was filtered out after enrichment.
    async fn build_resource(
        &self,
        scope: &Scope<'_>,
        item_spec: &ItemSpec,
        item: Value,
        parent: Option<&str>,
    ) -> Result<Option<Resource>> {
        let spec = scope.spec;

        let raw_id = item_spec.raw_id(&item).ok_or_else(|| {
            EngineError::InvalidItem(format!(
                "missing identifier '{}'",
                item_spec.id_field.as_deref().unwrap_or("<item>")
            ))
        })?;

        let leaf_id = if item_spec.id_tail || item_spec.arn == ArnSource::Id {
            arn::name_from_arn(&raw_id).to_string()
        } else {
            raw_id.clone()
        };

        let name = item_spec
            .name_field
            .as_deref()
            .and_then(|field| lookup_str(&item, field));
        let base_name = name
            .clone()
            .unwrap_or_else(|| arn::name_from_arn(&raw_id).to_string());

        let arn = match &item_spec.arn {
            ArnSource::Template(template) => {
                let mut vars =
                    ArnVars::new(scope.call_region, scope.account_id, &leaf_id).with_name(&base_name);
                if let Some(database) = parent {
                    vars = vars.with_database(database);
                }
                arn::build(template, &vars)?
            }
            ArnSource::Field(field) => arn::passthrough(&item, field).ok_or_else(|| {
                EngineError::InvalidItem(format!("{} has no ARN field '{}'", raw_id, field))
            })?,
            ArnSource::Id => raw_id.clone(),
        };

        let resource_id = match parent {
            Some(parent) => format!("{}/{}", parent, leaf_id),
            None => leaf_id,
        };

        let mut record = match item {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut resource = Resource {
            account_id: scope.account_id.to_string(),
            region: scope.region.to_string(),
            service: spec.service.clone(),
            resource_type: spec.resource_type.clone(),
            resource_id,
            arn,
            name: base_name,
            creation_date: String::new(),
            tags: Tags::new(),
            tags_number: 0,
            metadata: Map::new(),
        };

        if let Some(detail) = &spec.detail {
            match call_detail(scope.client, detail, &resource).await {
                Ok(extra) => merge_into(&mut record, &extra),
                Err(e) => warn!("{} {}: {} failed: {}", spec.label(), resource.resource_id, detail.operation, e),
            }
        }

        let enriched = Value::Object(record);
        if !spec.post_detail_filter.iter().all(|f| f.keeps(&enriched)) {
            return Ok(None);
        }

        if let Some(field) = &item_spec.date_field {
            let value = lookup(&enriched, field).ok_or_else(|| {
                EngineError::InvalidItem(format!(
                    "{} has no date field '{}'",
                    resource.resource_id, field
                ))
            })?;
            resource.creation_date = normalize_date(value);
        }

        if let Value::Object(record) = enriched {
            resource.metadata = record;
        }

        match read_tags(scope.client, &spec.tags, &mut resource).await {
            Ok(tags) => resource.set_tags(tags),
            Err(EngineError::Api(e)) if e.is_not_found() => {
                debug!("{} {}: no tags ({})", spec.label(), resource.resource_id, e);
            }
            Err(e) => {
                warn!(
                    "{} {}: tag read failed, continuing without tags: {}",
                    spec.label(),
                    resource.resource_id,
                    e
                );
            }
        }

        if name.is_none() {
            if let Some(tag_name) = resource.tags.get("Name").filter(|n| !n.is_empty()) {
                resource.name = tag_name.clone();
            }
        }

        Ok(Some(resource))
    }
}

/// Invoke a detail operation and return the record to merge
async fn call_detail(
    client: &dyn CloudApi,
    detail: &DetailSpec,
    resource: &Resource,
) -> std::result::Result<Value, ApiError> {
    let request = detail.target.request(&detail.params, resource);
    let response = client.call(&detail.operation, &Value::Object(request)).await?;
    Ok(lookup(&response, &detail.result_key)
        .cloned()
        .unwrap_or(Value::Null))
}

/// Read the tags of a resource through the mechanism its adapter names
///
/// Attribute reads that precede a tag listing are merged into the record's
/// metadata.
pub async fn read_tags(
    client: &dyn CloudApi,
    access: &TagAccess,
    resource: &mut Resource,
) -> Result<Tags> {
    match access {
        TagAccess::InlineList { field, shape } => inline_tags(resource, field, *shape),
        TagAccess::InlineDict { field } => inline_tags(resource, field, TagWireShape::Dict),
        TagAccess::ListTagsByArn(call)
        | TagAccess::ListTagsById(call)
        | TagAccess::DescribeTags(call)
        | TagAccess::ListTagsOfResource(call)
        | TagAccess::ListTagsForDomain(call) => fetch_tags(client, call, resource).await,
        TagAccess::GetTopicAttributesPlusList { attributes, list } => {
            match call_detail(client, attributes, resource).await {
                Ok(extra) => merge_into(&mut resource.metadata, &extra),
                Err(e) => warn!(
                    "{}: {} failed: {}",
                    resource.resource_id, attributes.operation, e
                ),
            }
            fetch_tags(client, list, resource).await
        }
        TagAccess::BucketTagging(call) => match fetch_tags(client, call, resource).await {
            Err(EngineError::Api(e)) if e.is_not_found() => Ok(Tags::new()),
            other => other,
        },
    }
}

fn inline_tags(resource: &Resource, field: &str, shape: TagWireShape) -> Result<Tags> {
    let metadata = Value::Object(resource.metadata.clone());
    let payload = lookup(&metadata, field).cloned().unwrap_or(Value::Null);
    tags::decode(&payload, shape)
}

async fn fetch_tags(client: &dyn CloudApi, call: &TagCall, resource: &Resource) -> Result<Tags> {
    let request = Value::Object(call.target.request(&call.params, resource));
    let pages: Vec<Value> = paginate(client, &call.operation, &request, call.pagination.as_ref())
        .try_collect()
        .await?;

    let mut tags = Tags::new();
    for page in pages {
        let payload = lookup(&page, &call.result_key).cloned().unwrap_or(Value::Null);
        tags.extend(tags::decode(&payload, call.shape)?);
    }
    Ok(tags)
}

/// Render a provider timestamp as ISO-8601 (UTC)
///
/// RFC 3339 strings are normalized to UTC, epoch numbers are seconds (or
/// milliseconds when large enough). Anything else passes through.
pub fn normalize_date(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return parsed
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
            }
            if let Ok(parsed) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
                return parsed
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return naive
                    .and_utc()
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
            }
            s.clone()
        }
        Value::Number(n) => match n.as_f64() {
            Some(raw) => {
                let millis = if raw.abs() > EPOCH_MILLIS_THRESHOLD {
                    raw as i64
                } else {
                    (raw * 1000.0) as i64
                };
                DateTime::<Utc>::from_timestamp_millis(millis)
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    .unwrap_or_else(|| n.to_string())
            }
            None => n.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
