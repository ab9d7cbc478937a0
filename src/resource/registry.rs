//! Resource Catalog - declarative adapter registry
//!
//! Every supported `(service, resource_type)` pair is described by an
//! [`AdapterSpec`] loaded from the JSON files embedded under
//! `src/resources/`. The engine has no per-service code: listing verbs,
//! identifier fields, ARN templates, tag shapes, tag operation argument
//! names, filters and regional restrictions all live in the catalog.

use super::arn;
use super::model::{Resource, GLOBAL_REGION};
use super::tags::{KeyForm, TagWireShape};
use super::value::{lookup, lookup_str, substitute_params};
use crate::error::{EngineError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded catalog files (compiled into the binary)
const RESOURCE_FILES: &[(&str, &str)] = &[
    ("compute.json", include_str!("../resources/compute.json")),
    ("database.json", include_str!("../resources/database.json")),
    ("storage.json", include_str!("../resources/storage.json")),
    ("integration.json", include_str!("../resources/integration.json")),
    ("network.json", include_str!("../resources/network.json")),
    ("security.json", include_str!("../resources/security.json")),
    ("analytics.json", include_str!("../resources/analytics.json")),
];

/// Region used for global services when the catalog names none
pub const DEFAULT_GLOBAL_REGION: &str = "us-east-1";

/// Token-based pagination of an operation
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Pagination {
    /// Request parameter carrying the continuation token
    pub input_token: String,
    /// Response path holding the next token
    pub output_token: String,
    /// Request parameter carrying the page size
    #[serde(default)]
    pub limit_key: Option<String>,
    #[serde(default)]
    pub page_size: Option<u64>,
}

/// A listing operation
#[derive(Debug, Clone, Deserialize)]
pub struct ListSpec {
    pub operation: String,
    /// Static parameters; `{account_id}` and `{region}` are substituted
    #[serde(default)]
    pub params: Value,
    /// Response path of the item list; empty when the response is the list
    #[serde(default)]
    pub result_key: String,
    /// Absent when the operation is not pageable
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Where a resource's ARN comes from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ArnSource {
    /// Render a template
    Template(String),
    /// Read a field the provider returns
    Field(String),
    /// The identifier itself is the ARN
    Id,
}

/// Identity fields of a listed item
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    /// Absent when the item is itself a string (e.g. a queue URL)
    #[serde(default)]
    pub id_field: Option<String>,
    /// Keep only the last path segment of the id (e.g. `/hostedzone/Z1`)
    #[serde(default)]
    pub id_tail: bool,
    #[serde(default)]
    pub name_field: Option<String>,
    #[serde(default)]
    pub date_field: Option<String>,
    pub arn: ArnSource,
}

impl ItemSpec {
    /// Raw identifier of an item
    pub fn raw_id(&self, item: &Value) -> Option<String> {
        match &self.id_field {
            Some(field) => lookup_str(item, field),
            None => item.as_str().map(|s| s.to_string()),
        }
        .filter(|s| !s.is_empty())
    }
}

/// Which field of a record feeds an operation argument
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    #[default]
    Arn,
    Id,
    Name,
}

/// The argument identifying the resource in a call
#[derive(Debug, Clone, Deserialize)]
pub struct TargetArg {
    /// Argument name, e.g. `ResourceArn`, `KeyId`, `QueueUrl`
    pub param: String,
    #[serde(default)]
    pub source: TargetSource,
    /// Wrap the value in a one-element list (`LoadBalancerNames`)
    #[serde(default)]
    pub as_list: bool,
}

impl TargetArg {
    /// Argument value for a resource record
    pub fn value_for(&self, resource: &Resource) -> Value {
        let raw = match self.source {
            TargetSource::Arn => &resource.arn,
            TargetSource::Id => &resource.resource_id,
            TargetSource::Name => &resource.name,
        };
        if self.as_list {
            Value::Array(vec![Value::String(raw.clone())])
        } else {
            Value::String(raw.clone())
        }
    }

    /// Merge the argument into static call parameters
    pub fn request(&self, params: &Value, resource: &Resource) -> Map<String, Value> {
        let mut request = match substitute_params(params, &resource.account_id, &resource.region) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        request.insert(self.param.clone(), self.value_for(resource));
        request
    }
}

/// A secondary describe call merged into metadata
#[derive(Debug, Clone, Deserialize)]
pub struct DetailSpec {
    pub operation: String,
    pub target: TargetArg,
    #[serde(default)]
    pub params: Value,
    /// Response path of the record to merge; empty merges the whole response
    #[serde(default)]
    pub result_key: String,
}

/// A tag-reading call
#[derive(Debug, Clone, Deserialize)]
pub struct TagCall {
    pub operation: String,
    pub target: TargetArg,
    #[serde(default)]
    pub params: Value,
    /// Response path of the tag payload
    pub result_key: String,
    pub shape: TagWireShape,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

fn default_inline_shape() -> TagWireShape {
    TagWireShape::KvListUpper
}

/// How tags are read for an adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum TagAccess {
    /// Tags are a list inside the (possibly detail-enriched) item
    InlineList {
        field: String,
        #[serde(default = "default_inline_shape")]
        shape: TagWireShape,
    },
    /// Tags are a dict inside the item
    InlineDict { field: String },
    ListTagsByArn(TagCall),
    ListTagsById(TagCall),
    DescribeTags(TagCall),
    ListTagsOfResource(TagCall),
    /// Attribute read merged into metadata, then a tag listing
    GetTopicAttributesPlusList { attributes: DetailSpec, list: TagCall },
    ListTagsForDomain(TagCall),
    /// Whole-set bucket tagging; a missing tag set reads as empty
    BucketTagging(TagCall),
}

impl TagAccess {
    pub fn shape(&self) -> TagWireShape {
        match self {
            Self::InlineList { shape, .. } => *shape,
            Self::InlineDict { .. } => TagWireShape::Dict,
            Self::ListTagsByArn(call)
            | Self::ListTagsById(call)
            | Self::DescribeTags(call)
            | Self::ListTagsOfResource(call)
            | Self::GetTopicAttributesPlusList { list: call, .. }
            | Self::ListTagsForDomain(call)
            | Self::BucketTagging(call) => call.shape,
        }
    }
}

/// Apply operation and its argument spelling
#[derive(Debug, Clone, Deserialize)]
pub struct ApplySpec {
    pub operation: String,
    pub target: TargetArg,
    #[serde(default)]
    pub params: Value,
    /// `Tags`, `TagList`, `TagsToUpdate`, `TagsToAdd`, `tags`, ...
    pub tags_param: String,
    pub shape: TagWireShape,
}

/// Remove operation and its argument spelling
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveSpec {
    pub operation: String,
    pub target: TargetArg,
    #[serde(default)]
    pub params: Value,
    /// `TagKeys`, `TagKeyList`, `tagKeys`, `Tags`, ...
    pub keys_param: String,
    #[serde(default)]
    pub key_form: KeyForm,
}

/// Read-modify-write tagging of a whole tag set
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceSetSpec {
    pub get_operation: String,
    pub put_operation: String,
    pub delete_operation: String,
    pub target: TargetArg,
    /// Response path of the current tag set
    pub result_key: String,
    /// Request path of the new tag set, e.g. `Tagging.TagSet`
    pub tags_path: String,
    pub shape: TagWireShape,
}

/// How tags are written for an adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaggingSpec {
    ApplyRemove { apply: ApplySpec, remove: RemoveSpec },
    /// No remove operation: removal applies the keys with empty values
    ApplyOnly { apply: ApplySpec },
    ReplaceSet(ReplaceSetSpec),
}

/// Predicate on a listed item
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemFilter {
    Equals { path: String, value: String },
    NotEquals { path: String, value: String },
    In { path: String, values: Vec<String> },
    NotIn { path: String, values: Vec<String> },
    /// A list field contains the value
    Contains { path: String, value: String },
    NotContains { path: String, value: String },
    SkipPrefix { path: String, prefixes: Vec<String> },
}

impl ItemFilter {
    /// Whether the item passes (is kept)
    pub fn keeps(&self, item: &Value) -> bool {
        match self {
            Self::Equals { path, value } => lookup_str(item, path).as_deref() == Some(value),
            Self::NotEquals { path, value } => lookup_str(item, path).as_deref() != Some(value),
            Self::In { path, values } => {
                lookup_str(item, path).is_some_and(|v| values.contains(&v))
            }
            Self::NotIn { path, values } => {
                !lookup_str(item, path).is_some_and(|v| values.contains(&v))
            }
            Self::Contains { path, value } => list_contains(item, path, value),
            Self::NotContains { path, value } => !list_contains(item, path, value),
            Self::SkipPrefix { path, prefixes } => !lookup_str(item, path)
                .is_some_and(|v| prefixes.iter().any(|p| v.starts_with(p))),
        }
    }
}

fn list_contains(item: &Value, path: &str, value: &str) -> bool {
    match lookup(item, path) {
        Some(Value::Array(arr)) => arr.iter().any(|v| v.as_str() == Some(value)),
        Some(Value::String(s)) => s == value,
        _ => false,
    }
}

/// Second enumeration step under each listed item
#[derive(Debug, Clone, Deserialize)]
pub struct NestedSpec {
    pub list: ListSpec,
    /// Argument receiving the parent identifier
    pub parent_param: String,
    /// Parent field to pass; defaults to the parent's identifier
    #[serde(default)]
    pub parent_field: Option<String>,
    #[serde(flatten)]
    pub item: ItemSpec,
}

/// Catalog entry for one `(service, resource_type)`
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterSpec {
    #[serde(skip)]
    pub service: String,
    #[serde(skip)]
    pub resource_type: String,
    /// SDK client to use when it differs from the service key
    #[serde(default)]
    pub client: Option<String>,
    pub list: ListSpec,
    #[serde(flatten)]
    pub item: ItemSpec,
    #[serde(default)]
    pub detail: Option<DetailSpec>,
    #[serde(default)]
    pub filter: Vec<ItemFilter>,
    /// Filters evaluated after detail enrichment
    #[serde(default)]
    pub post_detail_filter: Vec<ItemFilter>,
    #[serde(default)]
    pub nested: Option<NestedSpec>,
    pub tags: TagAccess,
    pub tagging: TaggingSpec,
    /// Regions where the service exists; absent means everywhere
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub global_region: Option<String>,
}

impl AdapterSpec {
    /// `service:type`
    pub fn label(&self) -> String {
        format!("{}:{}", self.service, self.resource_type)
    }

    /// SDK client name
    pub fn client_service(&self) -> &str {
        self.client.as_deref().unwrap_or(&self.service)
    }

    /// Wire shape tags are read in
    pub fn tag_wire_shape(&self) -> TagWireShape {
        self.tags.shape()
    }

    /// Whether the service is offered in a region
    pub fn available_in(&self, region: &str) -> bool {
        if self.global {
            return true;
        }
        match &self.regions {
            Some(allowed) => allowed.iter().any(|r| r == region),
            None => true,
        }
    }

    /// Region to send calls to
    pub fn call_region<'a>(&'a self, region: &'a str) -> &'a str {
        if self.global {
            self.global_region.as_deref().unwrap_or(DEFAULT_GLOBAL_REGION)
        } else {
            region
        }
    }

    /// Region to report on records
    pub fn reported_region<'a>(&self, region: &'a str) -> &'a str {
        if self.global {
            GLOBAL_REGION
        } else {
            region
        }
    }

    /// Identity spec of emitted records (the nested leaf when present)
    pub fn leaf_item(&self) -> &ItemSpec {
        match &self.nested {
            Some(nested) => &nested.item,
            None => &self.item,
        }
    }

    fn validate(&self) -> Result<()> {
        let label = self.label();
        let check_template = |source: &ArnSource, nested: bool| -> Result<()> {
            if let ArnSource::Template(template) = source {
                for name in arn::placeholders(template)? {
                    if !arn::PLACEHOLDERS.contains(&name) {
                        return Err(EngineError::catalog(format!(
                            "{}: unknown placeholder '{{{}}}' in {}",
                            label, name, template
                        )));
                    }
                    if name == "database" && !nested {
                        return Err(EngineError::catalog(format!(
                            "{}: '{{database}}' is only bound for nested listings",
                            label
                        )));
                    }
                }
            }
            Ok(())
        };

        check_template(&self.item.arn, false)?;
        if let Some(nested) = &self.nested {
            check_template(&nested.item.arn, true)?;
        }

        if self.global && self.regions.is_some() {
            return Err(EngineError::catalog(format!(
                "{}: global adapters cannot carry a regional allowlist",
                label
            )));
        }

        Ok(())
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: BTreeMap<String, BTreeMap<String, AdapterSpec>>,
}

/// Process-wide immutable adapter registry
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    adapters: BTreeMap<String, BTreeMap<String, AdapterSpec>>,
}

static BUILTIN: OnceLock<std::result::Result<Catalog, EngineError>> = OnceLock::new();

impl Catalog {
    /// The embedded catalog (parsed on first access)
    pub fn builtin() -> Result<&'static Catalog> {
        BUILTIN
            .get_or_init(|| Catalog::from_sources(RESOURCE_FILES))
            .as_ref()
            .map_err(|e| e.clone())
    }

    /// Parse and merge catalog sources, rejecting duplicate pairs
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self> {
        let mut catalog = Catalog::default();

        for (file_name, content) in sources {
            let file: CatalogFile = serde_json::from_str(content).map_err(|e| {
                EngineError::catalog(format!("Failed to parse {}: {}", file_name, e))
            })?;

            for (service, types) in file.services {
                for (resource_type, mut spec) in types {
                    spec.service = service.clone();
                    spec.resource_type = resource_type.clone();
                    spec.validate()?;

                    let entry = catalog.adapters.entry(service.clone()).or_default();
                    if entry.insert(resource_type.clone(), spec).is_some() {
                        return Err(EngineError::catalog(format!(
                            "Duplicate adapter {}:{} in {}",
                            service, resource_type, file_name
                        )));
                    }
                }
            }
        }

        Ok(catalog)
    }

    /// Parse a single JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_sources(&[("inline", content)])
    }

    /// Look up an adapter
    pub fn get(&self, service: &str, resource_type: &str) -> Result<&AdapterSpec> {
        self.adapters
            .get(service)
            .and_then(|types| types.get(resource_type))
            .ok_or_else(|| EngineError::unsupported(service, resource_type))
    }

    /// All adapters, sorted by service then type
    pub fn adapters(&self) -> impl Iterator<Item = &AdapterSpec> {
        self.adapters.values().flat_map(|types| types.values())
    }

    /// All `(service, type)` pairs
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.adapters()
            .map(|a| (a.service.as_str(), a.resource_type.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() > 40, "Catalog should cover the service catalog");
    }

    #[test]
    fn test_lookup_and_unsupported() {
        let catalog = Catalog::builtin().unwrap();
        let kms = catalog.get("kms", "Key").unwrap();
        assert_eq!(kms.tag_wire_shape(), TagWireShape::KvListTagkey);
        assert!(matches!(
            catalog.get("kms", "Nope"),
            Err(EngineError::UnsupportedServiceType { .. })
        ));
    }

    #[test]
    fn test_global_adapters_are_pinned() {
        let catalog = Catalog::builtin().unwrap();
        let s3 = catalog.get("s3", "Bucket").unwrap();
        assert!(s3.global);
        assert_eq!(s3.call_region("eu-west-3"), "us-east-1");
        assert_eq!(s3.reported_region("eu-west-3"), "global");

        let domains = catalog.get("route53domains", "Domain").unwrap();
        assert!(domains.global);
        assert!(matches!(domains.tagging, TaggingSpec::ApplyOnly { .. }));
    }

    #[test]
    fn test_regional_allowlist() {
        let catalog = Catalog::builtin().unwrap();
        let imaging = catalog.get("medical-imaging", "Datastore").unwrap();
        assert!(imaging.available_in("us-east-1"));
        assert!(!imaging.available_in("eu-south-3"));
    }

    #[test]
    fn test_rest_api_filters_are_complementary() {
        let catalog = Catalog::builtin().unwrap();
        let public = catalog.get("apigateway", "RestApi").unwrap();
        let private = catalog.get("apigateway", "RestApiPrivate").unwrap();
        let item = json!({"id": "a1", "endpointConfiguration": {"types": ["PRIVATE"]}});

        let keeps = |spec: &AdapterSpec| spec.filter.iter().all(|f| f.keeps(&item));
        assert!(!keeps(public));
        assert!(keeps(private));
    }

    #[test]
    fn test_item_filters() {
        let item = json!({"Engine": "docdb", "Id": "rslvr-autodefined-rr-1", "types": ["EDGE"]});
        let eq = ItemFilter::Equals { path: "Engine".into(), value: "docdb".into() };
        let not_in = ItemFilter::NotIn { path: "Engine".into(), values: vec!["docdb".into()] };
        let skip = ItemFilter::SkipPrefix {
            path: "Id".into(),
            prefixes: vec!["rslvr-autodefined".into()],
        };
        let contains = ItemFilter::Contains { path: "types".into(), value: "EDGE".into() };
        let missing = ItemFilter::NotEquals { path: "Nope".into(), value: "x".into() };

        assert!(eq.keeps(&item));
        assert!(!not_in.keeps(&item));
        assert!(!skip.keeps(&item));
        assert!(contains.keeps(&item));
        assert!(missing.keeps(&item));
    }

    #[test]
    fn test_rejects_unknown_placeholder() {
        let doc = json!({
            "services": {"svc": {"Thing": {
                "list": {"operation": "ListThings", "result_key": "Things"},
                "id_field": "Id",
                "arn": {"template": "arn:aws:svc:{region}:{bogus}"},
                "tags": {"access": "inline_dict", "field": "Tags"},
                "tagging": {"mode": "apply_only", "apply": {
                    "operation": "Tag", "target": {"param": "Arn"},
                    "tags_param": "Tags", "shape": "dict"
                }}
            }}}
        });
        let err = Catalog::from_json_str(&doc.to_string()).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_every_builtin_adapter_has_consistent_shapes() {
        let catalog = Catalog::builtin().unwrap();
        for adapter in catalog.adapters() {
            if let TaggingSpec::ReplaceSet(spec) = &adapter.tagging {
                assert!(!spec.tags_path.is_empty(), "{}", adapter.label());
            }
            if adapter.global {
                assert!(adapter.regions.is_none(), "{}", adapter.label());
            }
        }
    }
}
