//! Resource abstraction layer
//!
//! Discovery and tagging are data driven. Adapter definitions are loaded from
//! JSON files at compile time, so supporting a new resource type means adding
//! a catalog entry rather than code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and validates adapter definitions from embedded JSON
//! - [`paginator`] - Streams response pages for pageable and plain operations
//! - [`discovery`] - Lists, enriches and normalizes resources
//! - [`tagging`] - Applies and removes declared tags
//! - [`tags`] / [`arn`] - Tag wire-shape codec and ARN templates
//!
//! # Resource Definitions
//!
//! Adapters are defined in JSON files under `src/resources/`:
//! - `compute.json` - instances, volumes, functions, container clusters, load balancers
//! - `database.json` - relational, key-value, warehouse and catalog databases
//! - `storage.json` - buckets, file systems, backup vaults, registries
//! - `integration.json` - queues, topics, workflows, APIs, log groups
//! - `network.json` - DNS zones, domains, resolver rules
//! - `security.json` - keys, secrets, certificates, identities
//! - `analytics.json` - search domains, notebooks, streaming clusters, jobs
//!
//! # Example
//!
//! ```ignore
//! use tagsweep::resource::{Catalog, Discoverer};
//!
//! async fn list_keys(discoverer: &Discoverer) {
//!     let found = discoverer.discover("123456789012", "eu-west-1", "kms", "Key").await;
//!     println!("{} keys", found.resources.len());
//! }
//! ```

pub mod arn;
pub mod discovery;
pub mod model;
pub mod paginator;
pub mod registry;
pub mod tagging;
pub mod tags;
pub mod value;

pub use discovery::{normalize_date, read_tags, Discoverer};
pub use model::{
    Discovery, OutcomePayload, Resource, RunOutcome, Status, TagAction, TagOutcome, GLOBAL_REGION,
};
pub use registry::{AdapterSpec, Catalog};
pub use tagging::Tagger;
pub use tags::{parse_declared_tags, TagSet, TagWireShape, Tags};
