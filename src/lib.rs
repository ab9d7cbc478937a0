//! tagsweep
//!
//! Discovers cloud resources across accounts and regions, normalizes them into
//! one record shape and applies or removes declared tags.
//!
//! - [`resource`] - Catalog, discovery and tagging engines
//! - [`dispatch`] - Job expansion and the concurrent worker pool
//! - [`sink`] - Outcome persistence
//! - [`bootstrap`] - One-shot schema setup
//! - [`cloud`] - Provider client seams

pub mod bootstrap;
pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod resource;
pub mod sink;

/// Version injected at compile time via TAGSWEEP_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TAGSWEEP_VERSION") {
    Some(v) => v,
    None => "dev",
};
