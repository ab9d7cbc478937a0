//! Cloud provider interaction module
//!
//! This module is the boundary between the engine and the provider SDK.
//!
//! # Module Structure
//!
//! - [`client`] - `CloudApi` / `Connector` traits the engine depends on
//! - [`error`] - Provider error classification
//! - [`auth`] - Session vending seam and caching
//! - [`http`] - HTTP bridge implementation of the client traits
//! - `mock` - Scripted provider used by tests (`test-util` feature)
//!
//! # Example
//!
//! ```ignore
//! use tagsweep::cloud::{BridgeConnector, BridgeHttp, EnvCredentials, HttpSettings};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let http = BridgeHttp::new("http://localhost:9000", &HttpSettings::default())?;
//!     let connector = BridgeConnector::new(http, std::sync::Arc::new(EnvCredentials));
//!     let kms = connector.connect("123456789012", "eu-west-1", "kms").await?;
//!     let keys = kms.call("ListKeys", &serde_json::json!({})).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use auth::{CachedCredentials, CredentialSource, EnvCredentials, Session};
pub use client::{CloudApi, Connector};
pub use error::ApiError;
pub use http::{BridgeConnector, BridgeHttp, HttpSettings};
