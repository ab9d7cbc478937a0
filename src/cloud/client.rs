//! Provider client seams
//!
//! Every provider call goes through a [`CloudApi`] handle that is bound to one
//! account, one region and one service. Handles come from a [`Connector`].

use super::error::ApiError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A regional client handle for one service
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Service this handle talks to
    fn service(&self) -> &str;

    /// Region this handle is bound to
    fn region(&self) -> &str;

    /// Invoke an operation with JSON parameters
    async fn call(&self, operation: &str, params: &Value) -> Result<Value, ApiError>;
}

/// Produces regional client handles
#[async_trait]
pub trait Connector: Send + Sync {
    /// Build a client handle for `service` in `region` of `account_id`
    async fn connect(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
    ) -> Result<Arc<dyn CloudApi>, ApiError>;
}
