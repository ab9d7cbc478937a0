//! Scripted provider for tests
//!
//! Responses are registered per `(service, operation)` as closures over the
//! call parameters. Every call is recorded so tests can assert on what the
//! engine sent.

use super::client::{CloudApi, Connector};
use super::error::ApiError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&Value) -> Result<Value, ApiError> + Send + Sync>;

/// A call the engine made
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub operation: String,
    pub params: Value,
}

#[derive(Default)]
struct MockState {
    handlers: HashMap<(String, String), Handler>,
    calls: Vec<RecordedCall>,
}

/// In-memory provider with scripted responses
#[derive(Clone, Default)]
pub struct MockCloud {
    state: Arc<Mutex<MockState>>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an operation
    pub fn on<F>(&self, service: &str, operation: &str, handler: F) -> &Self
    where
        F: Fn(&Value) -> Result<Value, ApiError> + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state
            .handlers
            .insert((service.to_string(), operation.to_string()), Arc::new(handler));
        drop(state);
        self
    }

    /// Register a fixed response for an operation
    pub fn respond(&self, service: &str, operation: &str, response: Value) -> &Self {
        self.on(service, operation, move |_| Ok(response.clone()))
    }

    /// Register a fixed error for an operation
    pub fn fail(&self, service: &str, operation: &str, error: ApiError) -> &Self {
        self.on(service, operation, move |_| Err(error.clone()))
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls made to one operation
    pub fn calls_to(&self, service: &str, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.service == service && c.operation == operation)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A handler that panicked poisons nothing we rely on
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
        operation: &str,
        params: &Value,
    ) -> Result<Value, ApiError> {
        let handler = {
            let mut state = self.lock();
            state.calls.push(RecordedCall {
                account_id: account_id.to_string(),
                region: region.to_string(),
                service: service.to_string(),
                operation: operation.to_string(),
                params: params.clone(),
            });
            state
                .handlers
                .get(&(service.to_string(), operation.to_string()))
                .cloned()
        };

        match handler {
            Some(handler) => handler(params),
            None => Err(ApiError::from_code(
                "UnknownOperationException",
                format!("No mock registered for {}:{}", service, operation),
            )),
        }
    }
}

struct MockClient {
    cloud: MockCloud,
    account_id: String,
    region: String,
    service: String,
}

#[async_trait]
impl CloudApi for MockClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn call(&self, operation: &str, params: &Value) -> Result<Value, ApiError> {
        self.cloud
            .dispatch(&self.account_id, &self.region, &self.service, operation, params)
    }
}

#[async_trait]
impl Connector for MockCloud {
    async fn connect(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
    ) -> Result<Arc<dyn CloudApi>, ApiError> {
        Ok(Arc::new(MockClient {
            cloud: self.clone(),
            account_id: account_id.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }))
    }
}
