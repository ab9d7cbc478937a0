//! Engine error types

use crate::cloud::ApiError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No adapter registered for the pair
    #[error("Unsupported service type: {service}:{resource_type}")]
    UnsupportedServiceType {
        service: String,
        resource_type: String,
    },

    /// Malformed catalog data or a payload that does not fit the declared shape
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// An item lacks a declared field
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl EngineError {
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    pub fn unsupported(service: &str, resource_type: &str) -> Self {
        Self::UnsupportedServiceType {
            service: service.to_string(),
            resource_type: resource_type.to_string(),
        }
    }
}
