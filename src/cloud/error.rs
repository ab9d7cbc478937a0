//! Provider error classification

use thiserror::Error;

/// Error codes reported when the caller lacks permission
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnauthorizedException",
    "AuthorizationError",
    "AuthFailure",
    "Forbidden",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "ExpiredToken",
    "ExpiredTokenException",
];

/// Error codes reported when a service has no endpoint (or no subscription) in a region
const UNAVAILABLE_CODES: &[&str] = &[
    "EndpointConnectionError",
    "UnknownEndpoint",
    "UnsupportedRegion",
    "SubscriptionRequiredException",
    "OptInRequired",
    "NotSubscribed",
];

const THROTTLED_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "NoSuchTagSet",
    "NoSuchTagSetError",
    "NoSuchEntity",
    "ResourceNotFoundException",
];

const INVALID_REQUEST_CODES: &[&str] = &[
    "ValidationException",
    "ValidationError",
    "InvalidParameter",
    "InvalidParameterValue",
    "InvalidParameterException",
    "InvalidParameterCombination",
    "InvalidPaginationToken",
    "InvalidNextToken",
];

/// Error returned by a provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{code}: {message}")]
    AccessDenied { code: String, message: String },

    #[error("{code}: {message}")]
    Unavailable { code: String, message: String },

    #[error("{code}: {message}")]
    Throttled { code: String, message: String },

    #[error("{code}: {message}")]
    NotFound { code: String, message: String },

    #[error("{code}: {message}")]
    InvalidRequest { code: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Network: {0}")]
    Network(String),

    #[error("Decode: {0}")]
    Decode(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },
}

impl ApiError {
    /// Classify a provider error code into an error kind
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let code_owned = code.to_string();
        let message = message.into();

        if ACCESS_DENIED_CODES.contains(&code) {
            Self::AccessDenied {
                code: code_owned,
                message,
            }
        } else if UNAVAILABLE_CODES.contains(&code) {
            Self::Unavailable {
                code: code_owned,
                message,
            }
        } else if THROTTLED_CODES.contains(&code) {
            Self::Throttled {
                code: code_owned,
                message,
            }
        } else if NOT_FOUND_CODES.contains(&code) || code.ends_with("NotFound") {
            Self::NotFound {
                code: code_owned,
                message,
            }
        } else if INVALID_REQUEST_CODES.contains(&code) {
            Self::InvalidRequest {
                code: code_owned,
                message,
            }
        } else {
            Self::Service {
                code: code_owned,
                message,
            }
        }
    }

    /// Provider error code, if the error came from the provider
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::AccessDenied { code, .. }
            | Self::Unavailable { code, .. }
            | Self::Throttled { code, .. }
            | Self::NotFound { code, .. }
            | Self::InvalidRequest { code, .. }
            | Self::Service { code, .. } => Some(code),
            Self::Timeout(_) | Self::Network(_) | Self::Decode(_) => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Service not reachable or not offered in the region
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// Whether the transport layer should retry the call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }
}
