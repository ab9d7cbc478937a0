//! HTTP bridge to the provider SDK
//!
//! Operations are posted as JSON to `{endpoint}/v1/{service}/{operation}`.
//! A non-2xx response carries `{"code": ..., "message": ...}`, which is
//! classified into an [`ApiError`].

use super::auth::CredentialSource;
use super::client::{CloudApi, Connector};
use super::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Base delay between retries, doubled on every attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub const ACCOUNT_HEADER: &str = "x-tagsweep-account";
pub const REGION_HEADER: &str = "x-tagsweep-region";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Timeouts and retry budget for bridge calls
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Shared HTTP plumbing for bridge calls
#[derive(Clone)]
pub struct BridgeHttp {
    client: Client,
    endpoint: Url,
    max_retries: u32,
}

impl BridgeHttp {
    pub fn new(endpoint: &str, settings: &HttpSettings) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .user_agent(concat!("tagsweep/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid bridge endpoint: {}", endpoint))?;

        Ok(Self {
            client,
            endpoint,
            max_retries: settings.max_retries,
        })
    }

    /// Build the operation URL
    pub fn operation_url(&self, service: &str, operation: &str) -> Result<Url, ApiError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let url = format!(
            "{}/v1/{}/{}",
            base,
            urlencoding::encode(service),
            urlencoding::encode(operation)
        );
        Url::parse(&url).map_err(|e| ApiError::Network(format!("Invalid operation URL: {}", e)))
    }

    /// POST an operation, retrying throttling, server and transport errors
    pub async fn invoke(
        &self,
        token: &str,
        account_id: &str,
        region: &str,
        service: &str,
        operation: &str,
        params: &Value,
    ) -> Result<Value, ApiError> {
        let url = self.operation_url(service, operation)?;
        let mut attempt = 0;

        loop {
            match self.post_once(&url, token, account_id, region, params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    tracing::debug!(
                        "{}:{} failed ({}), retry {} in {:?}",
                        service,
                        operation,
                        e,
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(
        &self,
        url: &Url,
        token: &str,
        account_id: &str,
        region: &str,
        params: &Value,
    ) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .header(ACCOUNT_HEADER, account_id)
            .header(REGION_HEADER, region)
            .json(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(error_from_response(status, &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("Failed to parse response JSON: {}", e)))
    }
}

/// Failures reaching the bridge itself are network errors, never "unavailable"
fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(err.to_string())
    } else if err.is_connect() {
        ApiError::Network(format!("bridge unreachable: {}", err))
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Turn a non-2xx response into an error
pub fn error_from_response(status: StatusCode, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    if let Some(code) = field("code") {
        let message = field("message").unwrap_or_default();
        return ApiError::from_code(&code, message);
    }

    let message = sanitize_for_log(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::from_code("AccessDenied", message)
        }
        StatusCode::NOT_FOUND => ApiError::from_code("NotFound", message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::from_code("Throttling", message),
        StatusCode::BAD_REQUEST => ApiError::from_code("ValidationException", message),
        s if s.is_server_error() => ApiError::Network(format!("HTTP {}: {}", s, message)),
        s => ApiError::from_code(&format!("HTTP{}", s.as_u16()), message),
    }
}

/// Client handle bound to one account, region and service
pub struct BridgeClient {
    http: BridgeHttp,
    token: String,
    account_id: String,
    region: String,
    service: String,
}

#[async_trait]
impl CloudApi for BridgeClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn call(&self, operation: &str, params: &Value) -> Result<Value, ApiError> {
        self.http
            .invoke(
                &self.token,
                &self.account_id,
                &self.region,
                &self.service,
                operation,
                params,
            )
            .await
    }
}

/// Connector that builds [`BridgeClient`] handles
pub struct BridgeConnector {
    http: BridgeHttp,
    credentials: Arc<dyn CredentialSource>,
}

impl BridgeConnector {
    pub fn new(http: BridgeHttp, credentials: Arc<dyn CredentialSource>) -> Self {
        Self { http, credentials }
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn connect(
        &self,
        account_id: &str,
        region: &str,
        service: &str,
    ) -> Result<Arc<dyn CloudApi>, ApiError> {
        let session = self
            .credentials
            .session(account_id)
            .await
            .map_err(|e| ApiError::from_code("AccessDenied", format!("{:#}", e)))?;

        Ok(Arc::new(BridgeClient {
            http: self.http.clone(),
            token: session.token,
            account_id: account_id.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }))
    }
}
