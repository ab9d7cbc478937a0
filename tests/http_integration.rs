//! Integration tests for the provider bridge client using wiremock
//!
//! These tests verify the HTTP client behavior against mocked endpoints,
//! ensuring proper handling of various response codes and edge cases.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tagsweep::cloud::http::{ACCOUNT_HEADER, REGION_HEADER};
use tagsweep::cloud::{BridgeConnector, BridgeHttp, CredentialSource, HttpSettings, Session};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT: &str = "123456789012";

struct StaticCredentials;

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn session(&self, account_id: &str) -> anyhow::Result<Session> {
        Ok(Session {
            account_id: account_id.to_string(),
            token: "test-token".to_string(),
            expires_at: None,
        })
    }
}

struct NoCredentials;

#[async_trait]
impl CredentialSource for NoCredentials {
    async fn session(&self, account_id: &str) -> anyhow::Result<Session> {
        anyhow::bail!("role assumption refused for {}", account_id)
    }
}

fn settings() -> HttpSettings {
    HttpSettings {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        max_retries: 2,
    }
}

fn connector(server: &MockServer) -> BridgeConnector {
    let http = BridgeHttp::new(&server.uri(), &settings()).expect("valid endpoint");
    BridgeConnector::new(http, Arc::new(StaticCredentials))
}

/// Test module for bridge client integration tests
mod bridge_client_tests {
    use super::*;
    use tagsweep::cloud::Connector;

    /// Successful call posts params with session and routing headers
    #[tokio::test]
    async fn test_call_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/kms/ListKeys"))
            .and(bearer_token("test-token"))
            .and(header(ACCOUNT_HEADER, ACCOUNT))
            .and(header(REGION_HEADER, "eu-west-1"))
            .and(body_json(json!({"Limit": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Keys": [{"KeyId": "k-1"}, {"KeyId": "k-2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let kms = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "kms")
            .await
            .unwrap();
        assert_eq!(kms.service(), "kms");
        assert_eq!(kms.region(), "eu-west-1");

        let response = assert_ok!(kms.call("ListKeys", &json!({"Limit": 100})).await);
        assert_eq!(response["Keys"].as_array().unwrap().len(), 2);
        assert_eq!(response["Keys"][0]["KeyId"], "k-1");
    }

    /// Error bodies are classified by their code
    #[tokio::test]
    async fn test_403_is_access_denied() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/kms/ListResourceTags"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "AccessDeniedException",
                "message": "User is not authorized to perform kms:ListResourceTags"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let kms = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "kms")
            .await
            .unwrap();
        let err = assert_err!(kms.call("ListResourceTags", &json!({"KeyId": "k-1"})).await);

        assert!(err.is_access_denied());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), Some("AccessDeniedException"));
    }

    /// Not-found without a body falls back to the status code
    #[tokio::test]
    async fn test_404_without_body_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/s3/GetBucketTagging"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let s3 = connector(&server)
            .connect(ACCOUNT, "us-east-1", "s3")
            .await
            .unwrap();
        let err = s3
            .call("GetBucketTagging", &json!({"Bucket": "logs"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    /// Transient server errors are retried
    #[tokio::test]
    async fn test_503_is_retried_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/sqs/ListQueues"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/sqs/ListQueues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"QueueUrls": []})))
            .expect(1)
            .mount(&server)
            .await;

        let sqs = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "sqs")
            .await
            .unwrap();
        let response = sqs.call("ListQueues", &json!({})).await.unwrap();
        assert_eq!(response["QueueUrls"], json!([]));
    }

    /// Throttling stops after the retry budget
    #[tokio::test]
    async fn test_throttling_exhausts_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/ec2/DescribeVolumes"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "RequestLimitExceeded",
                "message": "Request limit exceeded."
            })))
            .expect(3)
            .mount(&server)
            .await;

        let ec2 = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "ec2")
            .await
            .unwrap();
        let err = ec2.call("DescribeVolumes", &json!({})).await.unwrap_err();
        assert!(err.is_retryable());
    }

    /// Empty successful responses decode as null
    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/kms/TagResource"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let kms = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "kms")
            .await
            .unwrap();
        let response = kms
            .call(
                "TagResource",
                &json!({"KeyId": "k-1", "Tags": [{"TagKey": "team", "TagValue": "core"}]}),
            )
            .await
            .unwrap();
        assert!(response.is_null());
    }

    /// Malformed success bodies are decode errors
    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/kms/ListKeys"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let kms = connector(&server)
            .connect(ACCOUNT, "eu-west-1", "kms")
            .await
            .unwrap();
        let err = kms.call("ListKeys", &json!({})).await.unwrap_err();
        assert!(err.to_string().starts_with("Decode:"));
    }

    /// Only a provider-reported endpoint code means the service is unavailable
    #[tokio::test]
    async fn test_reported_endpoint_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/medical-imaging/ListDatastores"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "EndpointConnectionError",
                "message": "Could not connect to the endpoint URL"
            })))
            .mount(&server)
            .await;

        let imaging = connector(&server)
            .connect(ACCOUNT, "eu-south-3", "medical-imaging")
            .await
            .unwrap();
        let err = assert_err!(imaging.call("ListDatastores", &json!({})).await);
        assert!(err.is_unavailable());
    }

    /// A bridge that cannot be reached is a network error
    #[tokio::test]
    async fn test_unreachable_bridge_is_network_error() {
        let settings = HttpSettings {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_retries: 0,
        };
        let http = BridgeHttp::new("http://127.0.0.1:1", &settings).unwrap();
        let connector = BridgeConnector::new(http, Arc::new(StaticCredentials));

        let kms = connector.connect(ACCOUNT, "eu-west-1", "kms").await.unwrap();
        let err = assert_err!(kms.call("ListKeys", &json!({})).await);
        assert!(!err.is_unavailable());
        assert!(err.is_retryable());
        assert!(err.code().is_none());
    }

    /// Credential failures surface as access denied at connect time
    #[tokio::test]
    async fn test_session_failure_is_access_denied() {
        let server = MockServer::start().await;
        let http = BridgeHttp::new(&server.uri(), &settings()).unwrap();
        let connector = BridgeConnector::new(http, Arc::new(NoCredentials));

        let err = match connector.connect(ACCOUNT, "eu-west-1", "kms").await {
            Ok(_) => panic!("connect should fail without a session"),
            Err(e) => e,
        };
        assert!(err.is_access_denied());
        assert!(err.to_string().contains("role assumption refused"));
    }
}

/// Test module for endpoint handling
mod endpoint_tests {
    use super::*;

    #[test]
    fn test_operation_url_joins_path() {
        let http = BridgeHttp::new("http://bridge.local:9000/", &HttpSettings::default()).unwrap();
        let url = http.operation_url("route53domains", "ListDomains").unwrap();
        assert_eq!(url.as_str(), "http://bridge.local:9000/v1/route53domains/ListDomains");
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(BridgeHttp::new("not a url", &HttpSettings::default()).is_err());
    }
}
