//! Integration tests for POST /v1/<mount>/issue/<role>

use std::net::IpAddr;
use std::time::Duration;

use serde_json::json;
use vault_autocert::{AutocertError, VaultPkiClient, VaultPkiConfig};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::integration::{fixtures, MockVaultServer, PATH_ISSUE, TEST_TOKEN};

#[tokio::test]
async fn test_issue_request_shape() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");

    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .and(header("X-Vault-Token", TEST_TOKEN))
        .and(body_json(json!({
            "common_name": "*.temp.com",
            "ip_sans": "127.0.0.1,192.168.1.1",
            "alt_names": "temp.com",
            "ttl": "600s"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::secret_json(10, &material)))
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = mock
        .config_builder()
        .ip_san("127.0.0.1".parse::<IpAddr>().unwrap())
        .ip_san("192.168.1.1".parse::<IpAddr>().unwrap())
        .alt_name("temp.com")
        .ttl(Duration::from_secs(600))
        .build()
        .expect("Valid config");

    let client = VaultPkiClient::new(&config).expect("Client creation failed");
    let issued = client.issue_certificate().await;
    assert!(issued.is_ok(), "issue failed: {:?}", issued.err());

    let issued = issued.unwrap();
    assert_eq!(issued.declared_lease, Duration::from_secs(10));
    assert_eq!(issued.record.lease(), Duration::from_secs(10));
    assert_eq!(issued.record.chain().len(), 2);
    assert_eq!(issued.record.chain()[0], material.leaf_der);
    assert!(!issued.record.serial_number().is_empty());
}

#[tokio::test]
async fn test_each_call_issues_anew() {
    let mock = MockVaultServer::start().await;
    mock.mock_issue(10).await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();

    let first = client.issue_certificate().await.unwrap();
    let second = client.issue_certificate().await.unwrap();
    assert_ne!(first.record.chain()[0], second.record.chain()[0]);
    assert_eq!(mock.issue_requests().await.len(), 2);
}

#[tokio::test]
async fn test_namespace_and_request_headers() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");

    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .and(header("X-Vault-Namespace", "team-a"))
        .and(header("X-Vault-Request", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::secret_json(10, &material)))
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = mock.config_builder().namespace("team-a").build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(client.issue_certificate().await.is_ok());
}

#[tokio::test]
async fn test_custom_mount_and_role() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");

    Mock::given(method("POST"))
        .and(path("/v1/pki_int/issue/web-servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::secret_json(30, &material)))
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = mock
        .config_builder()
        .mount("/pki_int/")
        .role("web-servers")
        .build()
        .unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(client.issue_certificate().await.is_ok());
}

#[tokio::test]
async fn test_permission_denied() {
    let mock = MockVaultServer::start().await;
    mock.mock_error(403, "permission denied").await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    let err = client.issue_certificate().await.unwrap_err();

    match err {
        AutocertError::ServerError { status, ref message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "permission denied");
        }
        other => panic!("Expected ServerError, got {:?}", other),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_sealed_vault_is_retryable() {
    let mock = MockVaultServer::start().await;
    mock.mock_error(503, "Vault is sealed").await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    let err = client.issue_certificate().await.unwrap_err();

    assert!(matches!(err, AutocertError::ServerError { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_no_content_is_empty_response() {
    let mock = MockVaultServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .respond_with(ResponseTemplate::new(204))
        .mount(mock.inner())
        .await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(matches!(
        client.issue_certificate().await,
        Err(AutocertError::EmptyResponse)
    ));
}

#[tokio::test]
async fn test_null_body_is_empty_response() {
    let mock = MockVaultServer::start().await;
    mock.mock_raw(200, "null").await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(matches!(
        client.issue_certificate().await,
        Err(AutocertError::EmptyResponse)
    ));
}

#[tokio::test]
async fn test_non_json_body() {
    let mock = MockVaultServer::start().await;
    mock.mock_raw(200, "<html>proxy error</html>").await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    let err = client.issue_certificate().await.unwrap_err();
    assert!(matches!(err, AutocertError::InvalidResponse(_)));
    assert!(err.is_parse_error());
}

#[tokio::test]
async fn test_missing_private_key() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");

    let mut body = fixtures::secret_json(10, &material);
    body["data"]
        .as_object_mut()
        .unwrap()
        .remove("private_key");
    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(mock.inner())
        .await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(matches!(
        client.issue_certificate().await,
        Err(AutocertError::MissingField(f)) if f == "private_key"
    ));
}

#[tokio::test]
async fn test_key_not_matching_certificate() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");
    let other = fixtures::generate("localhost");

    let mut body = fixtures::secret_json(10, &material);
    body["data"]["private_key"] = json!(other.private_key);
    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(mock.inner())
        .await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    assert!(matches!(
        client.issue_certificate().await,
        Err(AutocertError::Tls(_))
    ));
}

#[tokio::test]
async fn test_zero_lease_uses_certificate_validity() {
    let mock = MockVaultServer::start().await;
    mock.mock_issue(0).await;

    let config = mock.config_builder().build().unwrap();
    let client = VaultPkiClient::new(&config).unwrap();
    let issued = client.issue_certificate().await.unwrap();

    assert_eq!(issued.declared_lease, Duration::ZERO);
    // Generated certificates are valid for decades
    assert!(issued.record.lease() > Duration::from_secs(365 * 24 * 3600));
    assert!(!issued.record.is_expired());
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let config = VaultPkiConfig::builder()
        .address("http://127.0.0.1:1")
        .unwrap()
        .token(TEST_TOKEN)
        .role("temp")
        .common_name("*.temp.com")
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let client = VaultPkiClient::new(&config).unwrap();
    let err = client.issue_certificate().await.unwrap_err();
    assert!(matches!(err, AutocertError::Http(_)));
    assert!(err.is_retryable());
}
