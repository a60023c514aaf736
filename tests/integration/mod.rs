//! Integration test utilities and helpers
//!
//! This module provides common test infrastructure for the provider
//! integration tests: a mock Vault server, generated certificate fixtures,
//! and a scripted issuer for deterministic scheduling tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::json;
use vault_autocert::{
    AutocertError, IssuedCertificate, Issuer, VaultPkiConfigBuilder, VaultPkiConfig,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Token expected by the mock server.
pub const TEST_TOKEN: &str = "test-token";

/// Issue endpoint for mount `pki` and role `temp`.
pub const PATH_ISSUE: &str = "/v1/pki/issue/temp";

/// Mock Vault server builder for integration tests
pub struct MockVaultServer {
    server: MockServer,
}

impl MockVaultServer {
    /// Create a new mock Vault server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get a reference to the inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// A configuration builder pointing at this server's `pki/issue/temp`.
    pub fn config_builder(&self) -> VaultPkiConfigBuilder {
        VaultPkiConfig::builder()
            .address(self.url())
            .expect("Valid URL")
            .token(TEST_TOKEN)
            .mount("pki")
            .role("temp")
            .common_name("*.temp.com")
    }

    /// Mock successful issuance; every call returns a fresh certificate.
    pub async fn mock_issue(&self, lease_duration: u64) {
        Mock::given(method("POST"))
            .and(path(PATH_ISSUE))
            .and(header("X-Vault-Token", TEST_TOKEN))
            .respond_with(FreshCertificate { lease_duration })
            .mount(&self.server)
            .await;
    }

    /// Mock a limited number of successful issuances.
    ///
    /// Register before any fallback mock so this one matches first.
    pub async fn mock_issue_times(&self, lease_duration: u64, times: u64) {
        Mock::given(method("POST"))
            .and(path(PATH_ISSUE))
            .respond_with(FreshCertificate { lease_duration })
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Mock a Vault error response with the standard `errors` body.
    pub async fn mock_error(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_ISSUE))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({ "errors": [message] })),
            )
            .mount(&self.server)
            .await;
    }

    /// Mock a raw response body.
    pub async fn mock_raw(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_ISSUE))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Issue requests received so far.
    pub async fn issue_requests(&self) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == PATH_ISSUE)
            .collect()
    }
}

/// Responder generating a new key pair and certificate per request.
struct FreshCertificate {
    lease_duration: u64,
}

impl Respond for FreshCertificate {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let material = fixtures::generate("localhost");
        ResponseTemplate::new(200).set_body_json(fixtures::secret_json(self.lease_duration, &material))
    }
}

/// Test fixture helpers
pub mod fixtures {
    use super::*;
    use rustls::pki_types::CertificateDer;

    /// Generated identity material in the shape Vault returns it.
    pub struct Material {
        /// Leaf certificate (PEM).
        pub certificate: String,
        /// Issuing CA certificate (PEM).
        pub issuing_ca: String,
        /// Leaf private key (PEM).
        pub private_key: String,
        /// Leaf certificate (DER).
        pub leaf_der: CertificateDer<'static>,
    }

    /// Generate a self-signed leaf for `name` plus an unrelated CA certificate.
    pub fn generate(name: &str) -> Material {
        let key_pair = rcgen::KeyPair::generate().expect("key generation");
        let leaf = rcgen::CertificateParams::new(vec![name.to_string()])
            .expect("params")
            .self_signed(&key_pair)
            .expect("self-signed leaf");

        let ca_key = rcgen::KeyPair::generate().expect("key generation");
        let ca = rcgen::CertificateParams::new(vec!["Test CA".to_string()])
            .expect("params")
            .self_signed(&ca_key)
            .expect("self-signed CA");

        Material {
            certificate: leaf.pem(),
            issuing_ca: ca.pem(),
            private_key: key_pair.serialize_pem(),
            leaf_der: leaf.der().clone(),
        }
    }

    /// A successful `pki/issue` response body.
    pub fn secret_json(lease_duration: u64, material: &Material) -> serde_json::Value {
        json!({
            "request_id": "6c2ba4b5-3b8e-2f0b-0f3f-1d3b5e6e3c6d",
            "lease_id": "pki/issue/temp/test-lease",
            "renewable": false,
            "lease_duration": lease_duration,
            "data": {
                "certificate": material.certificate,
                "issuing_ca": material.issuing_ca,
                "ca_chain": [material.issuing_ca],
                "private_key": material.private_key,
                "private_key_type": "ec",
                "serial_number": ""
            },
            "warnings": null,
            "auth": null
        })
    }

    /// An issued certificate with the given lease, built without any server.
    pub fn issued(lease_duration: u64) -> IssuedCertificate {
        let material = generate("localhost");
        let key = vault_autocert::tls::certified_key_from_pem(
            &material.certificate,
            &material.issuing_ca,
            &material.private_key,
        )
        .expect("usable key pair");
        IssuedCertificate::new(key, lease_duration).expect("valid certificate")
    }
}

/// One scripted issuance outcome.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Succeed with this lease in seconds.
    Issue(u64),
    /// Fail with a retryable error.
    Fail,
}

/// Issuer replaying a fixed script; fails once the script runs out.
pub struct ScriptedIssuer {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<tokio::time::Instant>>,
    count: AtomicUsize,
}

impl ScriptedIssuer {
    /// Create an issuer from a script.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        })
    }

    /// Number of issuance attempts so far.
    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Time of each issuance attempt.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self) -> vault_autocert::Result<IssuedCertificate> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(tokio::time::Instant::now());

        match self.script.lock().unwrap().pop_front() {
            Some(Step::Issue(lease)) => Ok(fixtures::issued(lease)),
            Some(Step::Fail) | None => Err(AutocertError::server_error(503, "Vault is sealed")),
        }
    }
}

/// Shared handle so tests can inspect the issuer after handing it over.
pub struct SharedIssuer(pub std::sync::Arc<ScriptedIssuer>);

impl Issuer for SharedIssuer {
    fn issue(
        &self,
    ) -> impl std::future::Future<Output = vault_autocert::Result<IssuedCertificate>> + Send {
        let outcome = self.0.next();
        async move { outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let mock_server = MockVaultServer::start().await;
        assert!(!mock_server.url().is_empty());
        assert!(mock_server.url().starts_with("http://"));
    }

    #[test]
    fn test_fixtures_generate_usable_material() {
        let issued = fixtures::issued(10);
        assert_eq!(issued.record.chain().len(), 2);
        assert_eq!(issued.record.lease().as_secs(), 10);
    }
}
