//! Vault PKI issuance client.
//!
//! This module provides [`VaultPkiClient`], which performs one issuance
//! exchange against a Vault PKI secrets engine, and the [`Issuer`] trait the
//! renewal engine uses to obtain certificates.

use std::future::Future;

use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use url::Url;

use crate::config::VaultPkiConfig;
use crate::error::{AutocertError, Result};
use crate::tls::{build_http_client, certified_key_from_pem};
use crate::types::{
    fields, headers, ErrorResponse, IssueData, IssueRequest, IssuedCertificate, SecretResponse,
};

/// Source of freshly issued certificates.
///
/// Implementations perform exactly one issuance per call and never retry;
/// retry policy belongs to the caller.
pub trait Issuer: Send + Sync + 'static {
    /// Issue a new certificate.
    fn issue(&self) -> impl Future<Output = Result<IssuedCertificate>> + Send;
}

/// Client for the Vault PKI `issue` endpoint.
///
/// The request is fixed at construction: every call to [`issue_certificate`](Self::issue_certificate)
/// sends the same identity attributes to the same role.
///
/// # Example
///
/// ```no_run
/// use vault_autocert::{VaultPkiClient, VaultPkiConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = VaultPkiConfig::builder()
///     .address("https://vault.example.com:8200")?
///     .token("s.xxxxxxxx")
///     .role("web")
///     .common_name("svc.example.com")
///     .build()?;
///
/// let client = VaultPkiClient::new(&config)?;
/// let issued = client.issue_certificate().await?;
/// println!("serial {}", issued.record.serial_number());
/// # Ok(())
/// # }
/// ```
pub struct VaultPkiClient {
    http: reqwest::Client,
    url: Url,
    token: HeaderValue,
    request: IssueRequest,
}

impl std::fmt::Debug for VaultPkiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultPkiClient")
            .field("url", &self.url.as_str())
            .field("request", &self.request)
            .finish()
    }
}

impl VaultPkiClient {
    /// Create a new client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &VaultPkiConfig) -> Result<Self> {
        let http = build_http_client(config)?;

        let mut token = HeaderValue::try_from(config.token.as_str())
            .map_err(|_| AutocertError::config("token contains invalid characters"))?;
        token.set_sensitive(true);

        Ok(Self {
            http,
            url: config.issue_url(),
            token,
            request: config.issue_request(),
        })
    }

    /// The issuance request sent on every call.
    pub fn request(&self) -> &IssueRequest {
        &self.request
    }

    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Perform one issuance.
    ///
    /// # Errors
    ///
    /// - [`AutocertError::Http`] on transport failure
    /// - [`AutocertError::ServerError`] on a non-success status
    /// - [`AutocertError::EmptyResponse`] when Vault returns no secret
    /// - [`AutocertError::MissingField`] when the secret lacks material
    /// - [`AutocertError::InvalidPem`] / [`AutocertError::Tls`] for unusable material
    pub async fn issue_certificate(&self) -> Result<IssuedCertificate> {
        tracing::debug!(url = %self.url, "POST");

        let response = self
            .http
            .post(self.url.clone())
            .header(headers::VAULT_TOKEN, self.token.clone())
            .json(self.request.body())
            .send()
            .await?;

        let response = self.handle_error_response(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Err(AutocertError::EmptyResponse);
        }

        let body = response.bytes().await?;
        let secret = parse_secret(&body)?;

        for warning in secret.warnings.iter().flatten() {
            tracing::warn!(path = %self.request.path(), warning = %warning, "Vault warning");
        }

        issued_from_secret(secret)
    }

    /// Handle error responses from Vault.
    async fn handle_error_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(AutocertError::server_error(status.as_u16(), error_message(&body)))
    }
}

impl Issuer for VaultPkiClient {
    async fn issue(&self) -> Result<IssuedCertificate> {
        self.issue_certificate().await
    }
}

/// Decode a secret envelope, treating an empty or `null` body as no secret.
fn parse_secret(body: &[u8]) -> Result<SecretResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AutocertError::EmptyResponse);
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AutocertError::invalid_response(format!("Body is not JSON: {}", e)))?;
    if value.is_null() {
        return Err(AutocertError::EmptyResponse);
    }

    serde_json::from_value(value)
        .map_err(|e| AutocertError::invalid_response(format!("Unexpected secret format: {}", e)))
}

/// Turn the secret data into a checked identity plus lease.
fn issued_from_secret(secret: SecretResponse) -> Result<IssuedCertificate> {
    let data = secret
        .data
        .ok_or_else(|| AutocertError::missing_field(fields::DATA))?;

    let certificate = IssueData::require(&data.certificate, fields::CERTIFICATE)?;
    let issuing_ca = IssueData::require(&data.issuing_ca, fields::ISSUING_CA)?;
    let private_key = IssueData::require(&data.private_key, fields::PRIVATE_KEY)?;

    let certified_key = certified_key_from_pem(certificate, issuing_ca, private_key)?;
    IssuedCertificate::new(certified_key, secret.lease_duration)
}

/// Extract a readable message from a Vault error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => "no error message".to_string(),
        _ => body.trim().to_string(),
    }
}
