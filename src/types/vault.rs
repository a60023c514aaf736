//! Request and response bodies for `POST /v1/<mount>/issue/<role>`.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AutocertError, Result};

/// Identity attributes sent to Vault on every issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueBody {
    /// Requested common name.
    pub common_name: String,

    /// Comma-separated IP subject alternative names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_sans: Option<String>,

    /// Comma-separated DNS subject alternative names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_names: Option<String>,

    /// Requested TTL, e.g. `"3600s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// A fixed issuance request: the logical path plus the identity body.
///
/// Built once at provider construction and reused for every renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    path: String,
    body: IssueBody,
}

impl IssueRequest {
    /// Create a request for `path` (e.g. `pki/issue/web`) and common name.
    pub fn new(path: impl Into<String>, common_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: IssueBody {
                common_name: common_name.into(),
                ip_sans: None,
                alt_names: None,
                ttl: None,
            },
        }
    }

    /// Set the IP SANs. An empty slice clears them.
    pub fn with_ip_sans(mut self, ips: &[IpAddr]) -> Self {
        self.body.ip_sans = join(ips.iter().map(|ip| ip.to_string()));
        self
    }

    /// Set the DNS SANs. An empty slice clears them.
    pub fn with_alt_names(mut self, names: &[String]) -> Self {
        self.body.alt_names = join(names.iter().cloned());
        self
    }

    /// Set the requested TTL.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.body.ttl = ttl.map(|ttl| format!("{}s", ttl.as_secs()));
        self
    }

    /// Logical path below `/v1/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request body.
    pub fn body(&self) -> &IssueBody {
        &self.body
    }
}

fn join(values: impl Iterator<Item = String>) -> Option<String> {
    let joined = values.collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Generic Vault secret response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretResponse {
    /// Lease identifier, empty when no lease was generated.
    #[serde(default)]
    pub lease_id: String,

    /// Lease duration in seconds.
    #[serde(default)]
    pub lease_duration: u64,

    /// Whether the lease is renewable.
    #[serde(default)]
    pub renewable: bool,

    /// Issued material.
    #[serde(default)]
    pub data: Option<IssueData>,

    /// Non-fatal warnings reported by Vault.
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// The `data` object of an issue response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueData {
    /// Leaf certificate (PEM).
    #[serde(default)]
    pub certificate: Option<String>,

    /// Issuing CA certificate (PEM).
    #[serde(default)]
    pub issuing_ca: Option<String>,

    /// Private key (PEM).
    #[serde(default)]
    pub private_key: Option<String>,

    /// Key algorithm, e.g. `rsa` or `ec`.
    #[serde(default)]
    pub private_key_type: Option<String>,

    /// Serial number in colon-separated hex.
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl IssueData {
    /// Return a required string field, or [`AutocertError::MissingField`].
    pub fn require<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
        match value.as_deref() {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(AutocertError::missing_field(field)),
        }
    }
}

/// Error body returned by Vault on non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    /// Error messages.
    #[serde(default)]
    pub errors: Vec<String>,
}
