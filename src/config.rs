// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration types for the Vault PKI provider.
//!
//! This module provides the construction-time configuration surface: where
//! Vault lives, how to authenticate, which role issues the certificate, the
//! identity to request, and the renewal policy.

use std::net::IpAddr;
use std::time::Duration;

use url::Url;

use crate::error::{AutocertError, Result};
use crate::renewal::{ExhaustionPolicy, RenewalEventHandler, RenewalPolicy};
use crate::types::IssueRequest;

/// Vault address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "http://localhost:8200";

/// PKI secrets engine mount used when none is configured.
pub const DEFAULT_MOUNT: &str = "pki";

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a Vault PKI certificate provider.
#[derive(Clone)]
pub struct VaultPkiConfig {
    /// Vault base URL (e.g., "https://vault.example.com:8200").
    pub address: Url,

    /// Vault token sent as `X-Vault-Token` on every request.
    pub token: String,

    /// Optional Vault Enterprise namespace (`X-Vault-Namespace`).
    pub namespace: Option<String>,

    /// Mount path of the PKI secrets engine.
    pub mount: String,

    /// PKI role used for issuance.
    pub role: String,

    /// Certificate common name.
    pub common_name: String,

    /// IP subject alternative names.
    pub ip_sans: Vec<IpAddr>,

    /// DNS subject alternative names.
    pub alt_names: Vec<String>,

    /// Requested certificate TTL. The role's default applies when unset.
    pub ttl: Option<Duration>,

    /// Renewal scheduling policy.
    pub renewal: RenewalPolicy,

    /// Trust anchor configuration for the Vault server certificate.
    pub trust_anchors: TrustAnchors,

    /// Request timeout for a single issuance call.
    pub timeout: Duration,

    /// Additional HTTP headers to include in requests.
    pub additional_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for VaultPkiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultPkiConfig")
            .field("address", &self.address.as_str())
            .field("token", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("mount", &self.mount)
            .field("role", &self.role)
            .field("common_name", &self.common_name)
            .field("ip_sans", &self.ip_sans)
            .field("alt_names", &self.alt_names)
            .field("ttl", &self.ttl)
            .field("renewal", &self.renewal)
            .field("trust_anchors", &self.trust_anchors)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for VaultPkiConfig {
    fn default() -> Self {
        Self {
            address: Url::parse(DEFAULT_ADDRESS).expect("valid default URL"),
            token: String::new(),
            namespace: None,
            mount: DEFAULT_MOUNT.to_string(),
            role: String::new(),
            common_name: String::new(),
            ip_sans: Vec::new(),
            alt_names: Vec::new(),
            ttl: None,
            renewal: RenewalPolicy::default(),
            trust_anchors: TrustAnchors::WebPki,
            timeout: DEFAULT_TIMEOUT,
            additional_headers: Vec::new(),
        }
    }
}

impl VaultPkiConfig {
    /// Create a new configuration builder.
    pub fn builder() -> VaultPkiConfigBuilder {
        VaultPkiConfigBuilder::new()
    }

    /// Logical path of the issue endpoint, e.g. `pki/issue/web`.
    pub fn issue_path(&self) -> String {
        format!(
            "{}/issue/{}",
            self.mount.trim_matches('/'),
            self.role.trim_matches('/')
        )
    }

    /// Full URL of the issue endpoint, e.g. `http://localhost:8200/v1/pki/issue/web`.
    pub fn issue_url(&self) -> Url {
        let mut url = self.address.clone();
        url.set_path(&format!("/v1/{}", self.issue_path()));
        url
    }

    /// Build the identity attributes sent with every issuance.
    pub fn issue_request(&self) -> IssueRequest {
        IssueRequest::new(self.issue_path(), self.common_name.clone())
            .with_ip_sans(&self.ip_sans)
            .with_alt_names(&self.alt_names)
            .with_ttl(self.ttl)
    }

    /// Check that the configuration can be used to issue certificates.
    ///
    /// # Errors
    ///
    /// Returns [`AutocertError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.mount.trim_matches('/').is_empty() {
            return Err(AutocertError::config("mount path must not be empty"));
        }
        if self.role.trim_matches('/').is_empty() {
            return Err(AutocertError::config("role is required"));
        }
        if self.common_name.is_empty() {
            return Err(AutocertError::config("common_name is required"));
        }
        if self.ttl == Some(Duration::ZERO) {
            return Err(AutocertError::config("ttl must be greater than zero"));
        }
        self.renewal.validate()
    }
}

/// Builder for [`VaultPkiConfig`].
#[derive(Default)]
pub struct VaultPkiConfigBuilder {
    address: Option<Url>,
    token: Option<String>,
    namespace: Option<String>,
    mount: Option<String>,
    role: Option<String>,
    common_name: Option<String>,
    ip_sans: Vec<IpAddr>,
    alt_names: Vec<String>,
    ttl: Option<Duration>,
    renewal: RenewalPolicy,
    trust_anchors: Option<TrustAnchors>,
    timeout: Option<Duration>,
    additional_headers: Vec<(String, String)>,
}

impl VaultPkiConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Vault address.
    pub fn address(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.address = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set the Vault address from a pre-parsed URL.
    pub fn address_parsed(mut self, url: Url) -> Self {
        self.address = Some(url);
        self
    }

    /// Set the Vault token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the Vault Enterprise namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the PKI mount path.
    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    /// Set the PKI role.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the certificate common name.
    pub fn common_name(mut self, cn: impl Into<String>) -> Self {
        self.common_name = Some(cn.into());
        self
    }

    /// Add an IP subject alternative name.
    pub fn ip_san(mut self, ip: IpAddr) -> Self {
        self.ip_sans.push(ip);
        self
    }

    /// Add several IP subject alternative names.
    pub fn ip_sans(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ip_sans.extend(ips);
        self
    }

    /// Add a DNS subject alternative name.
    pub fn alt_name(mut self, name: impl Into<String>) -> Self {
        self.alt_names.push(name.into());
        self
    }

    /// Request a specific certificate TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the fraction of the lease after which renewal is attempted.
    pub fn renew_modifier(mut self, modifier: f64) -> Self {
        self.renewal.renew_modifier = modifier;
        self
    }

    /// Set the delay between failed renewal attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.renewal.retry_delay = delay;
        self
    }

    /// Set what happens when renewal cannot succeed before expiry.
    pub fn on_exhausted(mut self, policy: ExhaustionPolicy) -> Self {
        self.renewal.on_exhausted = policy;
        self
    }

    /// Set the renewal event callback handler.
    pub fn event_handler(mut self, handler: std::sync::Arc<dyn RenewalEventHandler>) -> Self {
        self.renewal.event_handler = Some(handler);
        self
    }

    /// Replace the whole renewal policy.
    pub fn renewal_policy(mut self, policy: RenewalPolicy) -> Self {
        self.renewal = policy;
        self
    }

    /// Use Mozilla's root CA store (webpki-roots) for server verification.
    pub fn trust_webpki_roots(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::WebPki);
        self
    }

    /// Use explicit CA certificates for server verification.
    pub fn trust_explicit(mut self, ca_certs: Vec<Vec<u8>>) -> Self {
        self.trust_anchors = Some(TrustAnchors::Explicit(ca_certs));
        self
    }

    /// Accept any server certificate (insecure, for testing only).
    pub fn trust_any_insecure(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::InsecureAcceptAny);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an additional HTTP header to all requests.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }

    /// Build and validate the configuration.
    ///
    /// Unset fields take their defaults: address `http://localhost:8200`,
    /// mount `pki`, renew modifier 0.95, retry delay 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<VaultPkiConfig> {
        let defaults = VaultPkiConfig::default();

        let config = VaultPkiConfig {
            address: self.address.unwrap_or(defaults.address),
            token: self.token.unwrap_or_default(),
            namespace: self.namespace,
            mount: self.mount.unwrap_or(defaults.mount),
            role: self.role.unwrap_or_default(),
            common_name: self.common_name.unwrap_or_default(),
            ip_sans: self.ip_sans,
            alt_names: self.alt_names,
            ttl: self.ttl,
            renewal: self.renewal,
            trust_anchors: self.trust_anchors.unwrap_or(defaults.trust_anchors),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            additional_headers: self.additional_headers,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Trust anchor configuration for Vault server certificate verification.
#[derive(Clone)]
pub enum TrustAnchors {
    /// Use Mozilla's root CA store (webpki-roots).
    WebPki,

    /// Use explicit CA certificates (PEM-encoded).
    Explicit(Vec<Vec<u8>>),

    /// Accept any server certificate (insecure, for testing only).
    ///
    /// **WARNING**: This disables all server certificate verification.
    InsecureAcceptAny,
}

impl std::fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebPki => write!(f, "WebPki"),
            Self::Explicit(certs) => write!(f, "Explicit({} certs)", certs.len()),
            Self::InsecureAcceptAny => write!(f, "InsecureAcceptAny"),
        }
    }
}
