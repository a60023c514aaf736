// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors

//! Settings file structures.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{VaultPkiConfig, VaultPkiConfigBuilder, DEFAULT_ADDRESS, DEFAULT_MOUNT};
use crate::error::{AutocertError, Result};
use crate::logging::{LogConfig, LogLevel};
use crate::renewal::{ExhaustionPolicy, DEFAULT_RENEW_MODIFIER};

use super::expand::expand_variables;

/// Environment variable holding the Vault address.
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";

/// Environment variable holding the Vault token.
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";

/// Complete settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Vault connection and role.
    pub vault: VaultSettings,

    /// Requested identity.
    pub certificate: CertificateSettings,

    /// Renewal schedule.
    #[serde(default)]
    pub renewal: RenewalSettings,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or missing required fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| AutocertError::config(format!("Invalid TOML: {e}")))
    }

    /// Expand `${VAR}` references in every string value.
    pub fn expand_variables(&mut self) -> Result<()> {
        let vault = &mut self.vault;
        expand_opt(&mut vault.address)?;
        expand_opt(&mut vault.token)?;
        expand_opt(&mut vault.namespace)?;
        expand_path(&mut vault.token_file)?;
        expand_path(&mut vault.ca_bundle_path)?;
        vault.mount = expand_variables(&vault.mount)?;
        vault.role = expand_variables(&vault.role)?;

        let cert = &mut self.certificate;
        cert.common_name = expand_variables(&cert.common_name)?;
        cert.alt_names = cert
            .alt_names
            .iter()
            .map(|s| expand_variables(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    /// Validate the settings for completeness and consistency.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.vault.role.trim().is_empty() {
            errors.push("vault.role is required".to_string());
        }
        if self.vault.mount.trim_matches('/').is_empty() {
            errors.push("vault.mount must not be empty".to_string());
        }
        if self.vault.token.is_some() && self.vault.token_file.is_some() {
            errors.push("vault.token and vault.token_file are mutually exclusive".to_string());
        }
        if self.vault.ca_bundle_path.is_some() && self.vault.insecure_skip_verify {
            errors.push(
                "vault.ca_bundle_path and vault.insecure_skip_verify are mutually exclusive"
                    .to_string(),
            );
        }
        if self.vault.timeout_seconds == 0 {
            errors.push("vault.timeout_seconds must be > 0".to_string());
        }

        if self.certificate.common_name.trim().is_empty() {
            errors.push("certificate.common_name is required".to_string());
        }
        if self.certificate.ttl_seconds == Some(0) {
            errors.push("certificate.ttl_seconds must be > 0".to_string());
        }

        let modifier = self.renewal.renew_modifier;
        if !(modifier > 0.0 && modifier <= 1.0) {
            errors.push(format!("renewal.renew_modifier must be in (0, 1], got {modifier}"));
        }
        if self.renewal.retry_delay_seconds == 0 {
            errors.push("renewal.retry_delay_seconds must be > 0".to_string());
        }
        if ExhaustionPolicy::parse(&self.renewal.on_exhausted).is_none() {
            errors.push(format!(
                "renewal.on_exhausted must be 'abort' or 'report-expired', got '{}'",
                self.renewal.on_exhausted
            ));
        }

        if LogLevel::parse(&self.logging.level).is_none() {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AutocertError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Convert to a provider configuration, falling back to `VAULT_ADDR`
    /// and `VAULT_TOKEN` from the process environment.
    pub fn to_vault_config(&self) -> Result<VaultPkiConfig> {
        self.to_vault_config_with(|name| std::env::var(name).ok())
    }

    /// Convert to a provider configuration, resolving fallbacks through `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be found, a referenced file cannot
    /// be read, or the resulting configuration is invalid.
    pub fn to_vault_config_with<F>(&self, env: F) -> Result<VaultPkiConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vault = &self.vault;

        let address = vault
            .address
            .clone()
            .or_else(|| env(ENV_VAULT_ADDR))
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        let token = match (&vault.token, &vault.token_file) {
            (Some(token), _) => token.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| {
                    AutocertError::config(format!("Failed to read {}: {e}", path.display()))
                })?,
            (None, None) => env(ENV_VAULT_TOKEN).ok_or_else(|| {
                AutocertError::config(format!(
                    "vault.token is not set and {ENV_VAULT_TOKEN} is empty"
                ))
            })?,
        };

        let mut builder = VaultPkiConfigBuilder::new()
            .address(&address)?
            .token(token)
            .mount(&vault.mount)
            .role(&vault.role)
            .common_name(&self.certificate.common_name)
            .ip_sans(self.certificate.ip_sans.iter().copied())
            .timeout(Duration::from_secs(vault.timeout_seconds))
            .renew_modifier(self.renewal.renew_modifier)
            .retry_delay(Duration::from_secs(self.renewal.retry_delay_seconds))
            .on_exhausted(self.exhaustion_policy()?);

        if let Some(ref namespace) = vault.namespace {
            builder = builder.namespace(namespace);
        }
        for name in &self.certificate.alt_names {
            builder = builder.alt_name(name);
        }
        if let Some(ttl) = self.certificate.ttl_seconds {
            builder = builder.ttl(Duration::from_secs(ttl));
        }

        builder = if let Some(ref path) = vault.ca_bundle_path {
            let ca_pem = std::fs::read(path).map_err(|e| {
                AutocertError::config(format!("Failed to read {}: {e}", path.display()))
            })?;
            builder.trust_explicit(vec![ca_pem])
        } else if vault.insecure_skip_verify {
            builder.trust_any_insecure()
        } else {
            builder.trust_webpki_roots()
        };

        builder.build()
    }

    /// The exhaustion policy named in `[renewal]`.
    pub fn exhaustion_policy(&self) -> Result<ExhaustionPolicy> {
        ExhaustionPolicy::parse(&self.renewal.on_exhausted).ok_or_else(|| {
            AutocertError::config(format!(
                "Unknown exhaustion policy: {}",
                self.renewal.on_exhausted
            ))
        })
    }

    /// The logging configuration named in `[logging]`.
    pub fn log_config(&self) -> Result<LogConfig> {
        let level = LogLevel::parse(&self.logging.level).ok_or_else(|| {
            AutocertError::config(format!("Unknown log level: {}", self.logging.level))
        })?;

        let config = LogConfig::default().with_level(level);
        Ok(if self.logging.json {
            config.with_json()
        } else {
            config
        })
    }
}

fn expand_opt(value: &mut Option<String>) -> Result<()> {
    if let Some(ref mut v) = value {
        *v = expand_variables(v)?;
    }
    Ok(())
}

fn expand_path(value: &mut Option<PathBuf>) -> Result<()> {
    if let Some(ref mut path) = value {
        let expanded = expand_variables(&path.to_string_lossy())?;
        *path = PathBuf::from(expanded);
    }
    Ok(())
}

/// `[vault]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultSettings {
    /// Vault base URL. Falls back to `VAULT_ADDR`.
    #[serde(default)]
    pub address: Option<String>,

    /// Vault token. Falls back to `VAULT_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    /// File holding the token, e.g. a Vault Agent sink.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Enterprise namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// PKI secrets engine mount.
    #[serde(default = "default_mount")]
    pub mount: String,

    /// PKI role.
    pub role: String,

    /// PEM bundle used to verify Vault's certificate.
    #[serde(default)]
    pub ca_bundle_path: Option<PathBuf>,

    /// Skip verification of Vault's certificate (testing only).
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_mount() -> String {
    DEFAULT_MOUNT.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// `[certificate]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateSettings {
    /// Common name to request.
    pub common_name: String,

    /// DNS subject alternative names.
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// IP subject alternative names.
    #[serde(default)]
    pub ip_sans: Vec<IpAddr>,

    /// Requested TTL in seconds; the role default applies when unset.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// `[renewal]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewalSettings {
    /// Fraction of the lease after which renewal is attempted.
    #[serde(default = "default_renew_modifier")]
    pub renew_modifier: f64,

    /// Seconds between failed attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,

    /// `abort` or `report-expired`.
    #[serde(default = "default_on_exhausted")]
    pub on_exhausted: String,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            renew_modifier: DEFAULT_RENEW_MODIFIER,
            retry_delay_seconds: default_retry_delay(),
            on_exhausted: default_on_exhausted(),
        }
    }
}

fn default_renew_modifier() -> f64 {
    DEFAULT_RENEW_MODIFIER
}

fn default_retry_delay() -> u64 {
    30
}

fn default_on_exhausted() -> String {
    "abort".to_string()
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable structured JSON logging.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
