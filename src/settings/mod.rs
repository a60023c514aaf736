// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors

//! File-based settings for the provider.
//!
//! This module maps a TOML settings file onto [`VaultPkiConfig`](crate::VaultPkiConfig)
//! and [`LogConfig`](crate::logging::LogConfig), so a service can be configured
//! without code.
//!
//! # Features
//!
//! - TOML schema with `[vault]`, `[certificate]`, `[renewal]` and `[logging]` sections
//! - Environment expansion (`${HOSTNAME}`, `${VAULT_TOKEN}`, ...)
//! - `VAULT_ADDR` / `VAULT_TOKEN` fallbacks, as the Vault CLI does
//! - File discovery with a fixed search order
//!
//! # Example Settings
//!
//! ```toml
//! [vault]
//! address = "https://vault.example.com:8200"
//! token = "${VAULT_TOKEN}"
//! mount = "pki"
//! role = "web"
//!
//! [certificate]
//! common_name = "${HOSTNAME}.svc.example.com"
//! alt_names = ["svc.example.com"]
//! ip_sans = ["10.0.0.12"]
//! ttl_seconds = 3600
//!
//! [renewal]
//! renew_modifier = 0.5
//! retry_delay_seconds = 10
//! on_exhausted = "abort"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use vault_autocert::settings::SettingsLoader;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new()
//!     .with_path("/etc/vault-autocert/config.toml")
//!     .load()?;
//!
//! let config = settings.to_vault_config()?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

mod expand;
mod loader;
mod schema;

pub use expand::expand_variables;
pub use loader::{SettingsLoader, CONFIG_ENV_VAR};
pub use schema::*;
