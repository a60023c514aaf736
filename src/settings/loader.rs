// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors

//! Settings file discovery and loading.

use std::path::{Path, PathBuf};

use crate::error::{AutocertError, Result};

use super::schema::Settings;

/// Environment variable naming the settings file.
pub const CONFIG_ENV_VAR: &str = "VAULT_AUTOCERT_CONFIG";

/// Settings loader with discovery and precedence rules.
///
/// # Search Order
///
/// The first file found wins:
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `VAULT_AUTOCERT_CONFIG`
/// 3. `/etc/vault-autocert/config.toml`
/// 4. Current directory: `./vault-autocert.toml`
///
/// # Example
///
/// ```no_run
/// use vault_autocert::settings::SettingsLoader;
///
/// // Load from default locations
/// let settings = SettingsLoader::new().load().unwrap();
///
/// // Load from specific path without variable expansion
/// let settings = SettingsLoader::new()
///     .with_path("/custom/path/config.toml")
///     .with_expand_variables(false)
///     .load()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    explicit_path: Option<PathBuf>,
    expand_variables: bool,
    validate: bool,
    env_var_name: String,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Create a new loader with default settings.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            expand_variables: true,
            validate: true,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Set an explicit settings file path.
    ///
    /// When set, only this path will be checked (no discovery).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable variable expansion.
    ///
    /// Default: `true`
    pub fn with_expand_variables(mut self, expand: bool) -> Self {
        self.expand_variables = expand;
        self
    }

    /// Enable or disable validation after loading.
    ///
    /// Default: `true`
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the environment variable name for path override.
    ///
    /// Default: `VAULT_AUTOCERT_CONFIG`
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Find, read and parse the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No settings file is found
    /// - The file cannot be read
    /// - The TOML is invalid
    /// - Validation fails (if enabled)
    pub fn load(&self) -> Result<Settings> {
        let path = self.find_config_file()?;
        tracing::debug!(path = %path.display(), "Loading settings");

        let toml_content = std::fs::read_to_string(&path).map_err(|e| {
            AutocertError::config(format!("Failed to read {}: {e}", path.display()))
        })?;

        self.load_from_str(&toml_content)
    }

    /// Parse settings from a TOML string.
    pub fn load_from_str(&self, toml_content: &str) -> Result<Settings> {
        let mut settings = Settings::from_toml(toml_content)?;

        if self.expand_variables {
            settings.expand_variables()?;
        }

        if self.validate {
            settings.validate()?;
        }

        Ok(settings)
    }

    /// Find the settings file path.
    pub fn find_config_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.explicit_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(AutocertError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        if let Ok(env_path) = std::env::var(&self.env_var_name) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(path);
            }
            return Err(AutocertError::config(format!(
                "Configuration file from {} not found: {}",
                self.env_var_name, env_path
            )));
        }

        let search_paths = Self::search_paths();
        if let Some(path) = search_paths.iter().find(|p| p.exists()) {
            return Ok(path.clone());
        }

        Err(AutocertError::config(format!(
            "No configuration file found. Searched:\n  - {}",
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  - ")
        )))
    }

    /// Standard locations searched when no path is given.
    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/etc/vault-autocert/config.toml"),
            PathBuf::from("vault-autocert.toml"),
        ]
    }
}
