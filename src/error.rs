//! Error types for the certificate provider.
//!
//! This module defines all errors that can occur while issuing certificates
//! from Vault, parsing the issued material, and serving it to the TLS layer.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`AutocertError`].
pub type Result<T> = std::result::Result<T, AutocertError>;

/// Errors that can occur during certificate issuance and renewal.
#[derive(Debug, Error)]
pub enum AutocertError {
    /// Invalid provider or settings configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS material could not be turned into a usable identity.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP request or transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Vault returned a non-success status.
    #[error("Server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message reported by Vault.
        message: String,
    },

    /// Vault answered with no body or a `null` secret.
    #[error("Empty response from Vault")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// An expected field is absent from the issuance response.
    #[error("Missing field in response: {0}")]
    MissingField(String),

    /// Invalid PEM data.
    #[error("Invalid PEM data: {0}")]
    InvalidPem(String),

    /// DER decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// No certificate has been installed yet.
    #[error("Certificate not loaded")]
    NotLoaded,

    /// The cached certificate is past its hard expiry.
    #[error("Certificate expired {} seconds ago", .elapsed.as_secs())]
    Expired {
        /// Time elapsed since the certificate expired.
        elapsed: Duration,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutocertError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a server error with status and message.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create an invalid PEM error.
    pub fn invalid_pem(msg: impl Into<String>) -> Self {
        Self::InvalidPem(msg.into())
    }

    /// Returns true if a later attempt may succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::EmptyResponse => true,
            Self::ServerError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the backend answered but the payload could not be used.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResponse(_)
                | Self::MissingField(_)
                | Self::InvalidPem(_)
                | Self::Tls(_)
                | Self::Der(_)
                | Self::Json(_)
        )
    }
}
