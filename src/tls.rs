//! TLS helpers for the certificate provider.
//!
//! This module builds the HTTP client used to talk to Vault, turns PEM
//! material returned by Vault into a rustls signing identity, and binds a
//! certificate resolver into a rustls server configuration.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::ResolvesServerCert;
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::config::{TrustAnchors, VaultPkiConfig};
use crate::error::{AutocertError, Result};
use crate::types::headers;

/// Build a reqwest Client with the TLS and header configuration for Vault.
pub fn build_http_client(config: &VaultPkiConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(crate::USER_AGENT)
        .use_rustls_tls();

    match &config.trust_anchors {
        TrustAnchors::WebPki => {
            builder = builder.tls_built_in_root_certs(true);
        }
        TrustAnchors::Explicit(ca_certs) => {
            builder = builder.tls_built_in_root_certs(false);
            for ca_pem in ca_certs {
                let cert = reqwest::Certificate::from_pem(ca_pem)
                    .map_err(|e| AutocertError::tls(format!("Failed to parse CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        TrustAnchors::InsecureAcceptAny => {
            builder = builder
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(true);
        }
    }

    builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);

    let mut default_headers = reqwest::header::HeaderMap::new();
    default_headers.insert(
        headers::VAULT_REQUEST,
        reqwest::header::HeaderValue::from_static("true"),
    );
    if let Some(ref namespace) = config.namespace {
        let value = reqwest::header::HeaderValue::try_from(namespace.as_str())
            .map_err(|e| AutocertError::config(format!("Invalid namespace: {}", e)))?;
        default_headers.insert(headers::VAULT_NAMESPACE, value);
    }
    for (name, value) in &config.additional_headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::try_from(name.as_str()),
            reqwest::header::HeaderValue::try_from(value.as_str()),
        ) {
            default_headers.insert(name, value);
        } else {
            tracing::warn!(header = %name, "Ignoring invalid additional header");
        }
    }
    builder = builder.default_headers(default_headers);

    builder
        .build()
        .map_err(|e| AutocertError::tls(format!("Failed to build HTTP client: {}", e)))
}

/// The crypto provider used for signing keys and server configs.
///
/// Always explicit, so the crate never depends on a process-wide default.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Parse PEM-encoded certificates.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AutocertError::invalid_pem(format!("Failed to parse certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(AutocertError::invalid_pem("No certificates found in PEM data"));
    }

    Ok(certs)
}

/// Parse a PEM-encoded private key.
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);

    // PKCS#8 from Vault's `private_key_format=pkcs8`, PKCS#1/SEC1 by default
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                return Err(AutocertError::invalid_pem(format!("Failed to parse PEM: {}", e)));
            }
        }
    }

    Err(AutocertError::invalid_pem("No private key found in PEM data"))
}

/// Combine a chain and key into a checked rustls signing identity.
///
/// # Errors
///
/// Returns [`AutocertError::Tls`] if the key type is unsupported or the key
/// does not belong to the leaf certificate.
pub fn build_certified_key(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<CertifiedKey>> {
    let provider = crypto_provider();
    let certified_key = CertifiedKey::from_der(chain, key, &provider)
        .map_err(|e| AutocertError::tls(format!("Unusable key pair: {}", e)))?;
    Ok(Arc::new(certified_key))
}

/// Parse a leaf certificate, its issuing CA and a private key from PEM.
pub fn certified_key_from_pem(
    certificate_pem: &str,
    issuing_ca_pem: &str,
    private_key_pem: &str,
) -> Result<Arc<CertifiedKey>> {
    let mut chain = parse_pem_certificates(certificate_pem.as_bytes())?;
    chain.extend(parse_pem_certificates(issuing_ca_pem.as_bytes())?);
    let key = parse_pem_private_key(private_key_pem.as_bytes())?;
    build_certified_key(chain, key)
}

/// Build a rustls ServerConfig that asks `resolver` for every handshake.
pub fn build_server_config(resolver: Arc<dyn ResolvesServerCert>) -> Result<Arc<ServerConfig>> {
    let config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| AutocertError::tls(format!("Failed to select protocol versions: {}", e)))?
        .with_no_client_auth()
        .with_cert_resolver(resolver);

    Ok(Arc::new(config))
}
