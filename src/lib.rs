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

//! # vault-autocert
//!
//! Self-renewing TLS certificates issued by a HashiCorp Vault PKI secrets engine.
//!
//! A [`CertProvider`] requests a certificate from `POST /v1/<mount>/issue/<role>`
//! when it is created, serves it to rustls through a non-blocking resolver, and
//! re-issues it in the background after a configurable fraction of each lease.
//!
//! ## Features
//!
//! - **Async-first design** using Tokio
//! - **Lock-free reads** of the current certificate from any handshake thread
//! - **Bounded staleness**: an expired certificate is never presented
//! - **Cancellation** through `tokio_util::sync::CancellationToken`
//! - **TOML settings** with environment expansion (see [`settings`])
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use vault_autocert::{CertProvider, VaultPkiConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultPkiConfig::builder()
//!         .address("https://vault.example.com:8200")?
//!         .token("s.xxxxxxxx")
//!         .mount("pki")
//!         .role("web")
//!         .common_name("svc.example.com")
//!         .alt_name("svc.internal")
//!         .ttl(Duration::from_secs(3600))
//!         .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     let provider = CertProvider::new(&config, cancel.clone()).await?;
//!
//!     let record = provider.get_certificate()?;
//!     println!("serving certificate {}", record.serial_number());
//!
//!     // rustls server configuration backed by the provider
//!     let _server_config = provider.server_config()?;
//!
//!     cancel.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ## Custom issuers
//!
//! The renewal engine is generic over [`Issuer`], so any certificate source
//! can be plugged into [`CertProvider::with_issuer`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod renewal;
pub mod settings;
pub mod tls;
pub mod types;

// Re-export main types at crate root for convenience
pub use client::{Issuer, VaultPkiClient};
pub use config::{TrustAnchors, VaultPkiConfig, VaultPkiConfigBuilder};
pub use error::{AutocertError, Result};
pub use renewal::{
    CertProvider, CertResolver, ExhaustionPolicy, ProviderState, RenewalEvent,
    RenewalEventHandler, RenewalPolicy,
};
pub use types::{CertificateRecord, IssueRequest, IssuedCertificate};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("vault-autocert/", env!("CARGO_PKG_VERSION"));
