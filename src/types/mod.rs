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

//! Vault message types and the in-memory certificate record.
//!
//! This module provides the request and response bodies exchanged with the
//! Vault PKI issue endpoint, and [`CertificateRecord`], the immutable unit of
//! identity material handed to the TLS layer.

mod record;
mod vault;

pub use record::{CertificateRecord, IssuedCertificate};
pub use vault::{ErrorResponse, IssueBody, IssueData, IssueRequest, SecretResponse};

/// HTTP headers understood by Vault.
pub mod headers {
    /// Authentication token header.
    pub const VAULT_TOKEN: &str = "X-Vault-Token";

    /// Enterprise namespace header.
    pub const VAULT_NAMESPACE: &str = "X-Vault-Namespace";

    /// Marks the request as an API request (required by some Vault proxies).
    pub const VAULT_REQUEST: &str = "X-Vault-Request";
}

/// Fields of the issue response that must be present.
pub mod fields {
    /// Top-level secret data object.
    pub const DATA: &str = "data";

    /// Issued leaf certificate (PEM).
    pub const CERTIFICATE: &str = "certificate";

    /// Issuing CA certificate (PEM).
    pub const ISSUING_CA: &str = "issuing_ca";

    /// Private key matching the leaf certificate (PEM).
    pub const PRIVATE_KEY: &str = "private_key";
}
