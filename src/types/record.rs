//! The certificate record served to the TLS layer.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use der::Decode;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use tokio::time::Instant;
use x509_cert::Certificate;

use crate::error::{AutocertError, Result};

/// Currently valid identity material.
///
/// Holds the certificate chain and signing key, together with the hard
/// expiry derived from the lease. A record is never mutated; renewal installs
/// a new one.
#[derive(Clone)]
pub struct CertificateRecord {
    certified_key: Arc<CertifiedKey>,
    serial_number: String,
    not_after: SystemTime,
    issued_at: Instant,
    issued_at_wall: SystemTime,
    lease: Duration,
}

impl CertificateRecord {
    /// Build a record from a checked key pair and the backend-declared lease.
    ///
    /// A zero lease (Vault roles without `generate_lease`) is replaced by the
    /// time remaining until the leaf certificate's `notAfter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is empty or the leaf is not valid DER.
    pub fn new(certified_key: Arc<CertifiedKey>, declared_lease: Duration) -> Result<Self> {
        let leaf = certified_key
            .cert
            .first()
            .ok_or_else(|| AutocertError::invalid_pem("certificate chain is empty"))?;

        let parsed = Certificate::from_der(leaf.as_ref())?;
        let tbs = &parsed.tbs_certificate;
        let not_after = UNIX_EPOCH + tbs.validity.not_after.to_unix_duration();
        let serial_number = format_serial(tbs.serial_number.as_bytes());

        let issued_at_wall = SystemTime::now();
        let lease = if declared_lease.is_zero() {
            not_after
                .duration_since(issued_at_wall)
                .unwrap_or(Duration::ZERO)
        } else {
            declared_lease
        };

        Ok(Self {
            certified_key,
            serial_number,
            not_after,
            issued_at: Instant::now(),
            issued_at_wall,
            lease,
        })
    }

    /// The rustls signing identity (chain + key).
    pub fn certified_key(&self) -> &Arc<CertifiedKey> {
        &self.certified_key
    }

    /// DER certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.certified_key.cert
    }

    /// Leaf serial number in colon-separated lowercase hex.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// The leaf certificate's `notAfter`.
    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    /// Effective lease used for scheduling and expiry.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Wall-clock time at which the record was built.
    pub fn issued_at(&self) -> SystemTime {
        self.issued_at_wall
    }

    /// Hard expiry: the record must not be presented after this instant.
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.lease
    }

    /// Time remaining before hard expiry, zero once expired.
    pub fn expires_in(&self) -> Duration {
        self.expires_at().saturating_duration_since(Instant::now())
    }

    /// Returns true once the hard expiry has been reached.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }

    /// How long ago the record expired, if it has.
    pub fn expired_for(&self) -> Option<Duration> {
        let now = Instant::now();
        let expires_at = self.expires_at();
        (now >= expires_at).then(|| now - expires_at)
    }
}

impl std::fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("serial_number", &self.serial_number)
            .field("chain_len", &self.certified_key.cert.len())
            .field("lease", &self.lease)
            .field("expires_in", &self.expires_in())
            .finish()
    }
}

/// Result of one successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// The new record.
    pub record: Arc<CertificateRecord>,

    /// Lease duration as declared by the backend (zero if none).
    pub declared_lease: Duration,
}

impl IssuedCertificate {
    /// Wrap a checked key pair and the backend-declared lease in seconds.
    pub fn new(certified_key: Arc<CertifiedKey>, lease_seconds: u64) -> Result<Self> {
        let declared_lease = Duration::from_secs(lease_seconds);
        let record = CertificateRecord::new(certified_key, declared_lease)?;
        Ok(Self {
            record: Arc::new(record),
            declared_lease,
        })
    }
}

fn format_serial(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
