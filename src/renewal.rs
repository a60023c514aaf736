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

//! Self-renewing certificate provider.
//!
//! [`CertProvider`] issues a certificate when it is constructed, hands it to
//! the TLS layer through a lock-free accessor, and re-issues it in a
//! background task after a fraction of each lease has elapsed.
//!
//! # Scheduling
//!
//! - After every successful issuance the next attempt is armed for
//!   `floor(lease_seconds × renew_modifier)` seconds.
//! - After a failed attempt, while the cached certificate is still valid, the
//!   next attempt is armed for exactly `retry_delay`.
//! - A failed attempt after the cached certificate has expired is handled
//!   according to [`ExhaustionPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use vault_autocert::{CertProvider, VaultPkiConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VaultPkiConfig::builder()
//!     .address("https://vault.example.com:8200")?
//!     .token("s.xxxxxxxx")
//!     .role("web")
//!     .common_name("svc.example.com")
//!     .renew_modifier(0.5)
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! let provider = CertProvider::new(&config, cancel.clone()).await?;
//!
//! // Hand the provider to rustls
//! let server_config = provider.server_config()?;
//! # let _ = server_config;
//!
//! // Later: stop renewing
//! cancel.cancel();
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{Issuer, VaultPkiClient};
use crate::config::VaultPkiConfig;
use crate::error::{AutocertError, Result};
use crate::tls::build_server_config;
use crate::types::{CertificateRecord, IssuedCertificate};

/// Default fraction of the lease after which renewal is attempted.
pub const DEFAULT_RENEW_MODIFIER: f64 = 0.95;

/// Default delay between failed renewal attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// What to do when renewal has not succeeded by the time the cached
/// certificate expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Log and abort the process.
    #[default]
    Abort,

    /// Keep the process alive: the accessor reports
    /// [`AutocertError::Expired`] and renewal keeps retrying every
    /// `retry_delay` until it succeeds.
    ReportExpired,
}

impl ExhaustionPolicy {
    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Some(Self::Abort),
            "report-expired" | "report_expired" | "report" => Some(Self::ReportExpired),
            _ => None,
        }
    }

    /// Get the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::ReportExpired => "report-expired",
        }
    }
}

/// Renewal scheduling policy.
#[derive(Clone)]
pub struct RenewalPolicy {
    /// Fraction of the lease, in (0, 1], after which renewal is attempted.
    pub renew_modifier: f64,

    /// Fixed delay between failed renewal attempts.
    pub retry_delay: Duration,

    /// Behavior once the cached certificate expires without a renewal.
    pub on_exhausted: ExhaustionPolicy,

    /// Optional callback for renewal events.
    pub event_handler: Option<Arc<dyn RenewalEventHandler>>,
}

impl std::fmt::Debug for RenewalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalPolicy")
            .field("renew_modifier", &self.renew_modifier)
            .field("retry_delay", &self.retry_delay)
            .field("on_exhausted", &self.on_exhausted)
            .field("event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            renew_modifier: DEFAULT_RENEW_MODIFIER,
            retry_delay: DEFAULT_RETRY_DELAY,
            on_exhausted: ExhaustionPolicy::Abort,
            event_handler: None,
        }
    }
}

impl RenewalPolicy {
    /// Create a new renewal policy builder.
    pub fn builder() -> RenewalPolicyBuilder {
        RenewalPolicyBuilder::default()
    }

    /// Check the policy values.
    pub fn validate(&self) -> Result<()> {
        if !(self.renew_modifier > 0.0 && self.renew_modifier <= 1.0) {
            return Err(AutocertError::config(format!(
                "renew_modifier must be in (0, 1], got {}",
                self.renew_modifier
            )));
        }
        if self.retry_delay.is_zero() {
            return Err(AutocertError::config("retry_delay must be greater than zero"));
        }
        Ok(())
    }

    /// Time until the next renewal for a certificate with the given lease.
    ///
    /// Whole seconds: `floor(lease_seconds × renew_modifier)`. The product is
    /// rounded to nine decimals first so `100 × 0.29` yields 29, not 28.
    pub fn next_renewal(&self, lease: Duration) -> Duration {
        let product = lease.as_secs() as f64 * self.renew_modifier;
        let secs = ((product * 1e9).round() / 1e9).floor();
        Duration::from_secs(secs as u64)
    }

    fn emit(&self, event: RenewalEvent) {
        if let Some(ref handler) = self.event_handler {
            handler.handle_event(event);
        }
    }
}

/// Builder for [`RenewalPolicy`].
#[derive(Default)]
pub struct RenewalPolicyBuilder {
    renew_modifier: Option<f64>,
    retry_delay: Option<Duration>,
    on_exhausted: Option<ExhaustionPolicy>,
    event_handler: Option<Arc<dyn RenewalEventHandler>>,
}

impl RenewalPolicyBuilder {
    /// Set the renew modifier.
    pub fn renew_modifier(mut self, modifier: f64) -> Self {
        self.renew_modifier = Some(modifier);
        self
    }

    /// Set the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the exhaustion policy.
    pub fn on_exhausted(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = Some(policy);
        self
    }

    /// Set the event callback handler.
    pub fn event_handler(mut self, handler: Arc<dyn RenewalEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the renewal policy.
    pub fn build(self) -> RenewalPolicy {
        let default = RenewalPolicy::default();
        RenewalPolicy {
            renew_modifier: self.renew_modifier.unwrap_or(default.renew_modifier),
            retry_delay: self.retry_delay.unwrap_or(default.retry_delay),
            on_exhausted: self.on_exhausted.unwrap_or(default.on_exhausted),
            event_handler: self.event_handler.or(default.event_handler),
        }
    }
}

/// Events emitted by the renewal task.
#[derive(Debug, Clone)]
pub enum RenewalEvent {
    /// A certificate was issued and installed.
    Issued {
        /// Serial number of the new certificate.
        serial_number: String,
        /// Effective lease of the new certificate.
        lease: Duration,
        /// Time until the next renewal attempt.
        next_renewal: Duration,
    },

    /// A renewal attempt failed while the cached certificate is still valid.
    RenewalFailed {
        /// Error that occurred.
        error: String,
        /// Time until the next attempt.
        retry_in: Duration,
        /// Remaining validity of the cached certificate.
        expires_in: Duration,
    },

    /// A renewal attempt failed after the cached certificate expired.
    Exhausted {
        /// Error that occurred.
        error: String,
        /// Time elapsed since expiry.
        expired_for: Duration,
    },

    /// The renewal task stopped after cancellation.
    Stopped,
}

/// Handler for renewal events.
///
/// Implement this trait to receive notifications about renewal events.
/// Closures taking a [`RenewalEvent`] implement it directly.
pub trait RenewalEventHandler: Send + Sync {
    /// Handle a renewal event.
    fn handle_event(&self, event: RenewalEvent);
}

impl<F> RenewalEventHandler for F
where
    F: Fn(RenewalEvent) + Send + Sync,
{
    fn handle_event(&self, event: RenewalEvent) {
        self(event)
    }
}

/// Lifecycle state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// Serving a valid certificate and renewing on schedule.
    Active,

    /// Renewal did not succeed before expiry; still retrying
    /// ([`ExhaustionPolicy::ReportExpired`] only).
    Expired,

    /// The renewal task exited after cancellation.
    Stopped,
}

impl ProviderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Expired,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Expired => 1,
            Self::Stopped => 2,
        }
    }
}

/// State shared between the renewal task and readers.
struct Shared {
    current: ArcSwapOption<CertificateRecord>,
    state: AtomicU8,
}

impl Shared {
    fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            state: AtomicU8::new(ProviderState::Active.as_u8()),
        }
    }

    fn load(&self) -> Result<Arc<CertificateRecord>> {
        let record = self.current.load_full().ok_or(AutocertError::NotLoaded)?;
        if let Some(elapsed) = record.expired_for() {
            return Err(AutocertError::Expired { elapsed });
        }
        Ok(record)
    }

    fn state(&self) -> ProviderState {
        ProviderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ProviderState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// A certificate supplier that renews itself in the background.
///
/// Construction performs the initial issuance; once it returns, a valid
/// certificate is always available through [`get_certificate`](Self::get_certificate)
/// until the owning cancellation token is cancelled or renewal is exhausted.
///
/// Dropping the provider stops the renewal task without waiting for it.
/// Resolvers obtained from it keep serving the last certificate until that
/// certificate expires. Use [`shutdown`](Self::shutdown) to wait for the task.
pub struct CertProvider {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for CertProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertProvider")
            .field("state", &self.shared.state())
            .field("current", &self.shared.current.load_full())
            .finish()
    }
}

impl CertProvider {
    /// Create a provider backed by Vault.
    ///
    /// Issues the initial certificate before returning and starts the
    /// renewal task bound to `cancel`.
    ///
    /// # Errors
    ///
    /// Returns the configuration or issuance error; no task is started.
    pub async fn new(config: &VaultPkiConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        let client = VaultPkiClient::new(config)?;
        Self::with_issuer(client, config.renewal.clone(), cancel).await
    }

    /// Create a provider backed by any [`Issuer`].
    ///
    /// # Errors
    ///
    /// Returns the policy or issuance error; no task is started.
    pub async fn with_issuer<I: Issuer>(
        issuer: I,
        policy: RenewalPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        policy.validate()?;

        let shared = Arc::new(Shared::new());
        let issued = issuer.issue().await?;
        let first_renewal = install(&shared, &policy, issued);

        let cancel = cancel.child_token();
        let task = tokio::spawn(run_renewal(
            issuer,
            Arc::clone(&shared),
            policy,
            cancel.clone(),
            first_renewal,
        ));

        Ok(Self {
            shared,
            cancel,
            task,
        })
    }

    /// The current certificate.
    ///
    /// Never blocks and never performs I/O.
    ///
    /// # Errors
    ///
    /// [`AutocertError::NotLoaded`] if nothing was ever installed, or
    /// [`AutocertError::Expired`] once the cached certificate is past expiry.
    pub fn get_certificate(&self) -> Result<Arc<CertificateRecord>> {
        self.shared.load()
    }

    /// A rustls certificate resolver reading from this provider.
    ///
    /// The resolver outlives the provider, but once the provider is dropped
    /// nothing renews the record it serves.
    pub fn resolver(&self) -> Arc<CertResolver> {
        Arc::new(CertResolver {
            shared: Arc::clone(&self.shared),
        })
    }

    /// A rustls server configuration that presents this provider's
    /// certificate on every handshake.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        build_server_config(self.resolver())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProviderState {
        self.shared.state()
    }

    /// Returns true once the renewal task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop renewing and wait for the renewal task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Renewal task ended abnormally");
        }
    }
}

impl Drop for CertProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Certificate resolver for rustls servers.
///
/// Returns the provider's current certificate for every handshake, or no
/// certificate (failing the handshake) when none is servable.
pub struct CertResolver {
    shared: Arc<Shared>,
}

impl CertResolver {
    /// The current certificate, as [`CertProvider::get_certificate`].
    pub fn get_certificate(&self) -> Result<Arc<CertificateRecord>> {
        self.shared.load()
    }
}

impl std::fmt::Debug for CertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertResolver")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        match self.shared.load() {
            Ok(record) => Some(Arc::clone(record.certified_key())),
            Err(e) => {
                warn!(error = %e, "No certificate available for handshake");
                None
            }
        }
    }
}

/// Install a freshly issued certificate and return the time until the next renewal.
fn install(shared: &Shared, policy: &RenewalPolicy, issued: IssuedCertificate) -> Duration {
    let record = issued.record;
    let next_renewal = policy.next_renewal(record.lease());

    if issued.declared_lease.is_zero() {
        debug!(
            lease_secs = record.lease().as_secs(),
            "No lease from Vault, using certificate notAfter"
        );
    }

    info!(
        serial = %record.serial_number(),
        lease_secs = record.lease().as_secs(),
        next_renewal_secs = next_renewal.as_secs(),
        "Certificate installed"
    );

    let serial_number = record.serial_number().to_string();
    let lease = record.lease();

    shared.current.store(Some(record));
    shared.set_state(ProviderState::Active);

    policy.emit(RenewalEvent::Issued {
        serial_number,
        lease,
        next_renewal,
    });

    next_renewal
}

/// Renewal loop: one instance per provider.
async fn run_renewal<I: Issuer>(
    issuer: I,
    shared: Arc<Shared>,
    policy: RenewalPolicy,
    cancel: CancellationToken,
    first_renewal: Duration,
) {
    debug!(next_renewal_secs = first_renewal.as_secs(), "Renewal task started");

    let timer = sleep(first_renewal);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut timer => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = issuer.issue() => outcome,
        };

        let next = match outcome {
            Ok(issued) => install(&shared, &policy, issued),
            Err(e) => handle_failure(&shared, &policy, e),
        };

        timer.as_mut().reset(Instant::now() + next);
    }

    shared.set_state(ProviderState::Stopped);
    info!("Certificate renewal stopped");
    policy.emit(RenewalEvent::Stopped);
}

/// Decide what follows a failed renewal attempt; returns the retry delay.
fn handle_failure(shared: &Shared, policy: &RenewalPolicy, err: AutocertError) -> Duration {
    let current = shared.current.load_full();
    let expired_for = current
        .as_ref()
        .map_or(Some(Duration::ZERO), |record| record.expired_for());

    let Some(expired_for) = expired_for else {
        let expires_in = current.map(|r| r.expires_in()).unwrap_or_default();
        warn!(
            error = %err,
            retry_in_secs = policy.retry_delay.as_secs(),
            expires_in_secs = expires_in.as_secs(),
            "Certificate renewal failed, retrying"
        );
        policy.emit(RenewalEvent::RenewalFailed {
            error: err.to_string(),
            retry_in: policy.retry_delay,
            expires_in,
        });
        return policy.retry_delay;
    };

    error!(
        error = %err,
        expired_secs = expired_for.as_secs(),
        policy = policy.on_exhausted.as_str(),
        "Certificate expired before renewal succeeded"
    );
    policy.emit(RenewalEvent::Exhausted {
        error: err.to_string(),
        expired_for,
    });

    match policy.on_exhausted {
        ExhaustionPolicy::Abort => std::process::abort(),
        ExhaustionPolicy::ReportExpired => {
            shared.set_state(ProviderState::Expired);
            policy.retry_delay
        }
    }
}
