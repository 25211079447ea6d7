//! Token renewal coordinator
//!
//! Extends the session token shortly before it expires. Many concurrent
//! requests may ask for a renewal at once; exactly one of them wins a
//! compare-and-swap on the in-flight flag and performs the call, the rest
//! return immediately without waiting.
//!
//! State machine:
//! - Idle → Pending: the caller that wins the CAS on `in_flight`
//! - Pending → Idle: unconditionally, when the winner's guard is dropped
//!
//! Attempts are spaced by a cooldown measured from the moment an attempt
//! starts, so a failing endpoint is hit at most once per cooldown window.
//! The cooldown runs on a monotonic clock; wall-clock time is only compared
//! against the token's expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsdesk_core::SessionStore;
use partsdesk_core::expiry::remaining_lifetime;
use partsdesk_core::lenient;
use partsdesk_observability::Metrics;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::api::TOKEN_EXPIRES_HEADER;
use crate::routes::DEFAULT_RENEWAL_PATH;
use crate::{ClientError, Result};

/// Renewal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Evaluate renewal on authenticated requests
    pub enabled: bool,

    /// Renew when the remaining lifetime drops below this many seconds
    pub threshold_secs: u64,

    /// Minimum spacing between two attempts, in seconds
    pub cooldown_secs: u64,

    /// Renewal endpoint path, relative to the API base URL
    pub path: String,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_secs: 5 * 60,
            cooldown_secs: 10 * 60,
            path: DEFAULT_RENEWAL_PATH.to_string(),
        }
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Wall-clock time, compared against token expiries
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time, used to space renewal attempts
    fn instant(&self) -> Instant;
}

/// `Utc::now` and the tokio monotonic clock, which follows
/// `tokio::time::pause` in tests
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
///
/// [`ManualClock::advance`] moves both readings. [`ManualClock::set`] moves
/// only the wall clock, like a user changing the device time.
#[derive(Debug)]
pub struct ManualClock {
    wall_ms: AtomicI64,
    origin: Instant,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            wall_ms: AtomicI64::new(now.timestamp_millis()),
            origin: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.wall_ms.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move time forward; negative durations only move the wall clock
    pub fn advance(&self, by: chrono::Duration) {
        self.wall_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        if let Ok(ms) = u64::try_from(by.num_milliseconds()) {
            self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.wall_ms.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    fn instant(&self) -> Instant {
        self.origin + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

/// Credentials returned by the renewal endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewedCredentials {
    /// Rotated token, when the backend issues a new one
    pub token: Option<String>,
    /// New expiry timestamp
    pub expires_at: Option<String>,
}

/// The call that actually extends a token
#[async_trait]
pub trait RenewalEndpoint: Send + Sync {
    /// Renew `token`.
    ///
    /// Must return [`ClientError::SessionEnded`] when the backend rejects the
    /// token's authorization; any other error is treated as transient.
    async fn renew(&self, token: &str) -> Result<RenewedCredentials>;
}

/// Why a renewal check did not call the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoToken,
    NotDue,
    CoolingDown,
    InFlight,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::NoToken => "no_token",
            SkipReason::NotDue => "not_due",
            SkipReason::CoolingDown => "cooling_down",
            SkipReason::InFlight => "in_flight",
        }
    }
}

/// Result of one renewal check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    Skipped(SkipReason),
    /// The endpoint succeeded and the store was updated
    Renewed,
    /// The endpoint rejected the token; the session was cleared
    SessionCleared,
    /// The endpoint failed; the session is untouched
    Failed,
    /// The session changed while the call was running; the result was dropped
    Discarded,
}

impl RenewalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalOutcome::Skipped(reason) => reason.as_str(),
            RenewalOutcome::Renewed => "renewed",
            RenewalOutcome::SessionCleared => "session_cleared",
            RenewalOutcome::Failed => "failed",
            RenewalOutcome::Discarded => "discarded",
        }
    }

    /// Whether the endpoint was called
    pub fn attempted(&self) -> bool {
        !matches!(self, RenewalOutcome::Skipped(_))
    }
}

/// Start of the last renewal attempt
#[derive(Debug, Clone, Copy)]
struct Attempt {
    started: Instant,
    wall: DateTime<Utc>,
}

/// Shared renewal state
#[derive(Debug, Default)]
pub struct RenewalState {
    in_flight: AtomicBool,
    /// `None` when never attempted or after a reset
    last_attempt: Mutex<Option<Attempt>>,
}

impl RenewalState {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wall-clock time of the last attempt start
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt().map(|attempt| attempt.wall)
    }

    fn last_attempt(&self) -> Option<Attempt> {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_last_attempt(&self, attempt: Option<Attempt>) {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = attempt;
    }

    fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { state: self })
    }
}

/// Releases the in-flight flag on every exit path
struct InFlightGuard<'a> {
    state: &'a RenewalState,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}

pub struct TokenRenewalCoordinator {
    store: Arc<dyn SessionStore>,
    endpoint: Arc<dyn RenewalEndpoint>,
    config: RenewalConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Metrics>,
    state: RenewalState,
}

impl std::fmt::Debug for TokenRenewalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRenewalCoordinator")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TokenRenewalCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        endpoint: Arc<dyn RenewalEndpoint>,
        config: RenewalConfig,
    ) -> Self {
        Self {
            store,
            endpoint,
            config,
            clock: Arc::new(SystemClock),
            metrics: None,
            state: RenewalState::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    pub fn state(&self) -> &RenewalState {
        &self.state
    }

    /// Whether the stored token expires within the renewal threshold.
    ///
    /// False without a token or when the expiry cannot be parsed.
    pub fn needs_extension(&self) -> bool {
        if self.store.token().is_none() {
            return false;
        }
        let Some(expires_at) = self.store.expiry() else {
            return false;
        };
        let Some(remaining) = remaining_lifetime(&expires_at, self.clock.now()) else {
            debug!(expires_at = %expires_at, "Unparseable token expiry, not renewing");
            return false;
        };
        remaining < self.threshold()
    }

    /// Evaluate the gate without claiming the in-flight slot
    pub fn should_attempt(&self) -> std::result::Result<(), SkipReason> {
        if !self.config.enabled {
            return Err(SkipReason::Disabled);
        }
        if self.store.token().is_none() {
            return Err(SkipReason::NoToken);
        }
        if !self.needs_extension() {
            return Err(SkipReason::NotDue);
        }
        if self.cooling_down() {
            return Err(SkipReason::CoolingDown);
        }
        if self.state.is_in_flight() {
            return Err(SkipReason::InFlight);
        }
        Ok(())
    }

    /// Renew the token if it is due.
    ///
    /// Never fails: endpoint errors are logged and reported as
    /// [`RenewalOutcome::Failed`].
    #[instrument(skip(self))]
    pub async fn extend_if_needed(&self) -> RenewalOutcome {
        let outcome = self.run_once().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_renewal(outcome.as_str());
        }
        outcome
    }

    /// Run a renewal check on a spawned task.
    ///
    /// Returns `None` without spawning when the gate already fails. Once
    /// spawned the check runs to completion even if the triggering request is
    /// dropped.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<RenewalOutcome>> {
        if let Err(reason) = self.should_attempt() {
            debug!(reason = reason.as_str(), "Renewal not triggered");
            return None;
        }
        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move { coordinator.extend_if_needed().await }))
    }

    /// Forget the last attempt so the next check is not throttled.
    ///
    /// Called after login and logout. A renewal already running keeps its
    /// in-flight slot until it finishes.
    pub fn reset(&self) {
        self.state.set_last_attempt(None);
    }

    async fn run_once(&self) -> RenewalOutcome {
        if let Err(reason) = self.should_attempt() {
            return RenewalOutcome::Skipped(reason);
        }

        let Some(_guard) = self.state.try_acquire() else {
            return RenewalOutcome::Skipped(SkipReason::InFlight);
        };

        // Another caller may have finished an attempt between the gate and the CAS
        if self.cooling_down() {
            return RenewalOutcome::Skipped(SkipReason::CoolingDown);
        }
        let Some(token) = self.store.token() else {
            return RenewalOutcome::Skipped(SkipReason::NoToken);
        };

        self.state.set_last_attempt(Some(Attempt {
            started: self.clock.instant(),
            wall: self.clock.now(),
        }));

        debug!("Renewing session token");
        match self.endpoint.renew(&token).await {
            Ok(renewed) => self.apply(&token, renewed),
            Err(ClientError::SessionEnded) => {
                if self.store.token().as_deref() != Some(token.as_str()) {
                    return RenewalOutcome::Discarded;
                }
                warn!("Renewal rejected, clearing session");
                if let Err(e) = self.store.clear_session() {
                    warn!(error = %e, "Failed to clear session after renewal rejection");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_session_clear("renewal_rejected");
                }
                self.reset();
                RenewalOutcome::SessionCleared
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed");
                RenewalOutcome::Failed
            }
        }
    }

    fn apply(&self, sent_token: &str, renewed: RenewedCredentials) -> RenewalOutcome {
        if self.store.token().as_deref() != Some(sent_token) {
            info!("Session changed during renewal, discarding result");
            return RenewalOutcome::Discarded;
        }

        let token = renewed.token.as_deref().filter(|t| !t.trim().is_empty());
        let expires_at = renewed.expires_at.as_deref();
        if token.is_none() && expires_at.is_none() {
            warn!("Renewal response carried neither token nor expiry");
            return RenewalOutcome::Failed;
        }

        match self.store.update_credentials(token, expires_at) {
            Ok(()) => {
                info!(
                    rotated = token.is_some(),
                    expires_at = expires_at.unwrap_or_default(),
                    "Session token renewed"
                );
                RenewalOutcome::Renewed
            }
            Err(e) => {
                warn!(error = %e, "Failed to store renewed credentials");
                RenewalOutcome::Failed
            }
        }
    }

    fn threshold(&self) -> chrono::Duration {
        i64::try_from(self.config.threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    fn cooling_down(&self) -> bool {
        let Some(last) = self.state.last_attempt() else {
            return false;
        };
        let elapsed = self.clock.instant().saturating_duration_since(last.started);
        elapsed < Duration::from_secs(self.config.cooldown_secs)
    }
}

/// Renewal over HTTP: `POST {base_url}{path}` with the current bearer token
#[derive(Debug, Clone)]
pub struct HttpRenewalEndpoint {
    client: Client,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct RenewalBody {
    #[serde(default, alias = "accessToken", deserialize_with = "lenient::string")]
    token: Option<String>,

    #[serde(
        default,
        rename = "expiresAt",
        alias = "expires_at",
        deserialize_with = "lenient::string"
    )]
    expires_at: Option<String>,
}

impl HttpRenewalEndpoint {
    pub fn new(client: Client, base_url: &str, path: &str) -> Self {
        Self {
            client,
            url: join_url(base_url, path),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RenewalEndpoint for HttpRenewalEndpoint {
    #[instrument(skip(self, token), fields(url = %self.url))]
    async fn renew(&self, token: &str) -> Result<RenewedCredentials> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::SessionEnded);
        }

        let header_expiry = response
            .headers()
            .get(TOKEN_EXPIRES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status_code: status.as_u16(),
                message: text,
            });
        }

        let body = parse_renewal_body(&text);
        Ok(RenewedCredentials {
            token: body.token.filter(|t| !t.trim().is_empty()),
            expires_at: body.expires_at.or(header_expiry),
        })
    }
}

/// Read the renewal body, looking one level into a `data` wrapper
fn parse_renewal_body(text: &str) -> RenewalBody {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        if !text.trim().is_empty() {
            debug!("Renewal response is not JSON, relying on headers");
        }
        return RenewalBody::default();
    };

    let body: RenewalBody = serde_json::from_value(value.clone()).unwrap_or_default();
    if body.token.is_some() || body.expires_at.is_some() {
        return body;
    }
    value
        .get("data")
        .and_then(|inner| serde_json::from_value(inner.clone()).ok())
        .unwrap_or_default()
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests;
