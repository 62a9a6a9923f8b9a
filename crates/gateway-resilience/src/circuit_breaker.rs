//! Circuit breaker pattern implementation.
//!
//! One breaker guards each provider. It counts consecutive failures, rejects
//! calls outright while open, and admits a bounded number of probes once the
//! cooldown has elapsed. A failed probe reopens the breaker with the cooldown
//! doubled, up to a ceiling.

use dashmap::DashMap;
use gateway_core::GatewayError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is half-open, testing if the provider recovered
    HalfOpen = 1,
    /// Circuit is open, requests are rejected
    Open = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::HalfOpen,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl CircuitState {
    /// Wire name of the state
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Initial time to wait before probing
    pub cooldown: Duration,
    /// Ceiling for the doubled cooldown
    pub max_cooldown: Duration,
    /// Concurrent probes admitted while half-open
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
            half_open_max_probes: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    cooldown: Duration,
    probes_in_flight: u32,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

/// Circuit breaker for a single provider
pub struct CircuitBreaker {
    /// Provider identifier
    provider_id: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Published state for lock-free reads
    state: AtomicU8,
    /// Counters and transitions, scoped to this provider
    inner: Mutex<BreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider_id", &self.provider_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let cooldown = config.cooldown;
        Self {
            provider_id: provider_id.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                last_failure_at: None,
                cooldown,
                probes_in_flight: 0,
                total_successes: 0,
                total_failures: 0,
                total_rejections: 0,
            }),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(provider_id: impl Into<String>) -> Self {
        Self::new(provider_id, CircuitBreakerConfig::default())
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the last recorded state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// State as the next caller would see it.
    ///
    /// An open breaker whose cooldown has elapsed reports `HalfOpen`.
    #[must_use]
    pub fn effective_state(&self) -> CircuitState {
        match self.state() {
            CircuitState::Open => {
                let inner = self.inner.lock();
                if Self::cooldown_elapsed(&inner, Instant::now()) {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            state => state,
        }
    }

    /// Ask to send one request through the breaker.
    ///
    /// The returned permit must be settled with [`BreakerPermit::success`] or
    /// [`BreakerPermit::failure`]. A probe permit dropped unsettled frees its
    /// slot without affecting the state.
    ///
    /// # Errors
    /// Returns `GatewayError::CircuitOpen` if the circuit is open or every
    /// probe slot is taken
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, GatewayError> {
        if self.state() == CircuitState::Closed {
            return Ok(BreakerPermit::new(self, false));
        }

        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            if Self::cooldown_elapsed(&inner, now) {
                self.transition_to_half_open(&mut inner);
            } else {
                inner.total_rejections += 1;
                return Err(GatewayError::circuit_open(&self.provider_id));
            }
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_max_probes {
                    inner.probes_in_flight += 1;
                    debug!(
                        provider = %self.provider_id,
                        in_flight = inner.probes_in_flight,
                        "Circuit breaker admitted probe"
                    );
                    Ok(BreakerPermit::new(self, true))
                } else {
                    inner.total_rejections += 1;
                    Err(GatewayError::circuit_open(&self.provider_id))
                }
            }
            CircuitState::Open => {
                inner.total_rejections += 1;
                Err(GatewayError::circuit_open(&self.provider_id))
            }
        }
    }

    fn cooldown_elapsed(inner: &BreakerInner, now: Instant) -> bool {
        inner
            .opened_at
            .is_some_and(|opened_at| now.saturating_duration_since(opened_at) >= inner.cooldown)
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if probe => self.transition_to_closed(&mut inner),
            // Late outcome from a call admitted before the breaker tripped
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.last_failure_at = Some(now);

        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    debug!(
                        provider = %self.provider_id,
                        failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure threshold reached"
                    );
                    inner.cooldown = self.config.cooldown;
                    self.transition_to_open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen if probe => {
                let doubled = inner.cooldown.saturating_mul(2);
                inner.cooldown = doubled.min(self.config.max_cooldown);
                self.transition_to_open(&mut inner, now);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
    }

    fn publish(&self, inner: &mut BreakerInner, state: CircuitState) {
        inner.state = state;
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition_to_open(&self, inner: &mut BreakerInner, now: Instant) {
        inner.opened_at = Some(now);
        self.publish(inner, CircuitState::Open);

        warn!(
            provider = %self.provider_id,
            cooldown_ms = inner.cooldown.as_millis() as u64,
            "Circuit breaker opened"
        );
    }

    fn transition_to_half_open(&self, inner: &mut BreakerInner) {
        inner.probes_in_flight = 0;
        self.publish(inner, CircuitState::HalfOpen);

        info!(
            provider = %self.provider_id,
            "Circuit breaker half-open, testing"
        );
    }

    fn transition_to_closed(&self, inner: &mut BreakerInner) {
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probes_in_flight = 0;
        inner.cooldown = self.config.cooldown;
        self.publish(inner, CircuitState::Closed);

        info!(
            provider = %self.provider_id,
            "Circuit breaker closed"
        );
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition_to_closed(&mut inner);
    }

    /// Force the circuit open (for testing or manual intervention)
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.cooldown = self.config.cooldown;
        self.transition_to_open(&mut inner, Instant::now());
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            probes_in_flight: inner.probes_in_flight,
            cooldown: inner.cooldown,
            last_failure_at: inner.last_failure_at,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }
}

/// Admission ticket for one call through a breaker
#[derive(Debug)]
#[must_use = "a permit must be settled with success() or failure()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// Whether this call is a half-open probe
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report the call as successful
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    /// Report the call as failed
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Probes currently admitted
    pub probes_in_flight: u32,
    /// Cooldown applied on the current or next opening
    pub cooldown: Duration,
    /// Most recent failure
    pub last_failure_at: Option<Instant>,
    /// Successes recorded
    pub total_successes: u64,
    /// Failures recorded
    pub total_failures: u64,
    /// Calls rejected without reaching the provider
    pub total_rejections: u64,
}

impl CircuitBreakerStats {
    /// Calculate failure rate over all settled calls
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_successes + self.total_failures;
        if total == 0 {
            0.0
        } else {
            self.total_failures as f64 / total as f64
        }
    }
}

/// One breaker per provider, created on first use
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for a provider, creating it closed if unseen
    #[must_use]
    pub fn get_or_create(&self, provider_id: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(provider_id) {
            return Arc::clone(breaker.value());
        }
        Arc::clone(
            self.breakers
                .entry(provider_id.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(provider_id, self.config.clone()))
                })
                .value(),
        )
    }

    /// Breaker for a provider, if one exists
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(provider_id).map(|b| Arc::clone(b.value()))
    }

    /// Effective state of a provider; unseen providers are closed
    #[must_use]
    pub fn effective_state(&self, provider_id: &str) -> CircuitState {
        self.get(provider_id)
            .map_or(CircuitState::Closed, |b| b.effective_state())
    }

    /// Effective state of every known breaker, sorted by provider
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|b| Arc::clone(b.value())).collect();
        let mut states: Vec<(String, CircuitState)> = breakers
            .iter()
            .map(|b| (b.provider_id().to_string(), b.effective_state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
