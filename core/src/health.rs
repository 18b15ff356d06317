//! Per-provider health score and circuit breaker (spec §3 `ProviderHealth`
//! / `CircuitState`, §4.3).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(60);
const EMA_SMOOTHING: f64 = 0.2;
const AUTH_FAILURE_SCORE_PENALTY: f64 = 40.0;

/// Three-state circuit gate (spec §3 `CircuitState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Circuit {
    Closed,
    Open,
    /// A single probe is currently in flight; other requests must see
    /// this provider as effectively `Open` (spec §4.3).
    HalfOpenProbing,
    HalfOpen,
}

/// Mutable per-(chain, provider) record (spec §3 `ProviderHealth`).
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub score: f64,
    pub ema_latency_ms: f64,
    pub consecutive_failures: u64,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    circuit: Circuit,
    opened_at: Option<Instant>,
    failure_threshold: u64,
    open_duration: Duration,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            score: 100.0,
            ema_latency_ms: 0.0,
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            circuit: Circuit::Closed,
            opened_at: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_duration: DEFAULT_OPEN_DURATION,
        }
    }
}

impl ProviderHealth {
    pub fn record_success(&mut self, latency_ms: f64) {
        self.total_requests += 1;
        self.total_successes += 1;
        self.score = (self.score + 1.0).min(100.0);
        self.ema_latency_ms = if self.total_successes <= 1 {
            latency_ms
        } else {
            EMA_SMOOTHING * latency_ms + (1.0 - EMA_SMOOTHING) * self.ema_latency_ms
        };
        self.consecutive_failures = 0;
        self.last_success = Some(Instant::now());

        match self.circuit {
            Circuit::HalfOpenProbing | Circuit::HalfOpen => {
                self.circuit = Circuit::Closed;
                self.opened_at = None;
            }
            _ => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.score = (self.score - 10.0).max(0.0);
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());

        match self.circuit {
            Circuit::HalfOpenProbing | Circuit::HalfOpen => {
                self.circuit = Circuit::Open;
                self.opened_at = Some(Instant::now());
            }
            Circuit::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.circuit = Circuit::Open;
                self.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Like [`ProviderHealth::record_failure`] but for 401/403 responses
    /// (spec §7 "heavily penalized"): a steeper score drop and a full
    /// failure-threshold bump toward `Open`, without unconditionally
    /// tripping the circuit — an auth error is not an automatic
    /// blacklist.
    pub fn record_auth_failure(&mut self) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.score = (self.score - AUTH_FAILURE_SCORE_PENALTY).max(0.0);
        self.consecutive_failures = self.consecutive_failures.saturating_add(self.failure_threshold);
        self.last_failure = Some(Instant::now());

        match self.circuit {
            Circuit::HalfOpenProbing | Circuit::HalfOpen => {
                self.circuit = Circuit::Open;
                self.opened_at = Some(Instant::now());
            }
            Circuit::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.circuit = Circuit::Open;
                self.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Current circuit state, advancing Open -> HalfOpen if the cooldown
    /// has elapsed. Does not itself admit a probe; call
    /// [`ProviderHealth::try_begin_probe`] for that.
    pub fn circuit_state(&mut self) -> Circuit {
        if self.circuit == Circuit::Open {
            if let Some(opened_at) = self.opened_at {
                if opened_at.elapsed() >= self.open_duration {
                    self.circuit = Circuit::HalfOpen;
                }
            }
        }
        self.circuit
    }

    /// Admit exactly one in-flight probe while half-open; returns `false`
    /// (provider stays effectively `Open` to other callers) if a probe is
    /// already in flight.
    pub fn try_begin_probe(&mut self) -> bool {
        if self.circuit_state() == Circuit::HalfOpen {
            self.circuit = Circuit::HalfOpenProbing;
            true
        } else {
            false
        }
    }

    pub fn is_admissible(&mut self) -> bool {
        matches!(self.circuit_state(), Circuit::Closed | Circuit::HalfOpen)
    }
}

/// Health/circuit state keyed by `(chain, provider)`, shared across
/// concurrent streaming calls. Guarded by a single `RwLock` with short,
/// non-suspending critical sections — no `.await` is ever held across the
/// lock (spec §5).
#[derive(Default)]
pub struct HealthRegistry {
    entries: RwLock<HashMap<(String, String), ProviderHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(chain: &str, provider: &str) -> (String, String) {
        (chain.to_string(), provider.to_string())
    }

    pub fn record_success(&self, chain: &str, provider: &str, latency_ms: f64) {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .entry(Self::key(chain, provider))
            .or_default()
            .record_success(latency_ms);
    }

    pub fn record_failure(&self, chain: &str, provider: &str) {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .entry(Self::key(chain, provider))
            .or_default()
            .record_failure();
    }

    pub fn record_auth_failure(&self, chain: &str, provider: &str) {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .entry(Self::key(chain, provider))
            .or_default()
            .record_auth_failure();
    }

    pub fn snapshot(&self, chain: &str, provider: &str) -> ProviderHealth {
        let guard = self.entries.read().expect("health lock poisoned");
        guard
            .get(&Self::key(chain, provider))
            .cloned()
            .unwrap_or_default()
    }

    pub fn circuit_state(&self, chain: &str, provider: &str) -> Circuit {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .entry(Self::key(chain, provider))
            .or_default()
            .circuit_state()
    }

    pub fn try_begin_probe(&self, chain: &str, provider: &str) -> bool {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .entry(Self::key(chain, provider))
            .or_default()
            .try_begin_probe()
    }

    /// `getHealth(chain)` (spec §6).
    pub fn health_for_chain(&self, chain: &str) -> HashMap<String, ProviderHealth> {
        let guard = self.entries.read().expect("health lock poisoned");
        guard
            .iter()
            .filter(|((c, _), _)| c == chain)
            .map(|((_, name), health)| (name.clone(), health.clone()))
            .collect()
    }

    /// `getCircuitStates(chain)` (spec §6).
    pub fn circuits_for_chain(&self, chain: &str) -> HashMap<String, Circuit> {
        let mut guard = self.entries.write().expect("health lock poisoned");
        guard
            .iter_mut()
            .filter(|((c, _), _)| c == chain)
            .map(|((_, name), health)| (name.clone(), health.circuit_state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_with_score_100() {
        let h = ProviderHealth::default();
        assert_eq!(h.score, 100.0);
        assert_eq!(h.circuit, Circuit::Closed);
    }

    #[test]
    fn success_increments_score_and_resets_failures() {
        let mut h = ProviderHealth::default();
        h.score = 50.0;
        h.consecutive_failures = 3;
        h.record_success(120.0);
        assert_eq!(h.score, 51.0);
        assert_eq!(h.consecutive_failures, 0);
    }

    #[test]
    fn failure_decrements_score_by_ten_floored_at_zero() {
        let mut h = ProviderHealth::default();
        for _ in 0..15 {
            h.record_failure();
        }
        assert_eq!(h.score, 0.0);
    }

    #[test]
    fn circuit_opens_after_threshold_consecutive_failures() {
        let mut h = ProviderHealth::default();
        for _ in 0..4 {
            h.record_failure();
            assert_eq!(h.circuit_state(), Circuit::Closed);
        }
        h.record_failure();
        assert_eq!(h.circuit_state(), Circuit::Open);
    }

    #[test]
    fn half_open_probe_admits_exactly_one() {
        let mut h = ProviderHealth::default();
        h.circuit = Circuit::Open;
        h.opened_at = Some(Instant::now() - Duration::from_secs(61));
        assert!(h.try_begin_probe());
        assert!(!h.try_begin_probe());
    }

    #[test]
    fn successful_probe_closes_circuit() {
        let mut h = ProviderHealth::default();
        h.circuit = Circuit::Open;
        h.opened_at = Some(Instant::now() - Duration::from_secs(61));
        assert!(h.try_begin_probe());
        h.record_success(10.0);
        assert_eq!(h.circuit_state(), Circuit::Closed);
    }

    #[test]
    fn failed_probe_reopens_and_restarts_timer() {
        let mut h = ProviderHealth::default();
        h.circuit = Circuit::Open;
        h.opened_at = Some(Instant::now() - Duration::from_secs(61));
        assert!(h.try_begin_probe());
        h.record_failure();
        assert_eq!(h.circuit_state(), Circuit::Open);
        assert!(h.opened_at.unwrap().elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn auth_failure_penalizes_harder_than_a_plain_failure() {
        let mut h = ProviderHealth::default();
        h.record_auth_failure();
        assert_eq!(h.score, 60.0);
        assert!(h.consecutive_failures >= DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(h.circuit_state(), Circuit::Open);
    }

    #[test]
    fn registry_keys_by_chain_and_provider_independently() {
        let reg = HealthRegistry::new();
        for _ in 0..5 {
            reg.record_failure("bitcoin", "mempool");
        }
        assert_eq!(reg.circuit_state("bitcoin", "mempool"), Circuit::Open);
        assert_eq!(reg.circuit_state("bitcoin", "blockstream"), Circuit::Closed);
        assert_eq!(reg.circuit_state("ethereum", "mempool"), Circuit::Closed);
    }
}
