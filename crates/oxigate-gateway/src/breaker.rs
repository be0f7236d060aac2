//! Per-provider circuit breaker.
//!
//! Tracks consecutive failures per provider and gates access through the
//! usual Closed → Open → HalfOpen cycle. All transitions happen under one
//! mutex, so concurrent requests observe them atomically — in particular,
//! only one caller can ever win the half-open trial slot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use oxigate_core::config::BreakerConfig;

/// What the breaker says about calling a provider right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed: call freely.
    Allowed,
    /// Circuit half-open: this caller holds the single trial slot and must
    /// resolve it via `record_success`, `record_failure`, or
    /// `cancel_trial`.
    Trial,
    /// Circuit open: skip this provider without calling it.
    Rejected,
}

#[derive(Clone, Copy, Debug)]
enum CircuitState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { trial_taken: bool },
}

/// Breaker registry covering every provider.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    circuits: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        CircuitBreaker {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// May this provider be called right now?
    pub fn admit(&self, provider: &str) -> Admission {
        self.admit_at(provider, Instant::now())
    }

    fn admit_at(&self, provider: &str, now: Instant) -> Admission {
        let mut circuits = self.lock();
        let state = circuits
            .entry(provider.to_string())
            .or_insert(CircuitState::Closed { failures: 0 });

        match *state {
            CircuitState::Closed { .. } => Admission::Allowed,
            CircuitState::Open { since } => {
                if now.duration_since(since) >= self.cooldown {
                    info!(provider, "Circuit half-open, admitting trial call");
                    *state = CircuitState::HalfOpen { trial_taken: true };
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen { trial_taken: false } => {
                *state = CircuitState::HalfOpen { trial_taken: true };
                Admission::Trial
            }
            // Another request already holds the trial slot.
            CircuitState::HalfOpen { trial_taken: true } => Admission::Rejected,
        }
    }

    /// Report a successful call. Closes a half-open circuit and clears the
    /// consecutive-failure counter. A success landing while the circuit is
    /// open (a call admitted before it tripped) leaves it open — the
    /// cool-down still applies.
    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock();
        if let Some(state) = circuits.get_mut(provider) {
            match *state {
                CircuitState::Closed { .. } => *state = CircuitState::Closed { failures: 0 },
                CircuitState::HalfOpen { .. } => {
                    info!(provider, "Trial call succeeded, closing circuit");
                    *state = CircuitState::Closed { failures: 0 };
                }
                CircuitState::Open { .. } => {}
            }
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self, provider: &str) {
        self.record_failure_at(provider, Instant::now());
    }

    fn record_failure_at(&self, provider: &str, now: Instant) {
        let mut circuits = self.lock();
        let state = circuits
            .entry(provider.to_string())
            .or_insert(CircuitState::Closed { failures: 0 });

        match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    warn!(provider, failures, "Failure threshold reached, opening circuit");
                    *state = CircuitState::Open { since: now };
                } else {
                    debug!(provider, failures, "Consecutive failure recorded");
                    *state = CircuitState::Closed { failures };
                }
            }
            CircuitState::HalfOpen { .. } => {
                warn!(provider, "Trial call failed, reopening circuit");
                *state = CircuitState::Open { since: now };
            }
            // Stale failure from a call admitted before the circuit opened.
            CircuitState::Open { .. } => {}
        }
    }

    /// Return an unused trial slot (the holder never called the provider,
    /// e.g. its budget reservation was rejected).
    pub fn cancel_trial(&self, provider: &str) {
        let mut circuits = self.lock();
        if let Some(state) = circuits.get_mut(provider) {
            if let CircuitState::HalfOpen { trial_taken: true } = *state {
                *state = CircuitState::HalfOpen { trial_taken: false };
            }
        }
    }

    /// Human-readable state for status output.
    pub fn state_label(&self, provider: &str) -> &'static str {
        let circuits = self.lock();
        match circuits.get(provider) {
            None | Some(CircuitState::Closed { .. }) => "closed",
            Some(CircuitState::Open { .. }) => "open",
            Some(CircuitState::HalfOpen { .. }) => "half-open",
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitState>> {
        // Breaker state stays coherent even if a holder panicked.
        self.circuits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
