//! Circuit breaker for remote storage calls
//!
//! Fault-tolerance state machine wrapping an arbitrary asynchronous
//! operation. Failures within a trailing monitoring window open the circuit;
//! open circuits fail fast until a recovery timeout elapses, then a limited
//! probe phase decides whether to close again.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Operations proceed normally.
    Closed,
    /// Operations are rejected without being attempted.
    Open,
    /// A limited number of probe requests are allowed through.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within the monitoring window before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing a probe.
    pub recovery_timeout: Duration,
    /// How long the probe phase may run before reverting to open.
    pub half_open_timeout: Duration,
    /// Consecutive probe successes required to close the circuit.
    pub success_threshold: u32,
    /// Trailing window over which failures are counted.
    pub monitoring_period: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_timeout: Duration::from_secs(30),
            success_threshold: 3,
            monitoring_period: Duration::from_secs(300),
            name: "storage".to_string(),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Timestamps of every call attempt, pruned to the monitoring window.
    window: VecDeque<Instant>,
    /// Timestamps of failures, pruned to the monitoring window. A success in
    /// the closed state removes the oldest entry (gradual forgiveness, not a
    /// hard reset).
    failures: VecDeque<Instant>,
    /// Consecutive successes while half-open.
    success_count: u32,
    last_failure: Option<Instant>,
    /// When an open circuit next permits a probe.
    next_attempt: Option<Instant>,
    half_open_since: Option<Instant>,
}

/// Outcome of asking the breaker whether a call may proceed.
enum Admission {
    /// Circuit closed, normal call.
    Normal,
    /// Circuit was open or half-open; this call is a probe.
    Probe,
}

/// Circuit breaker guarding one class of storage operations.
///
/// Created once at composition time and shared by handle; all state lives
/// behind a single mutex that is never held across an await.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!(name = %config.name, "created circuit breaker");
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                failures: VecDeque::new(),
                success_count: 0,
                last_failure: None,
                next_attempt: None,
                half_open_since: None,
            }),
        }
    }

    /// Current state, after applying time-based transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.apply_time_transitions(&mut inner, Instant::now());
        inner.state
    }

    /// Failures currently inside the monitoring window.
    pub fn failure_count(&self) -> u32 {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner, Instant::now(), self.config.monitoring_period);
        inner.failures.len() as u32
    }

    /// Run `operation` under breaker protection.
    ///
    /// Rejected calls return [`StorageError::CircuitOpen`] without the
    /// operation being attempted.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _admission = self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Run `operation`, degrading to `fallback` when the circuit is open.
    ///
    /// The fallback is invoked when the call is rejected outright, or when a
    /// probe attempted after the recovery timeout fails. If the fallback
    /// itself fails, the original operation error is returned (or
    /// `CircuitOpen` when the operation was never attempted).
    pub async fn execute_with_fallback<F, Fut, G, Fut2, T>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> Fut2,
        Fut2: Future<Output = Result<T>>,
    {
        let admission = match self.try_acquire() {
            Ok(admission) => admission,
            Err(open_err) => {
                return match fallback().await {
                    Ok(value) => Ok(value),
                    Err(_) => Err(open_err),
                };
            }
        };

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(original) => {
                self.record_failure();
                if matches!(admission, Admission::Probe) {
                    match fallback().await {
                        Ok(value) => Ok(value),
                        Err(_) => Err(original),
                    }
                } else {
                    Err(original)
                }
            }
        }
    }

    /// Decide whether a call may proceed, applying state transitions.
    fn try_acquire(&self) -> Result<Admission> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.apply_time_transitions(&mut inner, now);
        inner.window.push_back(now);

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen => Ok(Admission::Probe),
            CircuitState::Open => {
                debug!(name = %self.config.name, "rejecting call, circuit open");
                Err(StorageError::CircuitOpen(self.config.name.clone()))
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                // Gradual forgiveness: one success discharges one failure.
                inner.failures.pop_front();
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                debug!(
                    name = %self.config.name,
                    successes = inner.success_count,
                    required = self.config.success_threshold,
                    "probe succeeded"
                );
                if inner.success_count >= self.config.success_threshold {
                    info!(name = %self.config.name, "circuit closing after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.success_count = 0;
                    inner.next_attempt = None;
                    inner.half_open_since = None;
                }
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late.
                inner.failures.pop_front();
            }
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::prune(&mut inner, now, self.config.monitoring_period);
        inner.failures.push_back(now);
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::Closed => {
                debug!(
                    name = %self.config.name,
                    failures = inner.failures.len(),
                    threshold = self.config.failure_threshold,
                    "failure recorded"
                );
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        name = %self.config.name,
                        failures = inner.failures.len(),
                        "circuit opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.next_attempt = Some(now + self.config.recovery_timeout);
                }
            }
            CircuitState::HalfOpen => {
                // No tolerance while probing.
                warn!(name = %self.config.name, "probe failed, circuit reopening");
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.next_attempt = Some(now + self.config.recovery_timeout);
                inner.half_open_since = None;
            }
            CircuitState::Open => {}
        }
    }

    /// Transitions that depend only on elapsed time.
    fn apply_time_transitions(&self, inner: &mut BreakerInner, now: Instant) {
        Self::prune(inner, now, self.config.monitoring_period);

        match inner.state {
            CircuitState::Open => {
                if inner.next_attempt.is_some_and(|at| now >= at) {
                    info!(name = %self.config.name, "recovery timeout elapsed, circuit half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.half_open_since = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                // A probe phase that never completes its successes reverts
                // to open after the half-open timeout.
                if inner
                    .half_open_since
                    .is_some_and(|since| now.duration_since(since) > self.config.half_open_timeout)
                {
                    warn!(name = %self.config.name, "half-open phase timed out, circuit reopening");
                    inner.state = CircuitState::Open;
                    inner.success_count = 0;
                    inner.next_attempt = Some(now + self.config.recovery_timeout);
                    inner.half_open_since = None;
                }
            }
            CircuitState::Closed => {}
        }
    }

    fn prune(inner: &mut BreakerInner, now: Instant, period: Duration) {
        while inner
            .window
            .front()
            .is_some_and(|t| now.duration_since(*t) > period)
        {
            inner.window.pop_front();
        }
        while inner
            .failures
            .front()
            .is_some_and(|t| now.duration_since(*t) > period)
        {
            inner.failures.pop_front();
        }
    }
}
