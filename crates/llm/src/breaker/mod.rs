//! Per-provider circuit breaker.
//!
//! Three states per provider id: closed (normal), open (short-circuiting),
//! half_open (single serialized probe). Transitions follow the classic
//! breaker state machine; see `CircuitState::on_success`/`on_failure`.

use std::sync::Arc;

use config::CircuitBreakerConfig;
use dashmap::DashMap;

use crate::error::LlmError;

/// Millisecond timestamp source, injected so tests can control elapsed time
/// without sleeping.
pub(crate) trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

/// State for a single provider's breaker.
#[derive(Debug, Clone)]
struct CircuitState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: u64,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: 0,
        }
    }
}

/// Pluggable breaker state backend. The default is process-local via
/// `dashmap`; an external-storage implementation could share breaker state
/// across instances, but none is required in this scope.
pub(crate) trait BreakerStore: Send + Sync {
    fn get(&self, provider: &str) -> Option<CircuitStateSnapshot>;
    fn set(&self, provider: &str, state: CircuitStateSnapshot);
}

/// Serializable view of a breaker's state, exposed outside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CircuitStateSnapshot {
    pub phase: BreakerPhase,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub opened_at: u64,
}

impl From<&CircuitState> for CircuitStateSnapshot {
    fn from(state: &CircuitState) -> Self {
        Self {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            opened_at: state.opened_at,
        }
    }
}

pub(crate) struct DashMapBreakerStore {
    states: DashMap<String, CircuitState>,
}

impl DashMapBreakerStore {
    pub(crate) fn new() -> Self {
        Self { states: DashMap::new() }
    }
}

impl BreakerStore for DashMapBreakerStore {
    fn get(&self, provider: &str) -> Option<CircuitStateSnapshot> {
        self.states.get(provider).map(|entry| CircuitStateSnapshot::from(&*entry))
    }

    fn set(&self, provider: &str, snapshot: CircuitStateSnapshot) {
        self.states.insert(
            provider.to_string(),
            CircuitState {
                phase: snapshot.phase,
                consecutive_failures: snapshot.consecutive_failures,
                consecutive_successes: snapshot.consecutive_successes,
                opened_at: snapshot.opened_at,
            },
        );
    }
}

/// Registry of circuit breakers, one per provider id, with per-provider
/// configurable thresholds. Reads and writes for a single provider id are
/// atomic with respect to each other (the `dashmap` entry API), but this is
/// an optimization, not a correctness requirement across instances.
pub(crate) struct BreakerRegistry {
    store: Arc<dyn BreakerStore>,
    clock: Arc<dyn Clock>,
}

/// Identifier reserved for the router's own upstream RPC breaker, distinct
/// from any configured provider id.
pub(crate) const ROUTER_BREAKER_ID: &str = "router";

impl BreakerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            store: Arc::new(DashMapBreakerStore::new()),
            clock: Arc::new(SystemClock),
        }
    }

    #[cfg(test)]
    fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(DashMapBreakerStore::new()),
            clock,
        }
    }

    /// Check whether a call to `provider` is currently allowed. Transitions
    /// an open breaker to half-open once `reset_after_ms` has elapsed.
    pub(crate) fn allow(&self, provider: &str, config: &CircuitBreakerConfig) -> Result<(), LlmError> {
        let mut state = self.store.get(provider).unwrap_or(CircuitStateSnapshot {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: 0,
        });

        match state.phase {
            BreakerPhase::Closed => Ok(()),
            BreakerPhase::HalfOpen => Ok(()),
            BreakerPhase::Open => {
                let now = self.clock.now_ms();
                if now.saturating_sub(state.opened_at) >= config.reset_after_ms {
                    state.phase = BreakerPhase::HalfOpen;
                    state.consecutive_successes = 0;
                    self.store.set(provider, state);
                    Ok(())
                } else {
                    Err(LlmError::CircuitOpen {
                        provider: provider.to_string(),
                    })
                }
            }
        }
    }

    /// Record a successful call outcome.
    pub(crate) fn on_success(&self, provider: &str, config: &CircuitBreakerConfig) {
        let mut state = self.current(provider);

        match state.phase {
            BreakerPhase::Closed => {
                state.consecutive_failures = 0;
            }
            BreakerPhase::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= config.success_threshold {
                    state.phase = BreakerPhase::Closed;
                    state.consecutive_failures = 0;
                    state.consecutive_successes = 0;
                }
            }
            BreakerPhase::Open => {}
        }

        self.store.set(provider, state);
    }

    /// Record a failed call outcome. Only call this for errors that
    /// `LlmError::triggers_breaker()` reports as breaker-worthy.
    pub(crate) fn on_failure(&self, provider: &str, config: &CircuitBreakerConfig) {
        let mut state = self.current(provider);

        match state.phase {
            BreakerPhase::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= config.failure_threshold {
                    state.phase = BreakerPhase::Open;
                    state.opened_at = self.clock.now_ms();
                }
            }
            BreakerPhase::HalfOpen => {
                state.phase = BreakerPhase::Open;
                state.opened_at = self.clock.now_ms();
                state.consecutive_successes = 0;
            }
            BreakerPhase::Open => {}
        }

        self.store.set(provider, state);
    }

    fn current(&self, provider: &str) -> CircuitStateSnapshot {
        self.store.get(provider).unwrap_or(CircuitStateSnapshot {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: 0,
        })
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeClock(AtomicU64);

    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_after_ms: 1_000,
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let registry = BreakerRegistry::new();
        let cfg = config();

        for _ in 0..2 {
            registry.on_failure("openai", &cfg);
            assert!(registry.allow("openai", &cfg).is_ok());
        }

        registry.on_failure("openai", &cfg);
        assert!(matches!(registry.allow("openai", &cfg), Err(LlmError::CircuitOpen { .. })));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let registry = BreakerRegistry::with_clock(clock.clone());
        let cfg = config();

        for _ in 0..3 {
            registry.on_failure("openai", &cfg);
        }
        assert!(registry.allow("openai", &cfg).is_err());

        clock.0.store(1_000, Ordering::SeqCst);
        assert!(registry.allow("openai", &cfg).is_ok());

        registry.on_success("openai", &cfg);
        assert!(registry.allow("openai", &cfg).is_ok());

        registry.on_success("openai", &cfg);
        // Closed now; a single failure no longer trips it immediately.
        registry.on_failure("openai", &cfg);
        assert!(registry.allow("openai", &cfg).is_ok());
    }

    #[test]
    fn half_open_failure_reopens() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let registry = BreakerRegistry::with_clock(clock.clone());
        let cfg = config();

        for _ in 0..3 {
            registry.on_failure("openai", &cfg);
        }

        clock.0.store(1_000, Ordering::SeqCst);
        assert!(registry.allow("openai", &cfg).is_ok());

        registry.on_failure("openai", &cfg);
        assert!(matches!(registry.allow("openai", &cfg), Err(LlmError::CircuitOpen { .. })));
    }

    #[test]
    fn independent_providers_do_not_share_state() {
        let registry = BreakerRegistry::new();
        let cfg = config();

        for _ in 0..3 {
            registry.on_failure("openai", &cfg);
        }

        assert!(registry.allow("openai", &cfg).is_err());
        assert!(registry.allow("anthropic", &cfg).is_ok());
    }
}
