use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::warn;

use crate::error::GateError;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_good: Option<Value>,
}

/// Keyed circuit breaker for non-gating stages.
///
/// One counter per scope (stage name), never a shared global. On reaching
/// the threshold the scope trips: subsequent failing calls are substituted
/// with the last known good snapshot instead of propagating. One success
/// resets the scope to zero. Safe under concurrent workflows — all state
/// sits behind one mutex and every operation is a single read-modify-write.
pub struct CircuitBreaker {
    threshold: u32,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Consecutive failure count for a scope.
    pub fn failures(&self, scope: &str) -> Result<u32, GateError> {
        let states = self.states.lock().map_err(|_| GateError::Lock)?;
        Ok(states
            .get(scope)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0))
    }

    /// Whether the scope has reached the failure threshold.
    pub fn is_tripped(&self, scope: &str) -> Result<bool, GateError> {
        Ok(self.failures(scope)? >= self.threshold)
    }

    /// Last snapshot captured from a successful run, if any.
    pub fn last_good(&self, scope: &str) -> Result<Option<Value>, GateError> {
        let states = self.states.lock().map_err(|_| GateError::Lock)?;
        Ok(states.get(scope).and_then(|s| s.last_good.clone()))
    }

    /// Reset the scope counter and remember the latest good snapshot.
    pub fn record_success(&self, scope: &str, snapshot: Option<Value>) -> Result<(), GateError> {
        let mut states = self.states.lock().map_err(|_| GateError::Lock)?;
        let state = states.entry(scope.to_string()).or_default();
        state.consecutive_failures = 0;
        if snapshot.is_some() {
            state.last_good = snapshot;
        }
        Ok(())
    }

    /// Count one failure, returning the new consecutive total.
    pub fn record_failure(&self, scope: &str) -> Result<u32, GateError> {
        let mut states = self.states.lock().map_err(|_| GateError::Lock)?;
        let state = states.entry(scope.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures == self.threshold {
            warn!(
                scope,
                failures = state.consecutive_failures,
                "circuit breaker tripped"
            );
        }
        Ok(state.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_per_scope() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure("research").unwrap();
        breaker.record_failure("research").unwrap();
        assert_eq!(breaker.failures("research").unwrap(), 2);
        assert_eq!(breaker.failures("writer").unwrap(), 0);
    }

    #[test]
    fn trips_at_threshold() {
        let breaker = CircuitBreaker::new(3);
        for _ in 0..3 {
            breaker.record_failure("writer").unwrap();
        }
        assert!(breaker.is_tripped("writer").unwrap());
        assert!(!breaker.is_tripped("research").unwrap());
    }

    #[test]
    fn one_success_resets() {
        let breaker = CircuitBreaker::new(3);
        for _ in 0..5 {
            breaker.record_failure("writer").unwrap();
        }
        breaker
            .record_success("writer", Some(serde_json::json!({"ok": true})))
            .unwrap();
        assert_eq!(breaker.failures("writer").unwrap(), 0);
        assert!(!breaker.is_tripped("writer").unwrap());
    }

    #[test]
    fn success_without_snapshot_keeps_previous_snapshot() {
        let breaker = CircuitBreaker::new(3);
        breaker
            .record_success("writer", Some(serde_json::json!({"v": 1})))
            .unwrap();
        breaker.record_success("writer", None).unwrap();
        assert_eq!(
            breaker.last_good("writer").unwrap(),
            Some(serde_json::json!({"v": 1}))
        );
    }
}
