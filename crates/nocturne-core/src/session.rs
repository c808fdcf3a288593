//! Explicit, per-conversation view over the state store.
//!
//! A [`StateHandle`] names the session and recipient it works on and is
//! passed down the call chain. Session-scoped dimensions are keyed by the
//! session id, trust by the recipient id.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::backend::StateBackend;
use crate::bands::{ArcPhase, DriftSeverity, EntropyState, ThresholdTable, TrustLevel};
use crate::constants::{ENTROPY_TURN_STEP, MOMENTUM_GAIN};
use crate::dimension::{DimensionKey, EntityScope, StateDimension};
use crate::error::BackendResult;
use crate::evolution::{advance_dimension, engagement_multiplier, session_trust_delta};

/// What one user turn tells us about the conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnSignal {
    /// 1.0 is neutral; clamped to the engagement floor and ceiling.
    pub engagement: f64,
    /// Measured voice drift of the last generated reply, if any.
    pub drift_observed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub entropy: StateDimension,
    pub momentum: StateDimension,
    pub drift: StateDimension,
}

/// Every dimension, decayed to a point in time, with its band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub entropy: f64,
    pub entropy_state: EntropyState,
    pub momentum: f64,
    pub arc_phase: ArcPhase,
    pub drift: f64,
    pub drift_severity: DriftSeverity,
    pub trust: f64,
    pub trust_level: TrustLevel,
}

#[derive(Clone)]
pub struct StateHandle {
    backend: Arc<dyn StateBackend>,
    session_id: String,
    recipient_id: String,
}

impl StateHandle {
    pub fn new(backend: Arc<dyn StateBackend>, session_id: &str, recipient_id: &str) -> Self {
        Self {
            backend,
            session_id: session_id.to_string(),
            recipient_id: recipient_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn backend(&self) -> &dyn StateBackend {
        self.backend.as_ref()
    }

    fn entity_for(&self, key: DimensionKey) -> &str {
        match key.scope() {
            EntityScope::Session => &self.session_id,
            EntityScope::Recipient => &self.recipient_id,
        }
    }

    /// The stored record without time applied, if one was ever written.
    pub fn stored(&self, key: DimensionKey) -> BackendResult<Option<StateDimension>> {
        self.backend.get_dimension(self.entity_for(key), key)
    }

    /// The dimension as of `now`: decay applied, nothing written.
    pub fn load(&self, key: DimensionKey, now: u64) -> BackendResult<StateDimension> {
        Ok(match self.stored(key)? {
            Some(dim) => advance_dimension(&dim, now, 0.0),
            None => StateDimension::fresh(self.entity_for(key), key, now),
        })
    }

    pub fn current(&self, key: DimensionKey, now: u64) -> BackendResult<f64> {
        Ok(self.load(key, now)?.value)
    }

    /// Read, advance by `delta`, write back. Creates the dimension on first use.
    pub fn apply(&self, key: DimensionKey, delta: f64, now: u64) -> BackendResult<StateDimension> {
        let current = self.load(key, now)?;
        let next = advance_dimension(&current, now, delta);
        self.backend.put_dimension(&next)?;
        Ok(next)
    }

    /// Evolve the session dimensions after one user turn. Entropy always
    /// creeps up by a jittered step; momentum follows engagement; drift moves
    /// toward the observed value.
    pub fn record_turn(
        &self,
        signal: &TurnSignal,
        now: u64,
        rng: &mut impl Rng,
    ) -> BackendResult<TurnOutcome> {
        let entropy_delta = ENTROPY_TURN_STEP * rng.random_range(0.5..1.5);
        let entropy = self.apply(DimensionKey::Entropy, entropy_delta, now)?;

        let momentum_delta = (engagement_multiplier(signal.engagement) - 1.0) * MOMENTUM_GAIN;
        let momentum = self.apply(DimensionKey::Momentum, momentum_delta, now)?;

        let drift = match signal.drift_observed {
            Some(observed) => {
                let current = self.current(DimensionKey::Drift, now)?;
                self.apply(DimensionKey::Drift, observed - current, now)?
            }
            None => self.apply(DimensionKey::Drift, 0.0, now)?,
        };

        tracing::debug!(
            session = %self.session_id,
            entropy = entropy.value,
            momentum = momentum.value,
            drift = drift.value,
            "turn recorded"
        );

        Ok(TurnOutcome {
            entropy,
            momentum,
            drift,
        })
    }

    /// Credit the recipient with one finished session.
    pub fn close_session(&self, engagement: f64, now: u64) -> BackendResult<StateDimension> {
        self.apply(DimensionKey::Trust, session_trust_delta(engagement), now)
    }

    pub fn snapshot(
        &self,
        now: u64,
        drift_table: &ThresholdTable<DriftSeverity>,
    ) -> BackendResult<StateSnapshot> {
        let entropy = self.current(DimensionKey::Entropy, now)?;
        let momentum = self.current(DimensionKey::Momentum, now)?;
        let drift = self.current(DimensionKey::Drift, now)?;
        let trust = self.current(DimensionKey::Trust, now)?;
        Ok(StateSnapshot {
            entropy,
            entropy_state: EntropyState::classify(entropy),
            momentum,
            arc_phase: ArcPhase::classify(momentum),
            drift,
            drift_severity: drift_table.classify(drift),
            trust,
            trust_level: TrustLevel::classify(trust),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::constants::{DEFAULT_DRIFT_WARNING, TRUST_SESSION_DELTA};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    const T0: u64 = 1_771_632_000;

    fn handle() -> StateHandle {
        StateHandle::new(Arc::new(MemoryBackend::new()), "session-1", "ana")
    }

    #[test]
    fn test_unwritten_dimension_reads_default() {
        let h = handle();
        assert_eq!(h.current(DimensionKey::Entropy, T0).unwrap(), 0.0);
        assert!(h.stored(DimensionKey::Entropy).unwrap().is_none());
    }

    #[test]
    fn test_apply_creates_and_persists() {
        let h = handle();
        let dim = h.apply(DimensionKey::Entropy, 0.1, T0).unwrap();
        assert_relative_eq!(dim.value, 0.1);
        assert_eq!(dim.entity_id, "session-1");
        let stored = h.stored(DimensionKey::Entropy).unwrap().unwrap();
        assert_relative_eq!(stored.value, 0.1);
    }

    #[test]
    fn test_trust_keyed_by_recipient() {
        let backend: Arc<dyn StateBackend> = Arc::new(MemoryBackend::new());
        let first = StateHandle::new(backend.clone(), "s1", "ana");
        first.close_session(1.0, T0).unwrap();
        let second = StateHandle::new(backend, "s2", "ana");
        assert_relative_eq!(
            second.current(DimensionKey::Trust, T0).unwrap(),
            TRUST_SESSION_DELTA
        );
        assert_eq!(second.current(DimensionKey::Entropy, T0).unwrap(), 0.0);
    }

    #[test]
    fn test_read_applies_decay_without_writing() {
        let h = handle();
        h.apply(DimensionKey::Momentum, 0.3, T0).unwrap();
        let later = h.current(DimensionKey::Momentum, T0 + 4 * 3600).unwrap();
        assert_relative_eq!(later, 0.3 * (-1.0f64).exp(), epsilon = 1e-12);
        let stored = h.stored(DimensionKey::Momentum).unwrap().unwrap();
        assert_relative_eq!(stored.value, 0.3);
        assert_eq!(stored.last_updated, T0);
    }

    #[test]
    fn test_record_turn_moves_all_session_dimensions() {
        let h = handle();
        let mut rng = SmallRng::seed_from_u64(42);
        let out = h
            .record_turn(
                &TurnSignal {
                    engagement: 2.0,
                    drift_observed: Some(0.2),
                },
                T0,
                &mut rng,
            )
            .unwrap();
        assert!(out.entropy.value >= ENTROPY_TURN_STEP * 0.5);
        assert!(out.entropy.value <= ENTROPY_TURN_STEP * 1.5);
        assert_relative_eq!(out.momentum.value, MOMENTUM_GAIN, epsilon = 1e-12);
        assert_relative_eq!(out.drift.value, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_drift_observation_bounded_by_max_step() {
        let h = handle();
        let mut rng = SmallRng::seed_from_u64(7);
        let out = h
            .record_turn(
                &TurnSignal {
                    engagement: 1.0,
                    drift_observed: Some(0.9),
                },
                T0,
                &mut rng,
            )
            .unwrap();
        assert_relative_eq!(out.drift.value, DimensionKey::Drift.spec().max_step);
    }

    #[test]
    fn test_snapshot_labels() {
        let h = handle();
        for _ in 0..3 {
            h.apply(DimensionKey::Momentum, 0.3, T0).unwrap();
        }
        let table = DriftSeverity::table(DEFAULT_DRIFT_WARNING).unwrap();
        let snap = h.snapshot(T0, &table).unwrap();
        assert_eq!(snap.arc_phase, ArcPhase::Impact);
        assert_eq!(snap.entropy_state, EntropyState::Stable);
        assert_eq!(snap.trust_level, TrustLevel::Stranger);
        assert_eq!(snap.drift_severity, DriftSeverity::Stable);
    }
}
