//! Pure next-value functions for state dimensions.
//!
//! Decay-type dimensions relax exponentially toward zero with elapsed time;
//! increment-type dimensions only move through events. Either way a single
//! event is bounded by the dimension's `max_step`, and the result is always
//! inside `[min, max]` no matter what came in.

use crate::constants::{ENGAGEMENT_CEILING, ENGAGEMENT_FLOOR, TRUST_SESSION_DELTA};
use crate::dimension::{DimensionKind, DimensionSpec, StateDimension};
use crate::time::elapsed_hours;

/// Next value of a dimension after `elapsed_hours` and an event `delta`.
pub fn advance(spec: &DimensionSpec, value: f64, elapsed_hours: f64, delta: f64) -> f64 {
    let value = spec.clamp(value);
    let hours = if elapsed_hours.is_finite() && elapsed_hours > 0.0 {
        elapsed_hours
    } else {
        0.0
    };

    let relaxed = match spec.kind {
        DimensionKind::Decay { rate_per_hour } => value * (-rate_per_hour * hours).exp(),
        DimensionKind::Increment => value,
    };

    spec.clamp(relaxed + spec.bound_delta(delta))
}

/// Advance a stored dimension to `now`, applying `delta`, and restamp it.
pub fn advance_dimension(dim: &StateDimension, now: u64, delta: f64) -> StateDimension {
    let spec = dim.key.spec();
    StateDimension {
        entity_id: dim.entity_id.clone(),
        key: dim.key,
        value: advance(spec, dim.value, elapsed_hours(dim.last_updated, now), delta),
        last_updated: now.max(dim.last_updated),
    }
}

/// Engagement clamped to the multiplier floor and ceiling; NaN is neutral.
pub fn engagement_multiplier(engagement: f64) -> f64 {
    if engagement.is_finite() {
        engagement.clamp(ENGAGEMENT_FLOOR, ENGAGEMENT_CEILING)
    } else {
        1.0
    }
}

/// Trust gained by closing one session.
pub fn session_trust_delta(engagement: f64) -> f64 {
    TRUST_SESSION_DELTA * engagement_multiplier(engagement)
}
