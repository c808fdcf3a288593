//! The fixed set of scalar state dimensions and their persisted records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKey {
    /// Accumulated session disorder.
    Entropy,
    /// Engagement trajectory driving the narrative arc.
    Momentum,
    /// Deviation from the target voice.
    Drift,
    /// Relationship depth with a recipient.
    Trust,
}

impl DimensionKey {
    pub const ALL: [DimensionKey; 4] = [
        DimensionKey::Entropy,
        DimensionKey::Momentum,
        DimensionKey::Drift,
        DimensionKey::Trust,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DimensionKey::Entropy => "entropy",
            DimensionKey::Momentum => "momentum",
            DimensionKey::Drift => "drift",
            DimensionKey::Trust => "trust",
        }
    }

    /// Trust belongs to the recipient, everything else to the session.
    pub fn scope(self) -> EntityScope {
        match self {
            DimensionKey::Trust => EntityScope::Recipient,
            _ => EntityScope::Session,
        }
    }

    pub fn spec(self) -> &'static DimensionSpec {
        match self {
            DimensionKey::Entropy => &ENTROPY,
            DimensionKey::Momentum => &MOMENTUM,
            DimensionKey::Drift => &DRIFT,
            DimensionKey::Trust => &TRUST,
        }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimensionKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DimensionKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownDimension(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityScope {
    Session,
    Recipient,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimensionKind {
    /// Relaxes toward zero over time.
    Decay { rate_per_hour: f64 },
    /// Moves only through bounded event deltas.
    Increment,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionSpec {
    pub key: DimensionKey,
    pub kind: DimensionKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Largest magnitude a single event may move the value.
    pub max_step: f64,
}

impl DimensionSpec {
    /// Clamp into range; non-finite values collapse to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }

    pub fn bound_delta(&self, delta: f64) -> f64 {
        if delta.is_finite() {
            delta.clamp(-self.max_step, self.max_step)
        } else {
            0.0
        }
    }
}

static ENTROPY: DimensionSpec = DimensionSpec {
    key: DimensionKey::Entropy,
    kind: DimensionKind::Increment,
    min: 0.0,
    max: 1.0,
    default: 0.0,
    max_step: 0.15,
};

static MOMENTUM: DimensionSpec = DimensionSpec {
    key: DimensionKey::Momentum,
    kind: DimensionKind::Decay {
        rate_per_hour: 0.25,
    },
    min: 0.0,
    max: 1.0,
    default: 0.0,
    max_step: 0.35,
};

static DRIFT: DimensionSpec = DimensionSpec {
    key: DimensionKey::Drift,
    kind: DimensionKind::Decay { rate_per_hour: 0.5 },
    min: 0.0,
    max: 1.0,
    default: 0.0,
    max_step: 0.25,
};

static TRUST: DimensionSpec = DimensionSpec {
    key: DimensionKey::Trust,
    kind: DimensionKind::Increment,
    min: 0.0,
    max: 1.0,
    default: 0.0,
    max_step: 0.05,
};

/// One persisted scalar, keyed by (entity, dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDimension {
    pub entity_id: String,
    pub key: DimensionKey,
    pub value: f64,
    /// Unix seconds of the last write.
    pub last_updated: u64,
}

impl StateDimension {
    /// A never-written dimension: default value, stamped `now`.
    pub fn fresh(entity_id: &str, key: DimensionKey, now: u64) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            key,
            value: key.spec().default,
            last_updated: now,
        }
    }
}
