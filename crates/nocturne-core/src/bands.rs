//! Ordered threshold tables mapping a continuous value to a named band.
//!
//! Bands are half-open `[lower, next_lower)` and the last band is unbounded
//! above. A value sitting exactly on a boundary belongs to the higher band.
//! Classification is a plain linear scan with no randomness, so the same
//! value always yields the same label. The narrative arc is reclassified
//! from momentum on every read, which means a large momentum jump moves the
//! arc straight past intermediate phases.

use std::fmt::Debug;
use std::sync::LazyLock;

use serde::Serialize;

use crate::constants::{DRIFT_CRITICAL_OFFSET, DRIFT_STABLE_CEILING};
use crate::error::ConfigError;

/// A discrete band label with a stable string form.
pub trait BandLabel: Copy + Eq + Debug {
    fn as_str(self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Band<L> {
    pub lower: f64,
    pub label: L,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable<L> {
    bands: Vec<Band<L>>,
}

impl<L: BandLabel> ThresholdTable<L> {
    /// Build a table from `(lower_bound, label)` pairs in ascending order.
    pub fn new(bands: &[(f64, L)]) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::MalformedBands("table has no bands".into()));
        }
        for (lower, label) in bands {
            if !lower.is_finite() {
                return Err(ConfigError::MalformedBands(format!(
                    "non-finite lower bound for {}",
                    label.as_str()
                )));
            }
        }
        for pair in bands.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(ConfigError::MalformedBands(format!(
                    "{} ({}) does not start above {} ({})",
                    pair[1].1.as_str(),
                    pair[1].0,
                    pair[0].1.as_str(),
                    pair[0].0
                )));
            }
        }
        Ok(Self {
            bands: bands
                .iter()
                .map(|&(lower, label)| Band { lower, label })
                .collect(),
        })
    }

    /// Ordinal of the band containing `value`. Values below the first bound
    /// and NaN land in band 0.
    pub fn band_index(&self, value: f64) -> usize {
        let mut idx = 0;
        for (i, band) in self.bands.iter().enumerate() {
            if value >= band.lower {
                idx = i;
            } else {
                break;
            }
        }
        idx
    }

    pub fn classify(&self, value: f64) -> L {
        self.bands[self.band_index(value)].label
    }

    pub fn bands(&self) -> &[Band<L>] {
        &self.bands
    }
}

// --- Entropy ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntropyState {
    Stable,
    Unsettled,
    Decaying,
    Fragmenting,
    Dissolving,
}

impl BandLabel for EntropyState {
    fn as_str(self) -> &'static str {
        match self {
            EntropyState::Stable => "stable",
            EntropyState::Unsettled => "unsettled",
            EntropyState::Decaying => "decaying",
            EntropyState::Fragmenting => "fragmenting",
            EntropyState::Dissolving => "dissolving",
        }
    }
}

const ENTROPY_BANDS: &[(f64, EntropyState)] = &[
    (0.0, EntropyState::Stable),
    (0.5, EntropyState::Unsettled),
    (0.7, EntropyState::Decaying),
    (0.8, EntropyState::Fragmenting),
    (0.9, EntropyState::Dissolving),
];

static ENTROPY_TABLE: LazyLock<ThresholdTable<EntropyState>> =
    LazyLock::new(|| ThresholdTable::new(ENTROPY_BANDS).expect("entropy bands are ascending"));

impl EntropyState {
    pub fn table() -> &'static ThresholdTable<EntropyState> {
        &ENTROPY_TABLE
    }

    pub fn classify(value: f64) -> Self {
        ENTROPY_TABLE.classify(value)
    }

    /// How many micro-events the entropy section asks the selector for.
    pub fn micro_event_count(self) -> usize {
        match self {
            EntropyState::Stable | EntropyState::Unsettled => 2,
            EntropyState::Decaying | EntropyState::Fragmenting => 3,
            EntropyState::Dissolving => 4,
        }
    }
}

// --- Narrative arc ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcPhase {
    Rising,
    Apex,
    Falling,
    Impact,
}

impl BandLabel for ArcPhase {
    fn as_str(self) -> &'static str {
        match self {
            ArcPhase::Rising => "rising",
            ArcPhase::Apex => "apex",
            ArcPhase::Falling => "falling",
            ArcPhase::Impact => "impact",
        }
    }
}

const ARC_BANDS: &[(f64, ArcPhase)] = &[
    (0.0, ArcPhase::Rising),
    (0.3, ArcPhase::Apex),
    (0.55, ArcPhase::Falling),
    (0.8, ArcPhase::Impact),
];

static ARC_TABLE: LazyLock<ThresholdTable<ArcPhase>> =
    LazyLock::new(|| ThresholdTable::new(ARC_BANDS).expect("arc bands are ascending"));

impl ArcPhase {
    pub fn table() -> &'static ThresholdTable<ArcPhase> {
        &ARC_TABLE
    }

    pub fn classify(momentum: f64) -> Self {
        ARC_TABLE.classify(momentum)
    }
}

// --- Drift severity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Stable,
    Minor,
    Warning,
    Critical,
}

impl BandLabel for DriftSeverity {
    fn as_str(self) -> &'static str {
        match self {
            DriftSeverity::Stable => "stable",
            DriftSeverity::Minor => "minor",
            DriftSeverity::Warning => "warning",
            DriftSeverity::Critical => "critical",
        }
    }
}

/// Smallest value strictly above the stable ceiling, so that drift of
/// exactly 0.1 still reads as stable.
const DRIFT_MINOR_FLOOR: f64 = f64::from_bits(DRIFT_STABLE_CEILING.to_bits() + 1);

impl DriftSeverity {
    /// Severity table for a configurable warning threshold. Critical starts a
    /// fixed offset above warning.
    pub fn table(warning: f64) -> Result<ThresholdTable<DriftSeverity>, ConfigError> {
        if !warning.is_finite() || warning <= DRIFT_MINOR_FLOOR {
            return Err(ConfigError::InvalidSetting(format!(
                "drift warning threshold {warning} must be above {DRIFT_STABLE_CEILING}"
            )));
        }
        if warning + DRIFT_CRITICAL_OFFSET > 1.0 {
            return Err(ConfigError::InvalidSetting(format!(
                "drift warning threshold {warning} leaves no room for critical"
            )));
        }
        ThresholdTable::new(&[
            (0.0, DriftSeverity::Stable),
            (DRIFT_MINOR_FLOOR, DriftSeverity::Minor),
            (warning, DriftSeverity::Warning),
            (warning + DRIFT_CRITICAL_OFFSET, DriftSeverity::Critical),
        ])
    }
}

// --- Trust ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Stranger,
    Acquaintance,
    Familiar,
    Confidant,
}

impl BandLabel for TrustLevel {
    fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Stranger => "stranger",
            TrustLevel::Acquaintance => "acquaintance",
            TrustLevel::Familiar => "familiar",
            TrustLevel::Confidant => "confidant",
        }
    }
}

const TRUST_BANDS: &[(f64, TrustLevel)] = &[
    (0.0, TrustLevel::Stranger),
    (0.25, TrustLevel::Acquaintance),
    (0.5, TrustLevel::Familiar),
    (0.8, TrustLevel::Confidant),
];

static TRUST_TABLE: LazyLock<ThresholdTable<TrustLevel>> =
    LazyLock::new(|| ThresholdTable::new(TRUST_BANDS).expect("trust bands are ascending"));

impl TrustLevel {
    pub fn table() -> &'static ThresholdTable<TrustLevel> {
        &TRUST_TABLE
    }

    pub fn classify(value: f64) -> Self {
        TRUST_TABLE.classify(value)
    }
}

/// Re-validate every fixed table. Called once at compiler construction so a
/// bad edit fails at startup instead of on first request.
pub fn validate_fixed_tables() -> Result<(), ConfigError> {
    ThresholdTable::new(ENTROPY_BANDS)?;
    ThresholdTable::new(ARC_BANDS)?;
    ThresholdTable::new(TRUST_BANDS)?;
    Ok(())
}
