//! Content pool records and the built-in fallback pool.
//!
//! The fallback pool unlocks categories as the driving value (entropy)
//! crosses each category's thresholds. Every crossed threshold adds one to
//! that category's weight multiplier, so `decay` counts twice once entropy
//! is past both of its thresholds.

use crate::time::TimeOfDay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeScope {
    At(TimeOfDay),
    Any,
}

impl TimeScope {
    pub fn parse(tag: &str) -> Option<Self> {
        if tag == "*" {
            return Some(TimeScope::Any);
        }
        TimeOfDay::parse(tag).map(TimeScope::At)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeScope::At(tod) => tod.as_str(),
            TimeScope::Any => "*",
        }
    }

    pub fn matches(self, tod: TimeOfDay) -> bool {
        match self {
            TimeScope::Any => true,
            TimeScope::At(scope) => scope == tod,
        }
    }
}

/// One weighted template row from the backing pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub category: String,
    pub time_scope: TimeScope,
    pub min_value: f64,
    pub max_value: f64,
    pub weight: f64,
    pub template: String,
}

impl PoolEntry {
    /// Scope and value-range match for one selection.
    pub fn eligible(&self, tod: TimeOfDay, value: f64) -> bool {
        self.time_scope.matches(tod)
            && value >= self.min_value
            && value <= self.max_value
            && self.weight.is_finite()
            && self.weight > 0.0
    }
}

/// What the selector asks the backing pool for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolQuery {
    pub time_of_day: TimeOfDay,
    pub value: f64,
    pub limit: usize,
}

pub struct FallbackCategory {
    pub label: &'static str,
    /// Each threshold at or below the driving value adds one to the weight.
    pub unlocks: &'static [f64],
    pub fragments: &'static [&'static str],
}

impl FallbackCategory {
    pub fn multiplier(&self, value: f64) -> u32 {
        self.unlocks.iter().filter(|&&t| value >= t).count() as u32
    }
}

pub static FALLBACK_POOL: &[FallbackCategory] = &[
    FallbackCategory {
        label: "ambient",
        unlocks: &[0.0],
        fragments: &[
            "A glass is set down somewhere behind the bar.",
            "The neon sign outside hums and steadies.",
            "Someone laughs quietly in a far booth.",
            "Rain ticks against the front window.",
        ],
    },
    FallbackCategory {
        label: "sensory",
        unlocks: &[0.0],
        fragments: &[
            "The air smells of citrus peel and old wood.",
            "Ice shifts in a forgotten glass.",
            "The low lamps paint the counter amber.",
        ],
    },
    FallbackCategory {
        label: "temporal",
        unlocks: &[0.3],
        fragments: &[
            "The clock above the mirror seems to skip a minute.",
            "For a moment the song on the speakers starts over.",
        ],
    },
    FallbackCategory {
        label: "decay",
        unlocks: &[0.5, 0.8],
        fragments: &[
            "A bulb flickers and does not quite come back.",
            "The edges of the room feel further away than they should.",
            "A reflection in the mirror lags half a beat behind.",
            "Conversation at the next table dissolves into static.",
        ],
    },
];

/// Eligible fallback categories and their weight multipliers at `value`.
pub fn fallback_weights(value: f64) -> Vec<(&'static FallbackCategory, u32)> {
    FALLBACK_POOL
        .iter()
        .map(|cat| (cat, cat.multiplier(value)))
        .filter(|(_, weight)| *weight > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_of(value: f64, label: &str) -> u32 {
        fallback_weights(value)
            .into_iter()
            .find(|(c, _)| c.label == label)
            .map(|(_, w)| w)
            .unwrap_or(0)
    }

    #[test]
    fn test_calm_unlocks_base_categories_only() {
        assert_eq!(weight_of(0.0, "ambient"), 1);
        assert_eq!(weight_of(0.0, "sensory"), 1);
        assert_eq!(weight_of(0.0, "temporal"), 0);
        assert_eq!(weight_of(0.0, "decay"), 0);
    }

    #[test]
    fn test_decay_counts_twice_past_second_threshold() {
        assert_eq!(weight_of(0.6, "decay"), 1);
        assert_eq!(weight_of(0.85, "decay"), 2);
        assert_eq!(weight_of(0.85, "ambient"), 1);
        assert_eq!(weight_of(0.85, "temporal"), 1);
    }

    #[test]
    fn test_scope_matching() {
        assert!(TimeScope::Any.matches(TimeOfDay::Dawn));
        assert!(TimeScope::At(TimeOfDay::DeepNight).matches(TimeOfDay::DeepNight));
        assert!(!TimeScope::At(TimeOfDay::Dusk).matches(TimeOfDay::DeepNight));
        assert_eq!(TimeScope::parse("*"), Some(TimeScope::Any));
        assert_eq!(TimeScope::parse("bogus"), None);
    }

    #[test]
    fn test_entry_eligibility() {
        let entry = PoolEntry {
            category: "ambient".into(),
            time_scope: TimeScope::At(TimeOfDay::DeepNight),
            min_value: 0.2,
            max_value: 0.6,
            weight: 1.0,
            template: "x".into(),
        };
        assert!(entry.eligible(TimeOfDay::DeepNight, 0.2));
        assert!(entry.eligible(TimeOfDay::DeepNight, 0.6));
        assert!(!entry.eligible(TimeOfDay::DeepNight, 0.61));
        assert!(!entry.eligible(TimeOfDay::Dawn, 0.4));
    }
}
