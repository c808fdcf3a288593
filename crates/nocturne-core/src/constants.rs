/// Characters per estimated token when costing a fragment.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default global token budget for one compiled preamble.
pub const DEFAULT_TOKEN_BUDGET: usize = 400;

/// Default deadline for all subsystem fetches of one compilation.
pub const DEFAULT_DEADLINE_MS: u64 = 250;

/// Drift severity: values at or below this are stable.
pub const DRIFT_STABLE_CEILING: f64 = 0.1;

/// Drift severity: default lower bound of the warning band.
pub const DEFAULT_DRIFT_WARNING: f64 = 0.4;

/// Drift severity: critical starts this far above the warning threshold.
pub const DRIFT_CRITICAL_OFFSET: f64 = 0.2;

/// Trust gained by one closed session at neutral engagement.
pub const TRUST_SESSION_DELTA: f64 = 0.02;

/// Engagement multiplier floor and ceiling.
pub const ENGAGEMENT_FLOOR: f64 = 0.5;
pub const ENGAGEMENT_CEILING: f64 = 2.0;

/// Base entropy gained per turn, jittered by U(0.5, 1.5).
pub const ENTROPY_TURN_STEP: f64 = 0.05;

/// Momentum moved per turn per unit of engagement above or below neutral.
pub const MOMENTUM_GAIN: f64 = 0.3;

/// Default number of remembered notes offered to the memory subsystem.
pub const DEFAULT_MEMORY_LIMIT: usize = 3;

/// Rows requested from the backing content pool per selection.
pub const POOL_QUERY_LIMIT: usize = 64;

/// Returned when nothing mandatory could be compiled.
pub const FALLBACK_PREAMBLE: &str =
    "It is deep night at the bar. The lamps are low and the room is quiet.";
