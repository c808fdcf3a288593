//! Wall-clock helpers and the time-of-day mapping (no chrono dependency).
//!
//! The bar lives in a perpetual night: only two narrow windows around dawn
//! and dusk count as transitional, every other hour is `deep_night`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const SECS_PER_HOUR: i64 = 3600;
const SECS_PER_DAY: i64 = 86400;

/// Current UTC time as Unix seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Wall-clock hour (0-23) for a Unix timestamp shifted by `utc_offset_hours`.
pub fn hour_of_day(unix_secs: u64, utc_offset_hours: i32) -> u32 {
    let shifted = unix_secs as i64 + i64::from(utc_offset_hours) * SECS_PER_HOUR;
    (shifted.rem_euclid(SECS_PER_DAY) / SECS_PER_HOUR) as u32
}

/// Hours between two Unix timestamps; zero when `to` precedes `from`.
pub fn elapsed_hours(from: u64, to: u64) -> f64 {
    to.saturating_sub(from) as f64 / SECS_PER_HOUR as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Dawn,
    Dusk,
    DeepNight,
}

impl TimeOfDay {
    /// Map a wall-clock hour to its band. Daytime is deep night here.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5 | 6 => TimeOfDay::Dawn,
            19 | 20 => TimeOfDay::Dusk,
            _ => TimeOfDay::DeepNight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Dawn => "dawn",
            TimeOfDay::Dusk => "dusk",
            TimeOfDay::DeepNight => "deep_night",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "dawn" => Some(TimeOfDay::Dawn),
            "dusk" => Some(TimeOfDay::Dusk),
            "deep_night" => Some(TimeOfDay::DeepNight),
            _ => None,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
