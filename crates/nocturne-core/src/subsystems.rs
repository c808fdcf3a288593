//! The fixed, ordered set of preamble contributors.
//!
//! Each subsystem is a plain function returning `Ok(Some(text))`,
//! `Ok(None)` when it has nothing to say, or a backend error. Turning
//! failures into absent sections is the compiler's job, not theirs.

use std::sync::Arc;

use rand::Rng;

use crate::bands::{ArcPhase, DriftSeverity, EntropyState, ThresholdTable, TrustLevel};
use crate::dimension::DimensionKey;
use crate::error::BackendResult;
use crate::selector::{SelectionCriteria, select};
use crate::session::StateHandle;
use crate::time::{TimeOfDay, elapsed_hours};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Setting,
    Relationship,
    Memory,
    DriftCorrection,
    Entropy,
    NarrativeArc,
    Awareness,
}

impl Subsystem {
    /// Priority order. Output sections always follow it.
    pub const ORDER: [Subsystem; 7] = [
        Subsystem::Setting,
        Subsystem::Relationship,
        Subsystem::Memory,
        Subsystem::DriftCorrection,
        Subsystem::Entropy,
        Subsystem::NarrativeArc,
        Subsystem::Awareness,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Subsystem::Setting => "setting",
            Subsystem::Relationship => "relationship",
            Subsystem::Memory => "memory",
            Subsystem::DriftCorrection => "drift_correction",
            Subsystem::Entropy => "entropy",
            Subsystem::NarrativeArc => "narrative_arc",
            Subsystem::Awareness => "awareness",
        }
    }

    /// Mandatory sections are kept even when they overflow the budget.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Subsystem::Setting)
    }

    pub fn run(self, ctx: &FragmentContext, rng: &mut impl Rng) -> BackendResult<Option<String>> {
        match self {
            Subsystem::Setting => setting(ctx),
            Subsystem::Relationship => relationship(ctx),
            Subsystem::Memory => memory(ctx),
            Subsystem::DriftCorrection => drift_correction(ctx),
            Subsystem::Entropy => entropy(ctx, rng),
            Subsystem::NarrativeArc => narrative_arc(ctx),
            Subsystem::Awareness => awareness(ctx),
        }
    }
}

/// Everything a subsystem may look at for one compilation.
pub struct FragmentContext {
    pub handle: StateHandle,
    pub now: u64,
    pub hour: u32,
    pub time_of_day: TimeOfDay,
    pub drift_table: Arc<ThresholdTable<DriftSeverity>>,
    pub memory_limit: usize,
}

fn setting(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let atm = ctx
        .handle
        .backend()
        .load_atmosphere(ctx.handle.recipient_id())?;

    let mut text = match ctx.time_of_day {
        TimeOfDay::Dawn => {
            "Dawn is a thin grey line at the edge of the blinds, and the bar is still open."
        }
        TimeOfDay::Dusk => "Dusk settles over the street and the lamps in the bar come up.",
        TimeOfDay::DeepNight => "It is deep night at the bar. The lamps are low.",
    }
    .to_string();

    if let Some(music) = &atm.music_preference {
        text.push_str(&format!(" {music} plays softly from the speakers."));
    }
    if let Some(weather) = &atm.weather {
        text.push_str(&format!(" Outside there is {weather}."));
    }
    if let Some(seat) = &atm.seat {
        text.push_str(&format!(" Their usual {seat} is free."));
    }
    if let Some(drink) = &atm.drink {
        text.push_str(&format!(" A {drink} can be poured without asking."));
    }
    Ok(Some(text))
}

fn relationship(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let trust = ctx.handle.current(DimensionKey::Trust, ctx.now)?;
    let level = TrustLevel::classify(trust);

    let nickname = if level >= TrustLevel::Familiar {
        ctx.handle
            .backend()
            .load_atmosphere(ctx.handle.recipient_id())?
            .nickname
    } else {
        None
    };
    let called = nickname
        .map(|n| format!(", and you call them {n}"))
        .unwrap_or_default();

    let text = match level {
        TrustLevel::Stranger => {
            "They are a stranger here. Be courteous and keep a little distance.".to_string()
        }
        TrustLevel::Acquaintance => {
            "You have seen them before. Be warm but unhurried.".to_string()
        }
        TrustLevel::Familiar => {
            format!("They are a familiar face{called}. Speak easily, as to a regular.")
        }
        TrustLevel::Confidant => {
            format!("They are a confidant{called}. You can be candid with them.")
        }
    };
    Ok(Some(text))
}

fn memory(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let notes = ctx
        .handle
        .backend()
        .recall_memories(ctx.handle.recipient_id(), ctx.memory_limit)?;

    let remembered: Vec<&str> = notes
        .iter()
        .map(|n| n.note.trim().trim_end_matches(['.', '!', '?']))
        .filter(|n| !n.is_empty())
        .collect();
    if remembered.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "Things you remember about them: {}.",
        remembered.join(". ")
    )))
}

fn drift_correction(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let drift = ctx.handle.current(DimensionKey::Drift, ctx.now)?;
    let text = match ctx.drift_table.classify(drift) {
        DriftSeverity::Stable => return Ok(None),
        DriftSeverity::Minor => {
            "Your voice has wandered a little. Settle back into your usual cadence."
        }
        DriftSeverity::Warning => {
            "Your voice is drifting from itself. Use shorter sentences and your own turns of phrase."
        }
        DriftSeverity::Critical => {
            "You are losing your voice. Stop, and answer the way you always have: quiet, dry and precise."
        }
    };
    Ok(Some(text.to_string()))
}

fn entropy(ctx: &FragmentContext, rng: &mut impl Rng) -> BackendResult<Option<String>> {
    let value = ctx.handle.current(DimensionKey::Entropy, ctx.now)?;
    let state = EntropyState::classify(value);

    let mut text = match state {
        EntropyState::Stable => "The room is steady.",
        EntropyState::Unsettled => "Something in the room is slightly off.",
        EntropyState::Decaying => "The room is wearing thin at the edges.",
        EntropyState::Fragmenting => "The room is coming apart in small ways.",
        EntropyState::Dissolving => "The room is barely holding together.",
    }
    .to_string();

    let criteria = SelectionCriteria {
        time_of_day: ctx.time_of_day,
        value,
    };
    let selection = select(
        ctx.handle.backend(),
        &criteria,
        state.micro_event_count(),
        rng,
    );
    for fragment in &selection.fragments {
        text.push(' ');
        text.push_str(fragment);
    }
    Ok(Some(text))
}

fn narrative_arc(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let momentum = ctx.handle.current(DimensionKey::Momentum, ctx.now)?;
    let text = match ArcPhase::classify(momentum) {
        ArcPhase::Rising => "The conversation is still finding its footing. Let it build.",
        ArcPhase::Apex => "The conversation is at its height. Meet its energy.",
        ArcPhase::Falling => "The conversation is winding down. Give it room to land.",
        ArcPhase::Impact => "Something important is landing now. Be fully present for it.",
    };
    Ok(Some(text.to_string()))
}

fn awareness(ctx: &FragmentContext) -> BackendResult<Option<String>> {
    let clock = format!(
        "The clock reads {:02}:00, though the night outside has not moved.",
        ctx.hour
    );

    let visit = match ctx.handle.stored(DimensionKey::Trust)? {
        None => "This is the first time they have come through the door.".to_string(),
        Some(dim) => {
            let hours = elapsed_hours(dim.last_updated, ctx.now);
            if hours < 1.0 {
                "They were here only moments ago.".to_string()
            } else if hours < 48.0 {
                format!("They were last here about {} hours ago.", hours.round() as u64)
            } else {
                format!(
                    "It has been {} days since they were last here.",
                    (hours / 24.0).floor() as u64
                )
            }
        }
    };
    Ok(Some(format!("{clock} {visit}")))
}
