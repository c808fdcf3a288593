//! Nocturne: persistent-state preamble compiler for a perpetual-night bar.
//!
//! Tracks a handful of bounded state dimensions per conversation and per
//! recipient, classifies them into qualitative bands, and composes a
//! token-budgeted preamble from independent, failure-isolated subsystems.
//!
//! No storage opinions: persistence lives behind [`StateBackend`].

pub mod atmosphere;
pub mod audit;
pub mod backend;
pub mod bands;
pub mod compile;
pub mod config;
pub mod constants;
pub mod dimension;
pub mod error;
pub mod evolution;
pub mod pool;
pub mod selector;
pub mod session;
pub mod subsystems;
pub mod time;

pub use atmosphere::{Atmosphere, AtmospherePatch};
pub use audit::{
    AuditRecord, AuditSink, MemoryAuditSink, MultiAuditSink, OP_COMPILE, OP_ERROR_GRACEFUL,
    TracingAuditSink,
};
pub use backend::{MemoryBackend, MemoryNote, StateBackend};
pub use bands::{ArcPhase, BandLabel, DriftSeverity, EntropyState, ThresholdTable, TrustLevel};
pub use compile::{CompiledContext, Compiler, Section, estimate_tokens, truncate_at_sentence};
pub use config::CompileConfig;
pub use constants::{DEFAULT_DEADLINE_MS, DEFAULT_TOKEN_BUDGET, FALLBACK_PREAMBLE};
pub use dimension::{DimensionKey, DimensionKind, DimensionSpec, EntityScope, StateDimension};
pub use error::{BackendError, BackendResult, ConfigError};
pub use evolution::advance;
pub use pool::{FallbackCategory, PoolEntry, PoolQuery, TimeScope};
pub use selector::{Selection, SelectionCriteria, SelectionSource, select};
pub use session::{StateHandle, StateSnapshot, TurnOutcome, TurnSignal};
pub use subsystems::Subsystem;
pub use time::{TimeOfDay, now_unix_secs};
