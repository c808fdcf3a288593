//! The preamble compiler.
//!
//! Every subsystem runs on the blocking pool behind one shared deadline.
//! Results are collected in priority order, failures and timeouts become
//! absent sections, and the survivors are packed into the token budget.
//! The compiler always returns a usable context: when the mandatory
//! setting cannot be produced, a built-in preamble stands in for it.
//! Audit records are buffered per compile and handed to the sink on the
//! blocking pool, so a slow sink cannot hold the result past the deadline.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, OP_COMPILE, OP_ERROR_GRACEFUL};
use crate::backend::StateBackend;
use crate::bands::{DriftSeverity, ThresholdTable, validate_fixed_tables};
use crate::config::CompileConfig;
use crate::constants::{CHARS_PER_TOKEN, FALLBACK_PREAMBLE};
use crate::error::{BackendError, ConfigError};
use crate::session::StateHandle;
use crate::subsystems::{FragmentContext, Subsystem};
use crate::time::{TimeOfDay, hour_of_day, now_unix_secs};

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?](\s|$)").unwrap());

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Longest prefix of `text` that ends on a sentence boundary and fits in
/// `max_chars`. `None` when not even the first sentence fits.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> Option<String> {
    let mut best = None;
    for m in SENTENCE_END.find_iter(text) {
        // Keep the punctuation, drop the trailing whitespace.
        let end = m.start() + 1;
        if text[..end].chars().count() > max_chars {
            break;
        }
        best = Some(end);
    }
    best.map(|end| text[..end].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub label: &'static str,
    pub text: String,
    pub tokens: usize,
}

impl Section {
    fn new(label: &'static str, text: String) -> Self {
        let tokens = estimate_tokens(&text);
        Self {
            label,
            text,
            tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContext {
    /// In priority order.
    pub sections: Vec<Section>,
    pub total_tokens: usize,
    /// An optional section was cut or dropped to respect the budget.
    pub truncated: bool,
    /// The mandatory setting was replaced by the built-in preamble.
    pub degraded: bool,
}

impl CompiledContext {
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.sections.iter().map(|s| s.label).collect()
    }
}

/// Sections after budget packing, plus what had to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    pub sections: Vec<Section>,
    pub total_tokens: usize,
    pub truncated: bool,
    pub dropped: Vec<&'static str>,
}

/// Pack fragments, already in priority order, into `budget` tokens.
///
/// Mandatory fragments are always kept. The first optional fragment that
/// does not fit is cut back to a sentence boundary (or dropped when no
/// sentence fits); every optional fragment after it is dropped.
pub fn pack(fragments: Vec<(Subsystem, String)>, budget: usize) -> Packed {
    let mut sections = Vec::new();
    let mut dropped = Vec::new();
    let mut total = 0;
    let mut truncated = false;

    for (sub, text) in fragments {
        let section = Section::new(sub.label(), text);
        if sub.is_mandatory() {
            total += section.tokens;
            sections.push(section);
            continue;
        }
        if truncated {
            dropped.push(section.label);
            continue;
        }
        if total + section.tokens <= budget {
            total += section.tokens;
            sections.push(section);
            continue;
        }

        truncated = true;
        let remaining = budget.saturating_sub(total);
        match truncate_at_sentence(&section.text, remaining * CHARS_PER_TOKEN) {
            Some(cut) => {
                let cut = Section::new(section.label, cut);
                total += cut.tokens;
                sections.push(cut);
            }
            None => dropped.push(section.label),
        }
    }

    Packed {
        sections,
        total_tokens: total,
        truncated,
        dropped,
    }
}

#[derive(Debug)]
enum Failure {
    Backend(BackendError),
    Panicked(String),
    DeadlineExceeded,
}

impl Failure {
    fn reason(&self) -> &'static str {
        match self {
            Failure::Backend(_) => "backend",
            Failure::Panicked(_) => "panic",
            Failure::DeadlineExceeded => "deadline",
        }
    }

    fn message(&self) -> String {
        match self {
            Failure::Backend(e) => e.to_string(),
            Failure::Panicked(msg) => msg.clone(),
            Failure::DeadlineExceeded => "no result before the compile deadline".to_string(),
        }
    }
}

pub struct Compiler {
    backend: Arc<dyn StateBackend>,
    sink: Arc<dyn AuditSink>,
    config: CompileConfig,
    drift_table: Arc<ThresholdTable<DriftSeverity>>,
}

impl Compiler {
    /// Fails only on bad configuration; compilation itself cannot fail.
    pub fn new(
        backend: Arc<dyn StateBackend>,
        sink: Arc<dyn AuditSink>,
        config: CompileConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        validate_fixed_tables()?;
        let drift_table = Arc::new(DriftSeverity::table(config.drift_warning_threshold)?);
        Ok(Self {
            backend,
            sink,
            config,
            drift_table,
        })
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    pub fn drift_table(&self) -> &ThresholdTable<DriftSeverity> {
        &self.drift_table
    }

    pub fn handle(&self, session_id: &str, recipient_id: &str) -> StateHandle {
        StateHandle::new(self.backend.clone(), session_id, recipient_id)
    }

    pub async fn compile(&self, session_id: &str, recipient_id: &str) -> CompiledContext {
        self.compile_at(session_id, recipient_id, now_unix_secs())
            .await
    }

    pub async fn compile_at(&self, session_id: &str, recipient_id: &str, now: u64) -> CompiledContext {
        let compile_id = Uuid::new_v4();
        let started = Instant::now();
        let hour = hour_of_day(now, self.config.utc_offset_hours);
        let time_of_day = TimeOfDay::from_hour(hour);

        let ctx = Arc::new(FragmentContext {
            handle: self.handle(session_id, recipient_id),
            now,
            hour,
            time_of_day,
            drift_table: self.drift_table.clone(),
            memory_limit: self.config.memory_limit,
        });

        let mut seeder = match self.config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.deadline_ms);

        let pending: Vec<_> = Subsystem::ORDER
            .iter()
            .map(|&sub| {
                let ctx = ctx.clone();
                let seed = seeder.random::<u64>();
                let task = tokio::task::spawn_blocking(move || {
                    let t = Instant::now();
                    let mut rng = SmallRng::seed_from_u64(seed);
                    let result = sub.run(&ctx, &mut rng);
                    (result, t.elapsed())
                });
                (sub, task)
            })
            .collect();

        let mut fragments = Vec::new();
        let mut failed = Vec::new();
        let mut audit = Vec::with_capacity(Subsystem::ORDER.len() + 1);
        let mut setting_resolved = false;

        for (sub, task) in pending {
            let (result, elapsed) = match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok((Ok(fragment), elapsed))) => (Ok(fragment), elapsed),
                Ok(Ok((Err(e), elapsed))) => (Err(Failure::Backend(e)), elapsed),
                Ok(Err(join_err)) => (
                    Err(Failure::Panicked(join_err.to_string())),
                    started.elapsed(),
                ),
                Err(_) => (Err(Failure::DeadlineExceeded), started.elapsed()),
            };

            if result.is_err() {
                failed.push(sub.label());
            }
            let settled = settle(compile_id, session_id, now, sub, result, elapsed, &mut audit);
            if let Some(text) = settled {
                if sub.is_mandatory() {
                    setting_resolved = true;
                }
                fragments.push((sub, text));
            }
        }

        let degraded = !setting_resolved;
        if degraded {
            fragments.insert(0, (Subsystem::Setting, FALLBACK_PREAMBLE.to_string()));
        }

        let packed = pack(fragments, self.config.token_budget);
        let context = CompiledContext {
            sections: packed.sections,
            total_tokens: packed.total_tokens,
            truncated: packed.truncated,
            degraded,
        };

        audit.push(AuditRecord {
            compile_id,
            operation: OP_COMPILE.to_string(),
            session_id: session_id.to_string(),
            details: json!({
                "sections": context.labels(),
                "total_tokens": context.total_tokens,
                "token_budget": self.config.token_budget,
                "truncated": context.truncated,
                "dropped": packed.dropped,
                "failed": failed,
                "time_of_day": time_of_day.as_str(),
            }),
            duration_ms: millis(started.elapsed()),
            success: !degraded,
            timestamp: now,
        });

        tracing::debug!(
            %compile_id,
            session = session_id,
            sections = context.sections.len(),
            tokens = context.total_tokens,
            truncated = context.truncated,
            degraded,
            "preamble compiled"
        );

        self.flush_audit(audit, deadline).await;

        context
    }

    /// Hand one compile's records to the sink on the blocking pool. Waits
    /// at most until `deadline`; a sink still writing after that keeps going
    /// detached and the compiled context is returned regardless.
    async fn flush_audit(&self, records: Vec<AuditRecord>, deadline: tokio::time::Instant) {
        let sink = self.sink.clone();
        let task = tokio::task::spawn_blocking(move || {
            for record in &records {
                sink.record(record);
            }
        });
        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("audit sink failed: {e}"),
            Err(_) => tracing::debug!("audit sink still writing at the deadline, detached"),
        }
    }
}

/// The single place where a subsystem failure turns into an absent section.
/// Buffers the per-subsystem audit record and, on failure, an
/// `error_graceful` record.
fn settle(
    compile_id: Uuid,
    session_id: &str,
    now: u64,
    sub: Subsystem,
    result: Result<Option<String>, Failure>,
    elapsed: Duration,
    audit: &mut Vec<AuditRecord>,
) -> Option<String> {
    let record = |operation: String, details: serde_json::Value, success: bool| AuditRecord {
        compile_id,
        operation,
        session_id: session_id.to_string(),
        details,
        duration_ms: millis(elapsed),
        success,
        timestamp: now,
    };

    match result {
        Ok(fragment) => {
            let fragment = fragment.filter(|t| !t.trim().is_empty());
            audit.push(record(
                format!("subsystem.{}", sub.label()),
                json!({ "subsystem": sub.label(), "produced": fragment.is_some() }),
                true,
            ));
            fragment
        }
        Err(failure) => {
            tracing::warn!(
                subsystem = sub.label(),
                reason = failure.reason(),
                "subsystem failed, section omitted: {}",
                failure.message()
            );
            audit.push(record(
                format!("subsystem.{}", sub.label()),
                json!({ "subsystem": sub.label(), "produced": false }),
                false,
            ));
            audit.push(record(
                OP_ERROR_GRACEFUL.to_string(),
                json!({
                    "subsystem": sub.label(),
                    "reason": failure.reason(),
                    "error": failure.message(),
                }),
                false,
            ));
            None
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
