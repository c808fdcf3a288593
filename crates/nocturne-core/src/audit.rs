//! Audit records for compilation diagnostics.
//!
//! Records are append-only and flow one way into an [`AuditSink`]. They carry
//! timings, flags and labels, never preamble text, and nothing in the
//! compiler reads them back.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

pub const OP_COMPILE: &str = "compile";
pub const OP_ERROR_GRACEFUL: &str = "error_graceful";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Shared by every record emitted during one compilation.
    pub compile_id: Uuid,
    pub operation: String,
    pub session_id: String,
    pub details: serde_json::Value,
    pub duration_ms: u64,
    pub success: bool,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Write-only destination for audit records. Implementations swallow their
/// own failures; auditing never affects compilation.
///
/// The compiler calls `record` from the blocking pool after the context is
/// built, never on the request path. Implementations may block (a database
/// insert waiting on a lock is fine); a write still running at the compile
/// deadline finishes detached.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn record(&self, record: &AuditRecord) {
        (**self).record(record);
    }
}

/// Forwards records to `tracing` under the `nocturne::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::debug!(
            target: "nocturne::audit",
            compile_id = %record.compile_id,
            operation = %record.operation,
            session_id = %record.session_id,
            duration_ms = record.duration_ms,
            success = record.success,
            details = %record.details,
        );
    }
}

/// Keeps records in memory. Meant for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(_) => tracing::warn!("audit buffer poisoned, dropping {}", record.operation),
        }
    }
}

/// Fan a record out to several sinks.
pub struct MultiAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl MultiAuditSink {
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for MultiAuditSink {
    fn record(&self, record: &AuditRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
