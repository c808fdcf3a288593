//! The state-store seam: everything the engine reads or writes goes through
//! [`StateBackend`]. Implementations must tolerate concurrent callers and
//! serialize writes to the same `(entity, dimension)` pair.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::seq::SliceRandom;

use crate::atmosphere::{Atmosphere, AtmospherePatch};
use crate::dimension::{DimensionKey, StateDimension};
use crate::error::{BackendError, BackendResult};
use crate::pool::{PoolEntry, PoolQuery};

/// A remembered fact about a recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryNote {
    pub recipient_id: String,
    pub note: String,
    /// Unix seconds.
    pub created_at: u64,
}

pub trait StateBackend: Send + Sync {
    fn get_dimension(&self, entity_id: &str, key: DimensionKey)
    -> BackendResult<Option<StateDimension>>;

    /// Last write wins.
    fn put_dimension(&self, dim: &StateDimension) -> BackendResult<()>;

    /// At most `query.limit` eligible rows. When more are eligible, the cut
    /// is a random sample of all of them, never a fixed prefix.
    fn query_pool(&self, query: &PoolQuery) -> BackendResult<Vec<PoolEntry>>;

    /// Defaults when the recipient has never been seen.
    fn load_atmosphere(&self, recipient_id: &str) -> BackendResult<Atmosphere>;

    /// Merge `patch` into the stored atmosphere and return the result.
    fn save_atmosphere(&self, recipient_id: &str, patch: &AtmospherePatch)
    -> BackendResult<Atmosphere>;

    /// Most recent first.
    fn recall_memories(&self, recipient_id: &str, limit: usize) -> BackendResult<Vec<MemoryNote>>;
}

#[derive(Default)]
struct MemoryState {
    dimensions: HashMap<(String, DimensionKey), StateDimension>,
    pool: Vec<PoolEntry>,
    atmospheres: HashMap<String, Atmosphere>,
    memories: Vec<MemoryNote>,
}

/// In-process backend. Useful for tests and for running without a database.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: Vec<PoolEntry>) -> Self {
        let backend = Self::default();
        if let Ok(mut state) = backend.state.lock() {
            state.pool = pool;
        }
        backend
    }

    pub fn remember(&self, recipient_id: &str, note: &str, created_at: u64) -> BackendResult<()> {
        self.lock()?.memories.push(MemoryNote {
            recipient_id: recipient_id.to_string(),
            note: note.to_string(),
            created_at,
        });
        Ok(())
    }

    fn lock(&self) -> BackendResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }
}

impl StateBackend for MemoryBackend {
    fn get_dimension(
        &self,
        entity_id: &str,
        key: DimensionKey,
    ) -> BackendResult<Option<StateDimension>> {
        Ok(self
            .lock()?
            .dimensions
            .get(&(entity_id.to_string(), key))
            .cloned())
    }

    fn put_dimension(&self, dim: &StateDimension) -> BackendResult<()> {
        self.lock()?
            .dimensions
            .insert((dim.entity_id.clone(), dim.key), dim.clone());
        Ok(())
    }

    fn query_pool(&self, query: &PoolQuery) -> BackendResult<Vec<PoolEntry>> {
        let mut rows: Vec<PoolEntry> = self
            .lock()?
            .pool
            .iter()
            .filter(|e| e.eligible(query.time_of_day, query.value))
            .cloned()
            .collect();
        if rows.len() > query.limit {
            rows.shuffle(&mut rand::rng());
            rows.truncate(query.limit);
        }
        Ok(rows)
    }

    fn load_atmosphere(&self, recipient_id: &str) -> BackendResult<Atmosphere> {
        Ok(self
            .lock()?
            .atmospheres
            .get(recipient_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_atmosphere(
        &self,
        recipient_id: &str,
        patch: &AtmospherePatch,
    ) -> BackendResult<Atmosphere> {
        let mut state = self.lock()?;
        let atm = state
            .atmospheres
            .entry(recipient_id.to_string())
            .or_default();
        atm.apply(patch);
        Ok(atm.clone())
    }

    fn recall_memories(&self, recipient_id: &str, limit: usize) -> BackendResult<Vec<MemoryNote>> {
        let state = self.lock()?;
        let mut notes: Vec<MemoryNote> = state
            .memories
            .iter()
            .filter(|m| m.recipient_id == recipient_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes.truncate(limit);
        Ok(notes)
    }
}
