use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};

use nocturne_core::{
    Atmosphere, AtmospherePatch, AuditRecord, AuditSink, BackendResult, DimensionKey, MemoryNote,
    PoolEntry, PoolQuery, StateBackend, StateDimension, TimeScope,
};

use crate::error::{Result, StoreError};
use crate::schema;

/// SQLite-backed state store. One connection, serialized behind a mutex, so
/// concurrent subsystems never interleave writes to the same row.
pub struct Store {
    conn: Mutex<Connection>,
}

/// An audit row as persisted, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub compile_id: String,
    pub operation: String,
    pub session_id: String,
    pub details: serde_json::Value,
    pub duration_ms: u64,
    pub success: bool,
    pub timestamp: u64,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::info!("opened state store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::InvalidData("connection lock poisoned".into()))
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Dimensions ---

    pub fn load_dimension(&self, entity_id: &str, key: DimensionKey) -> Result<Option<StateDimension>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT value, last_updated FROM dimensions
                 WHERE entity_id = ?1 AND dimension_key = ?2",
                params![entity_id, key.as_str()],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(value, last_updated)| StateDimension {
            entity_id: entity_id.to_string(),
            key,
            value: key.spec().clamp(value),
            last_updated: to_u64(last_updated),
        }))
    }

    pub fn save_dimension(&self, dim: &StateDimension) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO dimensions (entity_id, dimension_key, value, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id, dimension_key)
             DO UPDATE SET value = excluded.value, last_updated = excluded.last_updated",
            params![
                dim.entity_id,
                dim.key.as_str(),
                dim.value,
                to_i64(dim.last_updated),
            ],
        )?;
        Ok(())
    }

    /// Every stored dimension for an entity, in key order.
    pub fn dimensions_for(&self, entity_id: &str) -> Result<Vec<StateDimension>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT dimension_key, value, last_updated FROM dimensions
             WHERE entity_id = ?1 ORDER BY dimension_key",
        )?;
        let rows: Vec<(String, f64, i64)> = stmt
            .query_map([entity_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(key, value, last_updated)| {
                let key = DimensionKey::from_str(&key)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                Ok(StateDimension {
                    entity_id: entity_id.to_string(),
                    key,
                    value: key.spec().clamp(value),
                    last_updated: to_u64(last_updated),
                })
            })
            .collect()
    }

    // --- Content pool ---

    /// Swap the whole pool for `entries` in one transaction.
    pub fn replace_pool(&self, entries: &[PoolEntry]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM content_pool", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO content_pool (category, time_scope, min_value, max_value, weight, template)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for e in entries {
                insert.execute(params![
                    e.category,
                    e.time_scope.as_str(),
                    e.min_value,
                    e.max_value,
                    e.weight,
                    e.template,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn pool_size(&self) -> Result<usize> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM content_pool", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    /// Eligible rows in random order, so `limit` cuts a random sample of the
    /// whole eligible set rather than a fixed prefix of it.
    pub fn pool_entries(&self, query: &PoolQuery) -> Result<Vec<PoolEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, time_scope, min_value, max_value, weight, template
             FROM content_pool
             WHERE (time_scope = '*' OR time_scope = ?1)
               AND min_value <= ?2 AND max_value >= ?2
               AND weight > 0
             ORDER BY random()
             LIMIT ?3",
        )?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, f64, f64, f64, String)> = stmt
            .query_map(
                params![query.time_of_day.as_str(), query.value, limit],
                pool_row,
            )?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(category, scope, min_value, max_value, weight, template)| {
                let time_scope = TimeScope::parse(&scope).ok_or_else(|| {
                    StoreError::InvalidData(format!("unknown time scope '{scope}'"))
                })?;
                Ok(PoolEntry {
                    category,
                    time_scope,
                    min_value,
                    max_value,
                    weight,
                    template,
                })
            })
            .collect()
    }

    // --- Atmosphere ---

    pub fn atmosphere(&self, recipient_id: &str) -> Result<Atmosphere> {
        let conn = self.conn()?;
        load_atmosphere_on(&conn, recipient_id)
    }

    /// Upsert only the fields the patch carries.
    pub fn update_atmosphere(&self, recipient_id: &str, patch: &AtmospherePatch) -> Result<Atmosphere> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO atmospheres (recipient_id, music_preference, drink, seat, weather, nickname)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(recipient_id) DO UPDATE SET
                music_preference = COALESCE(excluded.music_preference, music_preference),
                drink            = COALESCE(excluded.drink, drink),
                seat             = COALESCE(excluded.seat, seat),
                weather          = COALESCE(excluded.weather, weather),
                nickname         = COALESCE(excluded.nickname, nickname)",
            params![
                recipient_id,
                patch.music_preference,
                patch.drink,
                patch.seat,
                patch.weather,
                patch.nickname,
            ],
        )?;
        load_atmosphere_on(&conn, recipient_id)
    }

    // --- Memories ---

    pub fn remember(&self, recipient_id: &str, note: &str, created_at: u64) -> Result<()> {
        let note = note.trim();
        if note.is_empty() {
            return Err(StoreError::InvalidData("memory note is empty".into()));
        }
        self.conn()?.execute(
            "INSERT INTO memories (recipient_id, note, created_at) VALUES (?1, ?2, ?3)",
            params![recipient_id, note, to_i64(created_at)],
        )?;
        Ok(())
    }

    pub fn recall(&self, recipient_id: &str, limit: usize) -> Result<Vec<MemoryNote>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT note, created_at FROM memories
             WHERE recipient_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let notes = stmt
            .query_map(params![recipient_id, limit], |row| {
                Ok(MemoryNote {
                    recipient_id: recipient_id.to_string(),
                    note: row.get(0)?,
                    created_at: to_u64(row.get(1)?),
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(notes)
    }

    // --- Audit ---

    pub fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let details = serde_json::to_string(&record.details)
            .map_err(|e| StoreError::InvalidData(format!("audit details: {e}")))?;
        self.conn()?.execute(
            "INSERT INTO audit_log (compile_id, operation, session_id, details, duration_ms, success, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.compile_id.to_string(),
                record.operation,
                record.session_id,
                details,
                to_i64(record.duration_ms),
                record.success as i32,
                to_i64(record.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Most recent audit rows first.
    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT compile_id, operation, session_id, details, duration_ms, success, timestamp
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String, String, i64, i32, i64)> = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(
                |(compile_id, operation, session_id, details, duration_ms, success, timestamp)| {
                    let details = serde_json::from_str(&details).map_err(|e| {
                        StoreError::InvalidData(format!("audit details for {compile_id}: {e}"))
                    })?;
                    Ok(AuditEntry {
                        compile_id,
                        operation,
                        session_id,
                        details,
                        duration_ms: to_u64(duration_ms),
                        success: success != 0,
                        timestamp: to_u64(timestamp),
                    })
                },
            )
            .collect()
    }
}

fn pool_row(row: &Row<'_>) -> rusqlite::Result<(String, String, f64, f64, f64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn load_atmosphere_on(conn: &Connection, recipient_id: &str) -> Result<Atmosphere> {
    let atm = conn
        .query_row(
            "SELECT music_preference, drink, seat, weather, nickname
             FROM atmospheres WHERE recipient_id = ?1",
            [recipient_id],
            |row| {
                Ok(Atmosphere {
                    music_preference: row.get(0)?,
                    drink: row.get(1)?,
                    seat: row.get(2)?,
                    weather: row.get(3)?,
                    nickname: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(atm.unwrap_or_default())
}

fn to_u64(secs: i64) -> u64 {
    secs.max(0) as u64
}

fn to_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

impl StateBackend for Store {
    fn get_dimension(
        &self,
        entity_id: &str,
        key: DimensionKey,
    ) -> BackendResult<Option<StateDimension>> {
        Ok(self.load_dimension(entity_id, key)?)
    }

    fn put_dimension(&self, dim: &StateDimension) -> BackendResult<()> {
        Ok(self.save_dimension(dim)?)
    }

    fn query_pool(&self, query: &PoolQuery) -> BackendResult<Vec<PoolEntry>> {
        Ok(self.pool_entries(query)?)
    }

    fn load_atmosphere(&self, recipient_id: &str) -> BackendResult<Atmosphere> {
        Ok(self.atmosphere(recipient_id)?)
    }

    fn save_atmosphere(
        &self,
        recipient_id: &str,
        patch: &AtmospherePatch,
    ) -> BackendResult<Atmosphere> {
        Ok(self.update_atmosphere(recipient_id, patch)?)
    }

    fn recall_memories(&self, recipient_id: &str, limit: usize) -> BackendResult<Vec<MemoryNote>> {
        Ok(self.recall(recipient_id, limit)?)
    }
}

impl AuditSink for Store {
    fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.append_audit(record) {
            tracing::warn!("dropping audit record {}: {e}", record.operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_core::{OP_COMPILE, TimeOfDay};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn entry(scope: TimeScope, min: f64, max: f64, template: &str) -> PoolEntry {
        PoolEntry {
            category: "ambient".into(),
            time_scope: scope,
            min_value: min,
            max_value: max,
            weight: 1.0,
            template: template.into(),
        }
    }

    #[test]
    fn test_dimension_roundtrip_and_upsert() {
        let store = Store::open_in_memory().unwrap();
        assert!(
            store
                .load_dimension("s1", DimensionKey::Entropy)
                .unwrap()
                .is_none()
        );

        let mut dim = StateDimension::fresh("s1", DimensionKey::Entropy, 100);
        dim.value = 0.3;
        store.save_dimension(&dim).unwrap();
        dim.value = 0.45;
        dim.last_updated = 200;
        store.save_dimension(&dim).unwrap();

        let loaded = store
            .load_dimension("s1", DimensionKey::Entropy)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, dim);
        assert_eq!(store.dimensions_for("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_row_is_clamped_on_read() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO dimensions VALUES ('s1', 'drift', 7.5, 10)",
                [],
            )
            .unwrap();
        let dim = store
            .load_dimension("s1", DimensionKey::Drift)
            .unwrap()
            .unwrap();
        assert_eq!(dim.value, 1.0);
    }

    #[test]
    fn test_unknown_dimension_key_is_invalid_data() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO dimensions VALUES ('s1', 'gravity', 0.5, 10)",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.dimensions_for("s1"),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_pool_query_filters_scope_and_range() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_pool(&[
                entry(TimeScope::Any, 0.0, 1.0, "any"),
                entry(TimeScope::At(TimeOfDay::Dawn), 0.0, 1.0, "dawn"),
                entry(TimeScope::At(TimeOfDay::DeepNight), 0.6, 1.0, "late"),
                entry(TimeScope::At(TimeOfDay::DeepNight), 0.0, 0.5, "early"),
            ])
            .unwrap();
        assert_eq!(store.pool_size().unwrap(), 4);

        let rows = store
            .pool_entries(&PoolQuery {
                time_of_day: TimeOfDay::DeepNight,
                value: 0.5,
                limit: 10,
            })
            .unwrap();
        let mut templates: Vec<&str> = rows.iter().map(|r| r.template.as_str()).collect();
        templates.sort();
        assert_eq!(templates, vec!["any", "early"]);
    }

    #[test]
    fn test_pool_limit_samples_the_whole_eligible_set() {
        let store = Store::open_in_memory().unwrap();
        let rows: Vec<PoolEntry> = (0..100)
            .map(|i| entry(TimeScope::Any, 0.0, 1.0, &format!("row {i}.")))
            .collect();
        store.replace_pool(&rows).unwrap();

        let query = PoolQuery {
            time_of_day: TimeOfDay::DeepNight,
            value: 0.2,
            limit: 64,
        };
        let mut seen = HashSet::new();
        for _ in 0..30 {
            let batch = store.pool_entries(&query).unwrap();
            assert_eq!(batch.len(), 64);
            seen.extend(batch.into_iter().map(|r| r.template));
        }
        assert!(seen.contains("row 99."));
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_replace_pool_discards_old_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_pool(&[entry(TimeScope::Any, 0.0, 1.0, "old")])
            .unwrap();
        store
            .replace_pool(&[entry(TimeScope::Any, 0.0, 1.0, "new")])
            .unwrap();
        assert_eq!(store.pool_size().unwrap(), 1);
    }

    #[test]
    fn test_atmosphere_partial_update() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.atmosphere("ana").unwrap(), Atmosphere::default());

        store
            .update_atmosphere(
                "ana",
                &AtmospherePatch {
                    drink: Some("Vinho Verde".into()),
                    seat: Some("corner booth".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let atm = store
            .update_atmosphere(
                "ana",
                &AtmospherePatch {
                    music_preference: Some("Fado".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(atm.music_preference.as_deref(), Some("Fado"));
        assert_eq!(atm.drink.as_deref(), Some("Vinho Verde"));
        assert_eq!(atm.seat.as_deref(), Some("corner booth"));
        assert_eq!(store.atmosphere("ana").unwrap(), atm);
    }

    #[test]
    fn test_recall_most_recent_first_with_limit() {
        let store = Store::open_in_memory().unwrap();
        store.remember("ana", "first", 1).unwrap();
        store.remember("ana", "second", 2).unwrap();
        store.remember("ana", "third", 3).unwrap();
        store.remember("bo", "elsewhere", 4).unwrap();

        let notes = store.recall("ana", 2).unwrap();
        let texts: Vec<&str> = notes.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(texts, vec!["third", "second"]);
    }

    #[test]
    fn test_empty_memory_rejected() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.remember("ana", "   ", 1).is_err());
    }

    #[test]
    fn test_audit_sink_persists_records() {
        let store = Store::open_in_memory().unwrap();
        let record = AuditRecord {
            compile_id: Uuid::new_v4(),
            operation: OP_COMPILE.into(),
            session_id: "s1".into(),
            details: serde_json::json!({ "sections": ["setting"], "truncated": false }),
            duration_ms: 12,
            success: false,
            timestamp: 1_771_632_000,
        };
        store.record(&record);

        let rows = store.recent_audit(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].compile_id, record.compile_id.to_string());
        assert_eq!(rows[0].details["sections"][0], "setting");
        assert!(!rows[0].success);
        assert_eq!(rows[0].duration_ms, 12);
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_metadata("foo").unwrap().is_none());
        store.set_metadata("foo", "bar").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("bar".to_string()));
    }
}
