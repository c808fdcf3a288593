use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dimensions (
            entity_id     TEXT NOT NULL,
            dimension_key TEXT NOT NULL,
            value         REAL NOT NULL,
            last_updated  INTEGER NOT NULL,
            PRIMARY KEY (entity_id, dimension_key)
        );

        CREATE TABLE IF NOT EXISTS content_pool (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            category   TEXT NOT NULL,
            time_scope TEXT NOT NULL DEFAULT '*',
            min_value  REAL NOT NULL DEFAULT 0.0,
            max_value  REAL NOT NULL DEFAULT 1.0,
            weight     REAL NOT NULL DEFAULT 1.0,
            template   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS atmospheres (
            recipient_id     TEXT PRIMARY KEY,
            music_preference TEXT,
            drink            TEXT,
            seat             TEXT,
            weather          TEXT,
            nickname         TEXT
        );

        CREATE TABLE IF NOT EXISTS memories (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id TEXT NOT NULL,
            note         TEXT NOT NULL,
            created_at   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            compile_id  TEXT NOT NULL,
            operation   TEXT NOT NULL,
            session_id  TEXT NOT NULL,
            details     TEXT NOT NULL DEFAULT '{}',
            duration_ms INTEGER NOT NULL DEFAULT 0,
            success     INTEGER NOT NULL DEFAULT 1,
            timestamp   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pool_scope ON content_pool(time_scope);
        CREATE INDEX IF NOT EXISTS idx_mem_recipient ON memories(recipient_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_compile ON audit_log(compile_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
