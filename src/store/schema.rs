//! SQLite schema for execution logs.
//!
//! Layout:
//! - `log_meta`: single row (id=1) holding the schema version
//! - `executions`: one row per execution
//! - `log_scopes`: (execution_id, scope_sequence) keyed, self-referencing parent
//! - `log_entries`: (execution_id, entry_sequence) keyed, owned by a scope
//!
//! Scopes and entries cascade-delete with their execution.

use rusqlite::{params, Connection, OptionalExtension};

use super::StoreError;

/// Bump when any table definition changes.
pub const EXECLOG_SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS log_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        schema_version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS executions (
        execution_id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time INTEGER NOT NULL,
        end_time INTEGER,
        status_code TEXT NOT NULL,
        run_state_code TEXT NOT NULL,
        simulation INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS log_scopes (
        execution_id INTEGER NOT NULL
            REFERENCES executions(execution_id) ON DELETE CASCADE,
        scope_sequence INTEGER NOT NULL,
        parent_scope_sequence INTEGER,
        scope_name TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER,
        PRIMARY KEY (execution_id, scope_sequence),
        FOREIGN KEY (execution_id, parent_scope_sequence)
            REFERENCES log_scopes(execution_id, scope_sequence) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS log_entries (
        execution_id INTEGER NOT NULL,
        entry_sequence INTEGER NOT NULL,
        scope_sequence INTEGER NOT NULL,
        level INTEGER NOT NULL,
        text TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        PRIMARY KEY (execution_id, entry_sequence),
        FOREIGN KEY (execution_id, scope_sequence)
            REFERENCES log_scopes(execution_id, scope_sequence) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_log_entries_scope
        ON log_entries(execution_id, scope_sequence);

    CREATE INDEX IF NOT EXISTS idx_executions_start_time
        ON executions(start_time DESC);
";

/// Create tables if missing, then verify the stored schema version.
///
/// A fresh database gets [`EXECLOG_SCHEMA_VERSION`] recorded; an existing
/// database with a different version is rejected rather than migrated.
pub fn ensure_schema(conn: &Connection, path: &str) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_TABLES)?;

    let found: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM log_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match found {
        None => {
            conn.execute(
                "INSERT INTO log_meta (id, schema_version) VALUES (1, ?1)",
                params![EXECLOG_SCHEMA_VERSION],
            )?;
            Ok(())
        }
        Some(found) if found == EXECLOG_SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::SchemaMismatch {
            path: path.to_string(),
            found,
            expected: EXECLOG_SCHEMA_VERSION,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |_| Ok(true),
        )
        .optional()
        .unwrap()
        .unwrap_or(false)
    }

    #[test]
    fn test_ensure_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, ":memory:").unwrap();

        for table in ["log_meta", "executions", "log_scopes", "log_entries"] {
            assert!(table_exists(&conn, table), "{} table should exist", table);
        }

        let version: i64 = conn
            .query_row("SELECT schema_version FROM log_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, EXECLOG_SCHEMA_VERSION);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, ":memory:").unwrap();
        ensure_schema(&conn, ":memory:").unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM log_meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, "old.sqlite3").unwrap();
        conn.execute("UPDATE log_meta SET schema_version = 99 WHERE id = 1", [])
            .unwrap();

        let err = ensure_schema(&conn, "old.sqlite3").unwrap_err();
        match err {
            StoreError::SchemaMismatch {
                path,
                found,
                expected,
            } => {
                assert_eq!(path, "old.sqlite3");
                assert_eq!(found, 99);
                assert_eq!(expected, EXECLOG_SCHEMA_VERSION);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }
}
