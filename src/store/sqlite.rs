//! SQLite-backed log store
//!
//! One rusqlite connection guarded by a single mutex. Every operation runs on
//! Tokio's blocking pool and takes the mutex for its whole duration, so the
//! mutex is the single writer for the database: callers may have any number
//! of operations in flight, the store executes them one at a time.
//!
//! Besides the [`LogStore`] contract this store owns execution records
//! (create, complete, list, delete, purge).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::schema;
use super::{
    from_stored_time, to_stored_time, ExecutionId, ExecutionLogRows, LogEntryRow, LogScopeRow,
    LogStore, NewLogEntry, Sequence, StoreError,
};
use crate::execution::{ExecutionRecord, ExecutionStatus, RunState};
use crate::level::MessageLevel;

const SELECT_EXECUTION: &str = "SELECT execution_id, start_time, end_time, status_code,
        run_state_code, simulation
     FROM executions";

type RawExecution = (i64, i64, Option<i64>, String, String, bool);

/// Durable execution log storage in a single SQLite file.
pub struct SqliteLogStore {
    path: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn, path.to_string_lossy().to_string())
    }

    /// Throwaway database, used when log storage is disabled and by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, path: String) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::ensure_schema(&conn, &path)?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database location as given to [`SqliteLogStore::open`].
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    // =========================================================================
    // Execution records
    // =========================================================================

    /// Insert a new execution and return its id.
    pub async fn create_execution(
        &self,
        start_time: DateTime<Utc>,
        status: ExecutionStatus,
        run_state: RunState,
        simulation: bool,
    ) -> Result<ExecutionId, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO executions (start_time, status_code, run_state_code, simulation)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_stored_time(start_time),
                    status.code(),
                    run_state.code(),
                    simulation
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Set the end time and final status; the run-state becomes completed.
    pub async fn complete_execution(
        &self,
        execution_id: ExecutionId,
        end_time: DateTime<Utc>,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE executions
                 SET end_time = ?2, status_code = ?3, run_state_code = ?4
                 WHERE execution_id = ?1",
                params![
                    execution_id,
                    to_stored_time(end_time),
                    status.code(),
                    RunState::Completed.code()
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::ExecutionNotFound(execution_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    &format!("{} WHERE execution_id = ?1", SELECT_EXECUTION),
                    params![execution_id],
                    read_raw_execution,
                )
                .optional()?;
            raw.map(execution_from_raw).transpose()
        })
        .await
    }

    /// All executions, most recent first.
    pub async fn list_executions(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY start_time DESC, execution_id DESC",
                SELECT_EXECUTION
            ))?;
            let raw = stmt
                .query_map([], read_raw_execution)?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(execution_from_raw).collect()
        })
        .await
    }

    /// The execution with the highest id, if any.
    pub async fn latest_execution(&self) -> Result<Option<ExecutionRecord>, StoreError> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("{} ORDER BY execution_id DESC LIMIT 1", SELECT_EXECUTION),
                    [],
                    read_raw_execution,
                )
                .optional()?;
            raw.map(execution_from_raw).transpose()
        })
        .await
    }

    /// Delete an execution with all of its scopes and entries.
    ///
    /// Returns whether a row was deleted.
    pub async fn delete_execution(&self, execution_id: ExecutionId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM executions WHERE execution_id = ?1",
                params![execution_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Delete every execution that started at least `days` days before `now`.
    ///
    /// Returns the purged records, most recent first.
    pub async fn purge_older_than(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let candidates = self.list_executions().await?;
        let purged: Vec<ExecutionRecord> = candidates
            .into_iter()
            .filter(|e| e.is_older_than(days, now))
            .collect();

        let ids: Vec<ExecutionId> = purged.iter().map(|e| e.execution_id).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM executions WHERE execution_id = ?1")?;
                for id in &ids {
                    stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        tracing::debug!(count = purged.len(), days, "purged executions");
        Ok(purged)
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn create_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        parent_scope_sequence: Option<Sequence>,
        name: &str,
        start_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO log_scopes
                    (execution_id, scope_sequence, parent_scope_sequence, scope_name, start_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    execution_id,
                    scope_sequence,
                    parent_scope_sequence,
                    name,
                    to_stored_time(start_time)
                ],
            )
            .map_err(|e| {
                map_scope_constraint(e, execution_id, scope_sequence, parent_scope_sequence)
            })?;
            Ok(())
        })
        .await
    }

    async fn complete_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE log_scopes SET end_time = ?3
                 WHERE execution_id = ?1 AND scope_sequence = ?2",
                params![execution_id, scope_sequence, to_stored_time(end_time)],
            )?;
            if changed == 0 {
                return Err(StoreError::ScopeNotFound {
                    execution_id,
                    scope_sequence,
                });
            }
            Ok(())
        })
        .await
    }

    async fn write_entries(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        entries: &[NewLogEntry],
    ) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO log_entries
                        (execution_id, entry_sequence, scope_sequence, level, text, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for entry in &entries {
                    stmt.execute(params![
                        execution_id,
                        entry.sequence,
                        scope_sequence,
                        entry.level.code(),
                        entry.text,
                        to_stored_time(entry.timestamp)
                    ])
                    .map_err(|e| map_missing_scope(e, execution_id, scope_sequence))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn read_execution_log(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionLogRows, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT scope_sequence, parent_scope_sequence, scope_name, start_time, end_time
                 FROM log_scopes
                 WHERE execution_id = ?1
                 ORDER BY scope_sequence",
            )?;
            let raw_scopes = stmt
                .query_map(params![execution_id], |row| {
                    Ok((
                        row.get::<_, Sequence>(0)?,
                        row.get::<_, Option<Sequence>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT entry_sequence, scope_sequence, level, text, timestamp
                 FROM log_entries
                 WHERE execution_id = ?1
                 ORDER BY entry_sequence",
            )?;
            let raw_entries = stmt
                .query_map(params![execution_id], |row| {
                    Ok((
                        row.get::<_, Sequence>(0)?,
                        row.get::<_, Sequence>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let scopes = raw_scopes
                .into_iter()
                .map(|(scope_sequence, parent, name, start, end)| {
                    Ok(LogScopeRow {
                        execution_id,
                        scope_sequence,
                        parent_scope_sequence: parent,
                        name,
                        start_time: from_stored_time(start)?,
                        end_time: end.map(from_stored_time).transpose()?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            let entries = raw_entries
                .into_iter()
                .map(|(entry_sequence, scope_sequence, level, text, timestamp)| {
                    Ok(LogEntryRow {
                        execution_id,
                        entry_sequence,
                        scope_sequence,
                        level: MessageLevel::from_code(level)
                            .ok_or(StoreError::UnknownLevel(level))?,
                        text,
                        timestamp: from_stored_time(timestamp)?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            Ok(ExecutionLogRows { scopes, entries })
        })
        .await
    }
}

fn read_raw_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExecution> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn execution_from_raw(raw: RawExecution) -> Result<ExecutionRecord, StoreError> {
    let (execution_id, start, end, status, run_state, simulation) = raw;
    Ok(ExecutionRecord {
        execution_id,
        start_time: from_stored_time(start)?,
        end_time: end.map(from_stored_time).transpose()?,
        status: ExecutionStatus::from_code(&status)?,
        run_state: RunState::from_code(&run_state)?,
        simulation,
    })
}

/// Translate key violations on scope inserts into typed errors.
///
/// A foreign key failure names the missing parent scope, or the missing
/// execution for a root scope.
fn map_scope_constraint(
    err: rusqlite::Error,
    execution_id: ExecutionId,
    scope_sequence: Sequence,
    parent_scope_sequence: Option<Sequence>,
) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return StoreError::DuplicateScope {
                    execution_id,
                    scope_sequence,
                };
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return match parent_scope_sequence {
                    Some(parent) => StoreError::ScopeNotFound {
                        execution_id,
                        scope_sequence: parent,
                    },
                    None => StoreError::ExecutionNotFound(execution_id),
                };
            }
            _ => {}
        }
    }
    StoreError::Sqlite(err)
}

/// Entry inserts only translate the missing-scope case; a duplicate entry
/// sequence stays a plain sqlite error.
fn map_missing_scope(
    err: rusqlite::Error,
    execution_id: ExecutionId,
    scope_sequence: Sequence,
) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            StoreError::ScopeNotFound {
                execution_id,
                scope_sequence,
            }
        }
        other => StoreError::Sqlite(other),
    }
}
