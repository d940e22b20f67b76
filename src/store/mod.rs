//! Persistent log store contract
//!
//! The execution logger never talks to a database directly. Every durable
//! operation goes through [`LogStore`], and each implementation owns its own
//! serialization strategy: callers may overlap freely, the store decides how
//! many writes actually run at once.
//!
//! Two implementations ship with the crate:
//! - [`SqliteLogStore`]: durable, one connection behind a single writer lock
//! - [`MemoryLogStore`]: in-memory with a call journal, latency and fail points

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::{FailPoint, MemoryLogStore, StoreCall};
pub use sqlite::SqliteLogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::MessageLevel;

/// Per-execution sequence number (scope or entry space).
pub type Sequence = u32;

/// Execution identifier as assigned by the execution store.
pub type ExecutionId = i64;

/// A log entry waiting to be written for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub sequence: Sequence,
    pub level: MessageLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted scope row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogScopeRow {
    pub execution_id: ExecutionId,
    pub scope_sequence: Sequence,
    /// `None` only for the root scope
    pub parent_scope_sequence: Option<Sequence>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Persisted entry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryRow {
    pub execution_id: ExecutionId,
    pub entry_sequence: Sequence,
    pub scope_sequence: Sequence,
    pub level: MessageLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything stored for one execution, as flat rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogRows {
    pub scopes: Vec<LogScopeRow>,
    pub entries: Vec<LogEntryRow>,
}

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create data directory: {0}")]
    Io(#[from] std::io::Error),

    /// Database was created by a different schema revision
    #[error("execution log schema mismatch: {path} (found={found}, expected={expected})")]
    SchemaMismatch {
        path: String,
        found: i64,
        expected: i64,
    },

    #[error("scope {scope_sequence} does not exist for execution {execution_id}")]
    ScopeNotFound {
        execution_id: ExecutionId,
        scope_sequence: Sequence,
    },

    #[error("scope {scope_sequence} already exists for execution {execution_id}")]
    DuplicateScope {
        execution_id: ExecutionId,
        scope_sequence: Sequence,
    },

    #[error("execution {0} does not exist")]
    ExecutionNotFound(ExecutionId),

    #[error("stored message level {0} is not recognized")]
    UnknownLevel(i64),

    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("stored code {0:?} is not recognized")]
    UnknownCode(String),

    /// Injected by [`MemoryLogStore`] fail points
    #[error("injected failure: {0}")]
    Injected(String),

    #[error("store worker failed: {0}")]
    Worker(String),
}

/// Durable storage for scope and entry records, keyed by execution.
///
/// All four operations must be individually atomic and safe to invoke
/// concurrently.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist a new scope. `parent_scope_sequence` is `None` only for the root.
    async fn create_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        parent_scope_sequence: Option<Sequence>,
        name: &str,
        start_time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record the end time of an existing scope.
    async fn complete_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Append a batch of entries to an existing scope, in the given order.
    async fn write_entries(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        entries: &[NewLogEntry],
    ) -> Result<(), StoreError>;

    /// Read every scope and entry row of one execution.
    async fn read_execution_log(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionLogRows, StoreError>;
}

/// Current time truncated to stored precision, so in-memory and persisted
/// timestamps compare equal.
pub fn stored_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Convert a UTC timestamp to the stored integer form (microseconds).
pub(crate) fn to_stored_time(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Convert a stored integer timestamp back to UTC.
pub(crate) fn from_stored_time(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or(StoreError::InvalidTimestamp(micros))
}
