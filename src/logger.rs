//! Execution-wide logger state
//!
//! Owns the two per-execution sequence counters and the root scope. Scope
//! sequences and entry sequences are independent numbering spaces, both
//! starting at 1. The root scope always takes scope sequence 1.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::error::LogError;
use crate::scope::BackgroundLogScope;
use crate::store::{stored_now, ExecutionId, LogStore, Sequence};

/// State shared by every scope of one execution.
pub(crate) struct LoggerShared {
    pub(crate) execution_id: ExecutionId,
    pub(crate) store: Arc<dyn LogStore>,
    pub(crate) runtime: Handle,
    scope_sequence: AtomicU32,
    entry_sequence: AtomicU32,
}

impl LoggerShared {
    /// Counters wrap around on overflow.
    pub(crate) fn next_scope_sequence(&self) -> Sequence {
        self.scope_sequence
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    pub(crate) fn next_log_entry_sequence(&self) -> Sequence {
        self.entry_sequence
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }
}

/// Logger for a single execution.
///
/// The execution record must already exist and must not have any log data.
/// Construction allocates scope sequence 1 for the root scope and schedules
/// its creation in the store right away.
pub struct ExecutionLogger {
    shared: Arc<LoggerShared>,
    root: BackgroundLogScope,
}

impl ExecutionLogger {
    /// Create a logger that spawns its background writes on the current
    /// Tokio runtime.
    pub fn new(execution_id: ExecutionId, store: Arc<dyn LogStore>) -> Result<Self, LogError> {
        let runtime = Handle::try_current().map_err(|e| LogError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(execution_id, store, runtime))
    }

    /// Create a logger bound to an explicit runtime handle.
    ///
    /// Scopes of this logger may then be written from any thread.
    pub fn with_runtime(
        execution_id: ExecutionId,
        store: Arc<dyn LogStore>,
        runtime: Handle,
    ) -> Self {
        let shared = Arc::new(LoggerShared {
            execution_id,
            store,
            runtime,
            scope_sequence: AtomicU32::new(0),
            entry_sequence: AtomicU32::new(0),
        });
        let root = BackgroundLogScope::root(Arc::clone(&shared));
        tracing::debug!(execution_id, "execution logger started");

        Self { shared, root }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.shared.execution_id
    }

    pub fn root_log_scope(&self) -> &BackgroundLogScope {
        &self.root
    }

    pub fn next_scope_sequence(&self) -> Sequence {
        self.shared.next_scope_sequence()
    }

    pub fn next_log_entry_sequence(&self) -> Sequence {
        self.shared.next_log_entry_sequence()
    }

    /// Complete the root scope (and with it every open scope) and wait for
    /// all log data to reach the store.
    pub async fn complete(&self) -> Result<(), LogError> {
        self.root.complete_scope(stored_now()).await
    }
}
