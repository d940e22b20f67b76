//! One logged execution, from record creation to final status.

use std::sync::Arc;

use crate::error::LogError;
use crate::execution::{ExecutionStatus, RunState};
use crate::level::MessageLevel;
use crate::logger::ExecutionLogger;
use crate::scoped::ScopedLog;
use crate::store::{stored_now, ExecutionId, LogStore, SqliteLogStore};

/// Execution record plus its logger.
///
/// [`ExecutionSession::finish`] must be called to flush the log and close
/// the record; a dropped session leaves the execution in the executing state.
pub struct ExecutionSession {
    store: Arc<SqliteLogStore>,
    logger: ExecutionLogger,
    root: ScopedLog,
}

impl ExecutionSession {
    /// Create the execution record (normal, executing) and start its logger.
    pub async fn start(
        store: Arc<SqliteLogStore>,
        simulation: bool,
        echo_level: Option<MessageLevel>,
    ) -> Result<Self, LogError> {
        let execution_id = store
            .create_execution(
                stored_now(),
                ExecutionStatus::Normal,
                RunState::Executing,
                simulation,
            )
            .await?;

        let log_store: Arc<dyn LogStore> = store.clone();
        let logger = ExecutionLogger::new(execution_id, log_store)?;
        let root = ScopedLog::new(logger.root_log_scope().clone(), echo_level);
        tracing::info!(execution_id, simulation, "execution started");

        Ok(Self {
            store,
            logger,
            root,
        })
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.logger.execution_id()
    }

    pub fn logger(&self) -> &ExecutionLogger {
        &self.logger
    }

    /// Handle on the root scope; child scopes hang off it.
    pub fn root(&self) -> &ScopedLog {
        &self.root
    }

    /// Wait for the whole log to be written, then complete the record.
    ///
    /// `outcome` is the caller's own verdict; the final status is the worse
    /// of it and the highest level logged. A failed log write makes the
    /// execution an error and is returned after the record is completed.
    pub async fn finish(self, outcome: ExecutionStatus) -> Result<ExecutionStatus, LogError> {
        let execution_id = self.execution_id();
        let log_result = self.logger.complete().await;

        let logged = ExecutionStatus::from_max_level(self.logger.root_log_scope().max_level());
        let status = match &log_result {
            Ok(()) => outcome.max(logged),
            Err(err) => {
                tracing::warn!(execution_id, error = %err, "execution log incomplete");
                ExecutionStatus::Error
            }
        };

        self.store
            .complete_execution(execution_id, stored_now(), status)
            .await?;
        tracing::info!(execution_id, %status, "execution completed");

        log_result.map(|()| status)
    }
}
