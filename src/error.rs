//! Errors surfaced by the execution logger.
//!
//! [`LogError`] is `Clone` because one scope completion result is shared by
//! every caller awaiting it (and by every ancestor scope).

use std::sync::Arc;

use crate::error_codes::{
    XLOG_STO_001_STORE_FAILED, XLOG_TSK_001_TASK_FAILED, XLOG_TSK_002_NO_RUNTIME,
    XLOG_USE_001_SCOPE_COMPLETED,
};
use crate::store::StoreError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    /// Programming error: the scope no longer accepts messages or children
    #[error("log scope \"{name}\" has already been completed")]
    ScopeCompleted { name: String },

    #[error("log store operation failed: {0}")]
    Store(Arc<StoreError>),

    #[error("background log task failed: {0}")]
    Task(String),

    #[error("no Tokio runtime available for background log writes: {0}")]
    NoRuntime(String),
}

impl LogError {
    pub(crate) fn store(err: StoreError) -> Self {
        LogError::Store(Arc::new(err))
    }

    /// Stable error code, see [`crate::error_codes`].
    pub fn code(&self) -> &'static str {
        match self {
            LogError::ScopeCompleted { .. } => XLOG_USE_001_SCOPE_COMPLETED,
            LogError::Store(_) => XLOG_STO_001_STORE_FAILED,
            LogError::Task(_) => XLOG_TSK_001_TASK_FAILED,
            LogError::NoRuntime(_) => XLOG_TSK_002_NO_RUNTIME,
        }
    }

    /// Whether this is a misuse of the API rather than a runtime failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, LogError::ScopeCompleted { .. })
    }

    /// The underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            LogError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for LogError {
    fn from(err: StoreError) -> Self {
        LogError::store(err)
    }
}
