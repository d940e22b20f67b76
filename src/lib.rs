//! execlog: asynchronous, hierarchically scoped execution logs
//!
//! A running job writes messages into nested scopes (phases) without ever
//! waiting on storage. Writes are buffered per scope, persisted in the
//! background, and the scope tree is completed bottom-up. Afterwards the
//! flat stored rows can be rebuilt into an ordered tree and rendered.
//!
//! # Layers
//!
//! - [`ExecutionLogger`] owns the per-execution sequence counters and the root scope
//! - [`BackgroundLogScope`] buffers, orders and persists one scope's messages
//! - [`LogStore`] is the storage contract; [`SqliteLogStore`] is the durable implementation
//! - [`LogForest`] reconstructs a stored log, [`view::render`] prints it
//! - [`ExecutionSession`] ties an execution record to its logger
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use execlog::{ExecutionSession, ExecutionStatus, LogForest, MessageLevel, SqliteLogStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteLogStore::open(Path::new("execlog.sqlite3"))?);
//! let session = ExecutionSession::start(store.clone(), false, None).await?;
//! let id = session.execution_id();
//!
//! let build = session.root().create_child("build")?;
//! build.log(MessageLevel::Warning, "disk low");
//! build.close();
//!
//! session.finish(ExecutionStatus::Normal).await?;
//!
//! let forest = LogForest::load(&*store, id).await?;
//! print!("{}", execlog::view::render::text(&forest));
//! # Ok(())
//! # }
//! ```
//!
//! Everything that schedules background writes must run inside a Tokio
//! runtime (or use [`ExecutionLogger::with_runtime`]).

pub mod config;
pub mod error;
pub mod error_codes;
pub mod execution;
pub mod level;
pub mod logger;
pub mod scope;
pub mod scoped;
pub mod session;
pub mod store;
pub mod view;

pub use config::LogConfig;
pub use error::LogError;
pub use execution::{ExecutionRecord, ExecutionStatus, RunState};
pub use level::{MessageLevel, ParseLevelError};
pub use logger::ExecutionLogger;
pub use scope::{BackgroundLogScope, ScopePhase, SharedResult};
pub use scoped::{LogMessage, ScopedLog};
pub use session::ExecutionSession;
pub use store::{
    ExecutionId, ExecutionLogRows, LogEntryRow, LogScopeRow, LogStore, MemoryLogStore,
    NewLogEntry, Sequence, SqliteLogStore, StoreError,
};
pub use view::{EntryNode, LogForest, LogNode, ScopeNode};
