//! Background log scopes
//!
//! A [`BackgroundLogScope`] is one node of the execution's scope tree. Callers
//! never wait on the store: every durable operation runs as a spawned task
//! whose result is held as a shared future.
//!
//! Per scope:
//! - `created`: resolves once the scope row exists in the store. A child's
//!   creation first waits on its parent's `created`.
//! - `writer`: the single in-flight entry writer. Messages written while it
//!   runs are buffered and drained by the same task in follow-up batches.
//! - `completion`: waits for the writer and every child's completion, then
//!   writes this scope's end time.
//!
//! Lifecycle: `Created -> Active -> Completing -> Completed`. Messages and
//! children are rejected as soon as completion has been requested.

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

use crate::error::LogError;
use crate::level::MessageLevel;
use crate::logger::LoggerShared;
use crate::store::{stored_now, ExecutionId, NewLogEntry, Sequence};

/// Result of a background operation, awaitable by any number of callers.
pub type SharedResult<T> = Shared<BoxFuture<'static, Result<T, LogError>>>;

fn spawn_shared<T, F>(runtime: &Handle, fut: F) -> SharedResult<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T, LogError>> + Send + 'static,
{
    let task = runtime.spawn(fut);
    async move {
        match task.await {
            Ok(result) => result,
            Err(err) => Err(LogError::Task(err.to_string())),
        }
    }
    .boxed()
    .shared()
}

/// Observable lifecycle phase of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePhase {
    /// Scope row not yet written
    Created,
    /// Accepting messages and children
    Active,
    /// Completion requested, waiting on writes and descendants
    Completing,
    /// Terminal
    Completed,
}

impl fmt::Display for ScopePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopePhase::Created => "created",
            ScopePhase::Active => "active",
            ScopePhase::Completing => "completing",
            ScopePhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct ScopeState {
    /// Entries waiting for the writer; non-empty implies `writer.is_some()`
    pending: Vec<NewLogEntry>,
    writer: Option<SharedResult<()>>,
    /// First failed entry batch of this scope
    write_error: Option<LogError>,
    children: Vec<BackgroundLogScope>,
    end_time: Option<DateTime<Utc>>,
    completion: Option<SharedResult<()>>,
    /// Own entries, plus completed children once merged
    max_level: Option<MessageLevel>,
}

struct ScopeInner {
    logger: Arc<LoggerShared>,
    name: String,
    sequence: Sequence,
    parent_sequence: Option<Sequence>,
    start_time: DateTime<Utc>,
    created: SharedResult<Sequence>,
    persisted: Arc<AtomicBool>,
    finished: AtomicBool,
    state: Mutex<ScopeState>,
}

/// Handle to one scope of an execution log. Cloning is cheap.
#[derive(Clone)]
pub struct BackgroundLogScope {
    inner: Arc<ScopeInner>,
}

impl BackgroundLogScope {
    pub(crate) fn root(logger: Arc<LoggerShared>) -> Self {
        let sequence = logger.next_scope_sequence();
        let start_time = stored_now();
        let persisted = Arc::new(AtomicBool::new(false));

        let created = {
            let logger = Arc::clone(&logger);
            let persisted = Arc::clone(&persisted);
            let runtime = logger.runtime.clone();
            spawn_shared(&runtime, async move {
                logger
                    .store
                    .create_scope(logger.execution_id, sequence, None, "", start_time)
                    .await
                    .map_err(LogError::store)?;
                persisted.store(true, Ordering::Release);
                Ok(sequence)
            })
        };

        Self::from_parts(logger, String::new(), sequence, None, start_time, created, persisted)
    }

    fn from_parts(
        logger: Arc<LoggerShared>,
        name: String,
        sequence: Sequence,
        parent_sequence: Option<Sequence>,
        start_time: DateTime<Utc>,
        created: SharedResult<Sequence>,
        persisted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                logger,
                name,
                sequence,
                parent_sequence,
                start_time,
                created,
                persisted,
                finished: AtomicBool::new(false),
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn sequence(&self) -> Sequence {
        self.inner.sequence
    }

    /// `None` only for the root scope.
    pub fn parent_sequence(&self) -> Option<Sequence> {
        self.inner.parent_sequence
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.inner.logger.execution_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.inner.start_time
    }

    /// End time recorded by the first completion request.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().end_time
    }

    /// Highest level seen in this scope and in its completed descendants.
    pub fn max_level(&self) -> Option<MessageLevel> {
        self.inner.lock_state().max_level
    }

    /// Whether completion has been requested. The scope may still be
    /// [`ScopePhase::Completing`]; see [`BackgroundLogScope::phase`].
    pub fn is_completion_requested(&self) -> bool {
        self.inner.lock_state().end_time.is_some()
    }

    pub fn phase(&self) -> ScopePhase {
        let completing = self.inner.lock_state().completion.is_some();
        if self.inner.finished.load(Ordering::Acquire) {
            ScopePhase::Completed
        } else if completing {
            ScopePhase::Completing
        } else if self.inner.persisted.load(Ordering::Acquire) {
            ScopePhase::Active
        } else {
            ScopePhase::Created
        }
    }

    /// Resolves to this scope's sequence once its row exists in the store.
    pub fn persisted(&self) -> SharedResult<Sequence> {
        self.inner.created.clone()
    }

    /// Queue a message for this scope.
    ///
    /// The entry sequence is allocated before returning, so messages of one
    /// scope are stored in call order. Store failures are not reported here;
    /// they surface from [`BackgroundLogScope::complete_scope`].
    pub fn write_message(
        &self,
        level: MessageLevel,
        text: impl Into<String>,
    ) -> Result<(), LogError> {
        let mut state = self.inner.lock_state();
        if state.end_time.is_some() {
            return Err(self.completed_error());
        }

        let sequence = self.inner.logger.next_log_entry_sequence();
        state.max_level = state.max_level.max(Some(level));
        state.pending.push(NewLogEntry {
            sequence,
            level,
            text: text.into(),
            timestamp: stored_now(),
        });

        if state.writer.is_none() {
            let inner = Arc::clone(&self.inner);
            state.writer = Some(spawn_shared(&self.inner.logger.runtime, async move {
                inner.drain().await
            }));
        }
        Ok(())
    }

    /// Create a nested scope.
    ///
    /// The child is usable immediately; its row is written once this
    /// scope's row exists.
    pub fn create_child_scope(
        &self,
        name: impl Into<String>,
    ) -> Result<BackgroundLogScope, LogError> {
        let name = name.into();
        let mut state = self.inner.lock_state();
        if state.end_time.is_some() {
            return Err(self.completed_error());
        }

        let logger = Arc::clone(&self.inner.logger);
        let sequence = logger.next_scope_sequence();
        let start_time = stored_now();
        let persisted = Arc::new(AtomicBool::new(false));

        let created = {
            let logger = Arc::clone(&logger);
            let persisted = Arc::clone(&persisted);
            let parent_created = self.inner.created.clone();
            let name = name.clone();
            spawn_shared(&self.inner.logger.runtime, async move {
                let parent = parent_created.await?;
                logger
                    .store
                    .create_scope(logger.execution_id, sequence, Some(parent), &name, start_time)
                    .await
                    .map_err(LogError::store)?;
                persisted.store(true, Ordering::Release);
                Ok(sequence)
            })
        };

        let child = Self::from_parts(
            logger,
            name,
            sequence,
            Some(self.inner.sequence),
            start_time,
            created,
            persisted,
        );
        state.children.push(child.clone());

        tracing::debug!(
            execution_id = self.execution_id(),
            parent = self.inner.sequence,
            sequence,
            name = child.name(),
            "log scope created"
        );
        Ok(child)
    }

    /// Complete this scope and, recursively, all of its children.
    ///
    /// Idempotent: later calls return the first call's result. The end time
    /// is clamped so it never precedes the start time. The returned future
    /// resolves after every descendant has completed and this scope's end
    /// time has been written.
    pub fn complete_scope(&self, end_time: DateTime<Utc>) -> SharedResult<()> {
        let mut state = self.inner.lock_state();
        if let Some(completion) = &state.completion {
            return completion.clone();
        }

        let end_time = end_time.max(self.inner.start_time);
        state.end_time = Some(end_time);
        let writer = state.writer.clone();
        let children = state.children.clone();

        let inner = Arc::clone(&self.inner);
        let completion = spawn_shared(&self.inner.logger.runtime, async move {
            let result = inner.finish(end_time, writer, children).await;
            inner.finished.store(true, Ordering::Release);
            result
        });
        state.completion = Some(completion.clone());
        completion
    }

    /// Request completion without waiting for it.
    pub fn complete_log_scope(&self) {
        drop(self.complete_scope(stored_now()));
    }

    fn completed_error(&self) -> LogError {
        LogError::ScopeCompleted {
            name: self.inner.name.clone(),
        }
    }
}

impl fmt::Debug for BackgroundLogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundLogScope")
            .field("execution_id", &self.execution_id())
            .field("sequence", &self.inner.sequence)
            .field("parent_sequence", &self.inner.parent_sequence)
            .field("name", &self.inner.name)
            .field("phase", &self.phase())
            .finish()
    }
}

impl ScopeInner {
    fn lock_state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write pending batches until the buffer is empty, then go idle.
    ///
    /// A failed batch is dropped and the loop keeps draining so later
    /// batches still get their chance; the first failure is kept for
    /// completion.
    async fn drain(&self) -> Result<(), LogError> {
        let mut failure = self.created.clone().await.err();

        loop {
            let batch = {
                let mut state = self.lock_state();
                if state.pending.is_empty() {
                    state.writer = None;
                    if state.write_error.is_none() {
                        state.write_error = failure.clone();
                    }
                    break;
                }
                std::mem::take(&mut state.pending)
            };

            if failure.is_some() && !self.persisted.load(Ordering::Acquire) {
                // scope row never made it to the store
                continue;
            }

            let result = self
                .logger
                .store
                .write_entries(self.logger.execution_id, self.sequence, &batch)
                .await;
            if let Err(err) = result {
                tracing::warn!(
                    execution_id = self.logger.execution_id,
                    scope = self.sequence,
                    entries = batch.len(),
                    error = %err,
                    "failed to write log entries"
                );
                if failure.is_none() {
                    failure = Some(LogError::store(err));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn finish(
        &self,
        end_time: DateTime<Utc>,
        writer: Option<SharedResult<()>>,
        children: Vec<BackgroundLogScope>,
    ) -> Result<(), LogError> {
        let own_writes = async move {
            match writer {
                Some(writer) => writer.await,
                None => Ok(()),
            }
        };
        let (writer_result, child_results) = futures::join!(
            own_writes,
            join_all(children.iter().map(|child| child.complete_scope(end_time)))
        );

        let child_max = children.iter().filter_map(|child| child.max_level()).max();
        let write_error = {
            let mut state = self.lock_state();
            state.max_level = state.max_level.max(child_max);
            state.write_error.clone()
        };

        let failure = write_error
            .or(writer_result.err())
            .or_else(|| child_results.into_iter().find_map(Result::err));
        if let Some(err) = failure {
            return Err(err);
        }

        self.created.clone().await?;
        self.logger
            .store
            .complete_scope(self.logger.execution_id, self.sequence, end_time)
            .await
            .map_err(LogError::store)?;

        tracing::debug!(
            execution_id = self.logger.execution_id,
            sequence = self.sequence,
            "log scope completed"
        );
        Ok(())
    }
}
