//! In-memory log store
//!
//! Keeps rows in ordered maps and journals every call it executes. Calls run
//! one at a time behind an async writer lock, mirroring the single writer of
//! the SQLite store. Optional per-call latency and fail points make it the
//! store of choice for exercising the scope engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    ExecutionId, ExecutionLogRows, LogEntryRow, LogScopeRow, LogStore, NewLogEntry, Sequence,
    StoreError,
};

/// One executed store call, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateScope {
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        parent_scope_sequence: Option<Sequence>,
        name: String,
    },
    CompleteScope {
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        end_time: DateTime<Utc>,
    },
    WriteEntries {
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        entry_sequences: Vec<Sequence>,
    },
}

impl StoreCall {
    pub fn scope_sequence(&self) -> Sequence {
        match self {
            StoreCall::CreateScope { scope_sequence, .. }
            | StoreCall::CompleteScope { scope_sequence, .. }
            | StoreCall::WriteEntries { scope_sequence, .. } => *scope_sequence,
        }
    }
}

/// Make the next matching call fail with [`StoreError::Injected`].
///
/// Each variant names the scope sequence it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateScope(Sequence),
    CompleteScope(Sequence),
    WriteEntries(Sequence),
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<StoreCall>,
    scopes: BTreeMap<(ExecutionId, Sequence), LogScopeRow>,
    entries: BTreeMap<(ExecutionId, Sequence), LogEntryRow>,
    fail_points: HashSet<FailPoint>,
}

/// Log store backed by process memory.
#[derive(Default)]
pub struct MemoryLogStore {
    writer: tokio::sync::Mutex<()>,
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` while holding the writer lock.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Arm a one-shot fail point.
    pub fn fail_on(&self, point: FailPoint) {
        self.lock_state().fail_points.insert(point);
    }

    /// Journal of executed calls (failed calls included).
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock_state().calls.clone()
    }

    pub fn scopes(&self) -> Vec<LogScopeRow> {
        self.lock_state().scopes.values().cloned().collect()
    }

    /// All stored entries ordered by (execution, entry sequence).
    pub fn entries(&self) -> Vec<LogEntryRow> {
        self.lock_state().entries.values().cloned().collect()
    }

    pub fn entries_for_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
    ) -> Vec<LogEntryRow> {
        self.lock_state()
            .entries
            .values()
            .filter(|e| e.execution_id == execution_id && e.scope_sequence == scope_sequence)
            .cloned()
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize with other calls, apply latency, journal the call and
    /// consume a matching fail point. Returns the held writer guard.
    async fn begin(
        &self,
        call: StoreCall,
        point: FailPoint,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, StoreError> {
        let guard = self.writer.lock().await;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock_state();
        state.calls.push(call);
        if state.fail_points.remove(&point) {
            return Err(StoreError::Injected(format!("{:?}", point)));
        }
        Ok(guard)
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn create_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        parent_scope_sequence: Option<Sequence>,
        name: &str,
        start_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let call = StoreCall::CreateScope {
            execution_id,
            scope_sequence,
            parent_scope_sequence,
            name: name.to_string(),
        };
        let _writer = self
            .begin(call, FailPoint::CreateScope(scope_sequence))
            .await?;

        let mut state = self.lock_state();
        if state.scopes.contains_key(&(execution_id, scope_sequence)) {
            return Err(StoreError::DuplicateScope {
                execution_id,
                scope_sequence,
            });
        }
        if let Some(parent) = parent_scope_sequence {
            if !state.scopes.contains_key(&(execution_id, parent)) {
                return Err(StoreError::ScopeNotFound {
                    execution_id,
                    scope_sequence: parent,
                });
            }
        }

        state.scopes.insert(
            (execution_id, scope_sequence),
            LogScopeRow {
                execution_id,
                scope_sequence,
                parent_scope_sequence,
                name: name.to_string(),
                start_time,
                end_time: None,
            },
        );
        Ok(())
    }

    async fn complete_scope(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let call = StoreCall::CompleteScope {
            execution_id,
            scope_sequence,
            end_time,
        };
        let _writer = self
            .begin(call, FailPoint::CompleteScope(scope_sequence))
            .await?;

        let mut state = self.lock_state();
        match state.scopes.get_mut(&(execution_id, scope_sequence)) {
            Some(scope) => {
                scope.end_time = Some(end_time);
                Ok(())
            }
            None => Err(StoreError::ScopeNotFound {
                execution_id,
                scope_sequence,
            }),
        }
    }

    async fn write_entries(
        &self,
        execution_id: ExecutionId,
        scope_sequence: Sequence,
        entries: &[NewLogEntry],
    ) -> Result<(), StoreError> {
        let call = StoreCall::WriteEntries {
            execution_id,
            scope_sequence,
            entry_sequences: entries.iter().map(|e| e.sequence).collect(),
        };
        let _writer = self
            .begin(call, FailPoint::WriteEntries(scope_sequence))
            .await?;

        let mut state = self.lock_state();
        if !state.scopes.contains_key(&(execution_id, scope_sequence)) {
            return Err(StoreError::ScopeNotFound {
                execution_id,
                scope_sequence,
            });
        }
        for entry in entries {
            state.entries.insert(
                (execution_id, entry.sequence),
                LogEntryRow {
                    execution_id,
                    entry_sequence: entry.sequence,
                    scope_sequence,
                    level: entry.level,
                    text: entry.text.clone(),
                    timestamp: entry.timestamp,
                },
            );
        }
        Ok(())
    }

    async fn read_execution_log(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionLogRows, StoreError> {
        let state = self.lock_state();
        Ok(ExecutionLogRows {
            scopes: state
                .scopes
                .values()
                .filter(|s| s.execution_id == execution_id)
                .cloned()
                .collect(),
            entries: state
                .entries
                .values()
                .filter(|e| e.execution_id == execution_id)
                .cloned()
                .collect(),
        })
    }
}
