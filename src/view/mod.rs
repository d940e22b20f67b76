//! Log reconstruction
//!
//! Turns the flat scope and entry rows of one execution into a forest.
//!
//! Within a scope, child scopes keep scope-sequence order and entries keep
//! entry-sequence order. The two kinds come from independent counters, so
//! they are interleaved by time: an entry goes before a sibling scope only
//! when its timestamp is strictly earlier than the scope's start time. This
//! is an approximation; entries and scopes started within one clock tick
//! can come out in the wrong relative order.
//!
//! Scopes whose parent row is missing and entries whose scope row is missing
//! are not part of the forest.

pub mod render;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::level::MessageLevel;
use crate::store::{
    ExecutionId, ExecutionLogRows, LogEntryRow, LogScopeRow, LogStore, Sequence, StoreError,
};

/// A node in the reconstructed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogNode {
    Scope(ScopeNode),
    Entry(EntryNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeNode {
    pub sequence: Sequence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_sequence: Option<Sequence>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LogNode>,
}

impl ScopeNode {
    /// Time spent in the scope; open scopes are measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// Highest level among all entries below this scope.
    pub fn max_level(&self) -> Option<MessageLevel> {
        self.children
            .iter()
            .filter_map(|child| match child {
                LogNode::Scope(scope) => scope.max_level(),
                LogNode::Entry(entry) => Some(entry.level),
            })
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryNode {
    pub sequence: Sequence,
    pub scope_sequence: Sequence,
    pub level: MessageLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Reconstructed log of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogForest {
    /// Scopes without a parent, by scope sequence
    pub roots: Vec<ScopeNode>,
}

impl LogForest {
    /// Build the forest from stored rows in one indexing pass.
    pub fn build(rows: &ExecutionLogRows) -> Self {
        let mut scopes_by_parent: HashMap<Option<Sequence>, Vec<&LogScopeRow>> = HashMap::new();
        let mut entries_by_scope: HashMap<Sequence, Vec<&LogEntryRow>> = HashMap::new();

        for scope in &rows.scopes {
            scopes_by_parent
                .entry(scope.parent_scope_sequence)
                .or_default()
                .push(scope);
        }
        for entry in &rows.entries {
            entries_by_scope
                .entry(entry.scope_sequence)
                .or_default()
                .push(entry);
        }

        for scopes in scopes_by_parent.values_mut() {
            scopes.sort_by_key(|s| s.scope_sequence);
        }
        for entries in entries_by_scope.values_mut() {
            entries.sort_by_key(|e| e.entry_sequence);
        }

        let index = Index {
            scopes_by_parent,
            entries_by_scope,
        };
        let roots = index
            .child_scopes(None)
            .iter()
            .map(|row| index.build_scope(row))
            .collect();

        Self { roots }
    }

    /// Read and reconstruct one execution.
    pub async fn load(
        store: &dyn LogStore,
        execution_id: ExecutionId,
    ) -> Result<Self, StoreError> {
        let rows = store.read_execution_log(execution_id).await?;
        Ok(Self::build(&rows))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Entries at or above `level`, in display order.
    pub fn entries_at_least(&self, level: MessageLevel) -> Vec<&EntryNode> {
        let mut found = Vec::new();
        for root in &self.roots {
            collect_entries(root, level, &mut found);
        }
        found
    }

    /// Warnings and errors, in display order.
    pub fn problems(&self) -> Vec<&EntryNode> {
        self.entries_at_least(MessageLevel::Debug)
            .into_iter()
            .filter(|entry| entry.level.is_problem())
            .collect()
    }

    pub fn max_level(&self) -> Option<MessageLevel> {
        self.roots.iter().filter_map(ScopeNode::max_level).max()
    }
}

struct Index<'a> {
    scopes_by_parent: HashMap<Option<Sequence>, Vec<&'a LogScopeRow>>,
    entries_by_scope: HashMap<Sequence, Vec<&'a LogEntryRow>>,
}

impl<'a> Index<'a> {
    fn child_scopes(&self, parent: Option<Sequence>) -> &[&'a LogScopeRow] {
        self.scopes_by_parent
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn entries(&self, scope: Sequence) -> &[&'a LogEntryRow] {
        self.entries_by_scope
            .get(&scope)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn build_scope(&self, row: &LogScopeRow) -> ScopeNode {
        let scopes: Vec<ScopeNode> = self
            .child_scopes(Some(row.scope_sequence))
            .iter()
            .map(|child| self.build_scope(child))
            .collect();
        let entries: Vec<EntryNode> = self
            .entries(row.scope_sequence)
            .iter()
            .map(|entry| EntryNode {
                sequence: entry.entry_sequence,
                scope_sequence: entry.scope_sequence,
                level: entry.level,
                text: entry.text.clone(),
                timestamp: entry.timestamp,
            })
            .collect();

        ScopeNode {
            sequence: row.scope_sequence,
            parent_sequence: row.parent_scope_sequence,
            name: row.name.clone(),
            start_time: row.start_time,
            end_time: row.end_time,
            children: interleave(scopes, entries),
        }
    }
}

/// Merge two sequence-ordered lists, taking an entry only when it is
/// strictly older than the next scope.
fn interleave(scopes: Vec<ScopeNode>, entries: Vec<EntryNode>) -> Vec<LogNode> {
    let mut merged = Vec::with_capacity(scopes.len() + entries.len());
    let mut scopes = scopes.into_iter().peekable();
    let mut entries = entries.into_iter().peekable();

    loop {
        let entry_first = match (scopes.peek(), entries.peek()) {
            (Some(scope), Some(entry)) => entry.timestamp < scope.start_time,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };

        let next = if entry_first {
            entries.next().map(LogNode::Entry)
        } else {
            scopes.next().map(LogNode::Scope)
        };
        merged.extend(next);
    }

    merged
}

fn collect_entries<'a>(
    scope: &'a ScopeNode,
    level: MessageLevel,
    found: &mut Vec<&'a EntryNode>,
) {
    for child in &scope.children {
        match child {
            LogNode::Scope(inner) => collect_entries(inner, level, found),
            LogNode::Entry(entry) if entry.level >= level => found.push(entry),
            LogNode::Entry(_) => {}
        }
    }
}
