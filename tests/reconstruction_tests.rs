//! Reconstruction tests over rows written by the in-memory store.
//!
//! Rows are written through the store contract directly so timestamps can be
//! chosen freely.

use chrono::{DateTime, Duration, TimeZone, Utc};
use execlog::view::render;
use execlog::{LogForest, LogNode, LogStore, MemoryLogStore, MessageLevel, NewLogEntry};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn labels(nodes: &[LogNode]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| match node {
            LogNode::Scope(s) => format!("S{}", s.sequence),
            LogNode::Entry(e) => format!("E{}", e.sequence),
        })
        .collect()
}

/// S0(seq 1, root, t0), S1(seq 2, parent 1, t1); E1 in S0 at t0+1ms,
/// E2 (error) in S1 at t1+1ms.
async fn two_scope_log(t1: DateTime<Utc>) -> LogForest {
    let store = MemoryLogStore::new();
    let ms = Duration::milliseconds(1);

    store.create_scope(1, 1, None, "", t0()).await.unwrap();
    store.create_scope(1, 2, Some(1), "S1", t1).await.unwrap();
    store
        .write_entries(
            1,
            1,
            &[NewLogEntry {
                sequence: 1,
                level: MessageLevel::Information,
                text: "E1".to_string(),
                timestamp: t0() + ms,
            }],
        )
        .await
        .unwrap();
    store
        .write_entries(
            1,
            2,
            &[NewLogEntry {
                sequence: 2,
                level: MessageLevel::Error,
                text: "E2".to_string(),
                timestamp: t1 + ms,
            }],
        )
        .await
        .unwrap();

    LogForest::load(&store, 1).await.unwrap()
}

#[tokio::test]
async fn test_entry_precedes_later_scope() {
    let forest = two_scope_log(t0() + Duration::seconds(1)).await;

    assert_eq!(forest.roots.len(), 1);
    let s0 = &forest.roots[0];
    assert_eq!(labels(&s0.children), vec!["E1", "S2"]);

    let s1 = match &s0.children[1] {
        LogNode::Scope(s) => s,
        other => panic!("expected scope, got {:?}", other),
    };
    assert_eq!(labels(&s1.children), vec!["E2"]);

    assert_eq!(render::errors(&forest), "ERROR: E2\n");
}

#[tokio::test]
async fn test_scope_precedes_entry_at_same_instant() {
    // t0 + 1ms == t1
    let forest = two_scope_log(t0() + Duration::milliseconds(1)).await;
    assert_eq!(labels(&forest.roots[0].children), vec!["S2", "E1"]);
    assert_eq!(render::errors(&forest).lines().count(), 1);
}

#[tokio::test]
async fn test_scope_precedes_older_entry_timestamp() {
    let forest = two_scope_log(t0()).await;
    assert_eq!(labels(&forest.roots[0].children), vec!["S2", "E1"]);
}

#[tokio::test]
async fn test_unknown_execution_is_empty() {
    let store = MemoryLogStore::new();
    let forest = LogForest::load(&store, 404).await.unwrap();
    assert!(forest.is_empty());
    assert_eq!(render::text(&forest), "");
}
