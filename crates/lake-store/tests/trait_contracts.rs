//! Trait contract tests for ArchiveLog, StoreAdapter, and Playbook.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using the in-memory implementations. Any conforming backend must pass
//! these.

use chrono::Utc;
use lake_store::fakes::{MemoryArchiveLog, MemoryPlaybook, MemoryStoreAdapter};
use lake_store::{
    ArchiveLog, ContextItem, Fingerprint, HealthStatus, IngestionId, ItemStatus, Playbook,
    PlaybookLesson, QueryParams, RecordPayload, StoreAdapter, StoreError, StoreKind, StoreRecord,
};

fn item(project: &str, source: &str, payload: &[u8]) -> ContextItem {
    ContextItem::new(project, "test-agent", source, payload.to_vec())
}

fn record(project: &str, key: &str, text: &str) -> StoreRecord {
    let fingerprint = Fingerprint::from_parts(project, "logs", text.as_bytes());
    StoreRecord {
        key: key.to_string(),
        project_id: project.to_string(),
        fingerprint,
        item_id: IngestionId::new(),
        agent_name: "test-agent".to_string(),
        source: "logs".to_string(),
        tags: Vec::new(),
        token_estimate: text.len() / 4,
        created_at: Utc::now(),
        payload: RecordPayload::Expanded {
            text: text.to_string(),
        },
    }
}

// ===========================================================================
// ArchiveLog contract tests
// ===========================================================================

#[tokio::test]
async fn archive_append_and_get_round_trip() {
    let log = MemoryArchiveLog::new();
    let it = item("p1", "logs", b"hello");
    let id = log.append(it.clone()).await.unwrap();

    let back = log.get(&id).await.unwrap();
    assert_eq!(back.payload, b"hello");
    assert_eq!(back.status, ItemStatus::Archived);
}

#[tokio::test]
async fn archive_append_idempotent_on_identity() {
    let log = MemoryArchiveLog::new();
    let first = log.append(item("p1", "logs", b"dup")).await.unwrap();
    let second = log.append(item("p1", "logs", b"dup")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn archive_duplicate_append_counts_occurrences() {
    let log = MemoryArchiveLog::new();
    let mut id = None;
    for _ in 0..5 {
        id = Some(log.append(item("p1", "logs", b"repeat")).await.unwrap());
    }
    let held = log.get(&id.unwrap()).await.unwrap();
    assert_eq!(held.occurrences, 5);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn archive_lists_distinct_projects_sorted() {
    let log = MemoryArchiveLog::new();
    log.append(item("beta", "logs", b"x")).await.unwrap();
    log.append(item("alpha", "logs", b"y")).await.unwrap();
    log.append(item("beta", "logs", b"z")).await.unwrap();

    assert_eq!(log.projects().await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn archive_same_payload_distinct_projects() {
    let log = MemoryArchiveLog::new();
    let a = log.append(item("p1", "logs", b"shared")).await.unwrap();
    let b = log.append(item("p2", "logs", b"shared")).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn archive_get_by_fingerprint() {
    let log = MemoryArchiveLog::new();
    let it = item("p1", "logs", b"findme");
    let fp = it.fingerprint.clone();
    log.append(it).await.unwrap();

    let found = log.get_by_fingerprint("p1", &fp).await.unwrap();
    assert!(found.is_some());
    let missing = log.get_by_fingerprint("p2", &fp).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn archive_get_not_found() {
    let log = MemoryArchiveLog::new();
    let err = log.get(&IngestionId::new()).await.unwrap_err();
    assert!(matches!(err, StoreError::ItemNotFound { .. }));
}

#[tokio::test]
async fn archive_status_transitions() {
    let log = MemoryArchiveLog::new();
    let id = log.append(item("p1", "logs", b"x")).await.unwrap();

    log.set_status(&id, ItemStatus::DeadLettered, Some("boom".into()))
        .await
        .unwrap();
    let it = log.get(&id).await.unwrap();
    assert_eq!(it.status, ItemStatus::DeadLettered);
    assert_eq!(it.status_reason.as_deref(), Some("boom"));

    // Replay path: dead-lettered items may become routed.
    log.set_status(&id, ItemStatus::Routed, None).await.unwrap();
    assert_eq!(log.get(&id).await.unwrap().status, ItemStatus::Routed);
}

#[tokio::test]
async fn archive_routed_item_can_dead_letter_again() {
    let log = MemoryArchiveLog::new();
    let id = log.append(item("p1", "logs", b"x")).await.unwrap();
    log.set_status(&id, ItemStatus::Routed, None).await.unwrap();

    // A re-enqueued duplicate that exhausts retries dead-letters the item.
    log.set_status(&id, ItemStatus::DeadLettered, Some("late failure".into()))
        .await
        .unwrap();
    assert_eq!(log.get(&id).await.unwrap().status, ItemStatus::DeadLettered);
}

#[tokio::test]
async fn archive_rejects_return_to_archived() {
    let log = MemoryArchiveLog::new();
    let id = log.append(item("p1", "logs", b"x")).await.unwrap();
    log.set_status(&id, ItemStatus::Routed, None).await.unwrap();

    let err = log
        .set_status(&id, ItemStatus::Archived, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn archive_list_by_status() {
    let log = MemoryArchiveLog::new();
    let a = log.append(item("p1", "logs", b"a")).await.unwrap();
    log.append(item("p1", "logs", b"b")).await.unwrap();
    log.set_status(&a, ItemStatus::Routed, None).await.unwrap();

    let archived = log.list_status("p1", ItemStatus::Archived).await.unwrap();
    assert_eq!(archived.len(), 1);
    let routed = log.list_status("p1", ItemStatus::Routed).await.unwrap();
    assert_eq!(routed.len(), 1);
}

// ===========================================================================
// StoreAdapter contract tests
// ===========================================================================

#[tokio::test]
async fn adapter_write_is_upsert_on_key() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Memory);
    let ack1 = adapter.write(record("p1", "k1", "first")).await.unwrap();
    assert!(!ack1.replaced);

    let ack2 = adapter.write(record("p1", "k1", "second")).await.unwrap();
    assert!(ack2.replaced);
    assert_eq!(adapter.len(), 1);

    let records = adapter.list_project("p1").await.unwrap();
    assert_eq!(records[0].payload.serving_text(), "second");
}

#[tokio::test]
async fn adapter_query_scores_term_overlap() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Memory);
    adapter
        .write(record("p1", "k1", "database timeout while saving"))
        .await
        .unwrap();
    adapter
        .write(record("p1", "k2", "user logged in"))
        .await
        .unwrap();

    let params = QueryParams::new("p1", "test-agent", "database timeout");
    let candidates = adapter.query(&params).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].record.key, "k1");
    assert!((candidates[0].score - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn adapter_query_partial_match_scores_fraction() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Vector);
    adapter
        .write(record("p1", "k1", "database error"))
        .await
        .unwrap();

    let params = QueryParams::new("p1", "test-agent", "database missing");
    let candidates = adapter.query(&params).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert!((candidates[0].score - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn adapter_query_scoped_to_project() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Memory);
    adapter.write(record("p1", "k1", "shared text")).await.unwrap();
    adapter.write(record("p2", "k2", "shared text")).await.unwrap();

    let params = QueryParams::new("p1", "test-agent", "shared");
    let candidates = adapter.query(&params).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].record.project_id, "p1");
}

#[tokio::test]
async fn adapter_query_respects_limit() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Memory);
    for i in 0..10 {
        adapter
            .write(record("p1", &format!("k{i}"), "common text"))
            .await
            .unwrap();
    }
    let params = QueryParams::new("p1", "test-agent", "common").with_limit(3);
    let candidates = adapter.query(&params).await.unwrap();
    assert_eq!(candidates.len(), 3);
}

#[tokio::test]
async fn adapter_remove_noop_for_missing() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Graph);
    adapter.remove("nope").await.unwrap();
    assert!(adapter.is_empty());
}

#[tokio::test]
async fn adapter_reports_healthy() {
    let adapter = MemoryStoreAdapter::new(StoreKind::Vector);
    assert_eq!(adapter.health().await, HealthStatus::Ok);
    assert_eq!(adapter.kind(), StoreKind::Vector);
}

// ===========================================================================
// Playbook contract tests
// ===========================================================================

#[tokio::test]
async fn playbook_append_only_ordering() {
    let playbook = MemoryPlaybook::new();
    for i in 0..3 {
        playbook
            .append(PlaybookLesson {
                id: format!("lesson-{i}"),
                project_id: "p1".to_string(),
                agent_name: "coder".to_string(),
                trigger_pattern: "error".to_string(),
                lesson_text: format!("lesson text {i}"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let lessons = playbook.lessons("p1").await.unwrap();
    assert_eq!(lessons.len(), 3);
    assert_eq!(lessons[0].id, "lesson-0");
    assert_eq!(lessons[2].id, "lesson-2");
    assert!(playbook.lessons("p2").await.unwrap().is_empty());
}
