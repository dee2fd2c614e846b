//! Record types shared between the archive log and the query-facing stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, IngestionId};

/// Lifecycle status of an archived item.
///
/// Transitions: `Archived -> Routed | DeadLettered`. A dead-lettered item
/// may return to `Routed` via operator replay, and a routed item may be
/// dead-lettered again when a re-enqueued duplicate exhausts its retries.
/// An item never returns to `Archived`, and the archive entry itself is
/// never deleted in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Archived,
    Routed,
    DeadLettered,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archived => write!(f, "archived"),
            Self::Routed => write!(f, "routed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// A raw context fragment as archived at ingestion time.
///
/// Identity is `(project_id, fingerprint)`. Immutable after creation except
/// for status transitions; the archive retains every item indefinitely as
/// the durability backstop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: IngestionId,
    pub project_id: String,
    pub agent_name: String,
    pub source: String,
    pub payload: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub status: ItemStatus,
    /// Reason captured when the item was dead-lettered.
    pub status_reason: Option<String>,
    /// How many times this exact fragment was ingested. Incremented by the
    /// archive on duplicate appends; feeds the curator's occurrence
    /// counters.
    pub occurrences: u32,
}

impl ContextItem {
    /// Build a fresh item in `Archived` state, computing its fingerprint.
    pub fn new(project_id: &str, agent_name: &str, source: &str, payload: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::from_parts(project_id, source, &payload);
        Self {
            id: IngestionId::new(),
            project_id: project_id.to_string(),
            agent_name: agent_name.to_string(),
            source: source.to_string(),
            payload,
            fingerprint,
            created_at: Utc::now(),
            status: ItemStatus::Archived,
            status_reason: None,
            occurrences: 1,
        }
    }

    /// Payload interpreted as UTF-8 text (lossy).
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Kind of query-facing store backend.
///
/// Merge priority is fixed: vector > graph > memory. The ordering is part
/// of the lake's deterministic-ranking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Vector,
    Graph,
    Memory,
}

impl StoreKind {
    /// Tie-break priority (lower wins).
    pub fn priority(&self) -> u8 {
        match self {
            Self::Vector => 0,
            Self::Graph => 1,
            Self::Memory => 2,
        }
    }

    /// All kinds in priority order.
    pub fn all() -> [StoreKind; 3] {
        [Self::Vector, Self::Graph, Self::Memory]
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Graph => write!(f, "graph"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// A pointer left in a query-facing store after compaction.
///
/// The pointer replaces a cluster of expanded records; the originals remain
/// in the archive and are reachable through `archive_refs`. Compaction is
/// lossy only at the query-serving layer, never at the archive layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionPointer {
    pub pointer_id: String,
    pub target_store: StoreKind,
    pub target_key: String,
    pub replaced_count: usize,
    pub summary: String,
    pub archive_refs: Vec<IngestionId>,
}

/// The serving payload of a store record: expanded text or a pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecordPayload {
    Expanded { text: String },
    Pointer(CompactionPointer),
}

impl RecordPayload {
    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    /// Text the record serves by default: expanded text or pointer summary.
    pub fn serving_text(&self) -> &str {
        match self {
            Self::Expanded { text } => text,
            Self::Pointer(p) => &p.summary,
        }
    }
}

/// Backend representation of a routed item.
///
/// Carries the originating `item_id` back-reference for provenance and for
/// pointer resolution against the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub key: String,
    pub project_id: String,
    pub fingerprint: Fingerprint,
    pub item_id: IngestionId,
    pub agent_name: String,
    pub source: String,
    pub tags: Vec<String>,
    pub token_estimate: usize,
    pub created_at: DateTime<Utc>,
    pub payload: RecordPayload,
}

impl StoreRecord {
    /// Canonical record key for a routed item.
    pub fn routing_key(project_id: &str, fingerprint: &Fingerprint) -> String {
        format!("ctx-{}-{}", project_id, fingerprint.short())
    }
}

/// Acknowledgement returned by an adapter write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    pub key: String,
    pub store: StoreKind,
    /// True when the write replaced an existing record under the same key.
    pub replaced: bool,
}

/// A scored candidate returned by an adapter query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub record: StoreRecord,
    /// Normalized relevance in [0.0, 1.0].
    pub score: f64,
}

/// Health report from an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Down,
}

/// A distilled lesson appended by the curator when a compacted group
/// matches a known failure pattern. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookLesson {
    pub id: String,
    pub project_id: String,
    pub agent_name: String,
    pub trigger_pattern: String,
    pub lesson_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_starts_archived() {
        let item = ContextItem::new("p1", "coder", "logs", b"hello".to_vec());
        assert_eq!(item.status, ItemStatus::Archived);
        assert!(item.status_reason.is_none());
        assert_eq!(item.payload_text(), "hello");
    }

    #[test]
    fn test_store_kind_priority_order() {
        assert!(StoreKind::Vector.priority() < StoreKind::Graph.priority());
        assert!(StoreKind::Graph.priority() < StoreKind::Memory.priority());
    }

    #[test]
    fn test_routing_key_uses_short_fingerprint() {
        let fp = Fingerprint::from_parts("p1", "logs", b"x");
        let key = StoreRecord::routing_key("p1", &fp);
        assert_eq!(key, format!("ctx-p1-{}", fp.short()));
    }

    #[test]
    fn test_payload_serving_text() {
        let expanded = RecordPayload::Expanded {
            text: "full text".into(),
        };
        assert_eq!(expanded.serving_text(), "full text");
        assert!(!expanded.is_pointer());

        let pointer = RecordPayload::Pointer(CompactionPointer {
            pointer_id: "ptr-1".into(),
            target_store: StoreKind::Memory,
            target_key: "k".into(),
            replaced_count: 3,
            summary: "summary".into(),
            archive_refs: vec![IngestionId::new()],
        });
        assert_eq!(pointer.serving_text(), "summary");
        assert!(pointer.is_pointer());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&ItemStatus::DeadLettered).unwrap();
        assert_eq!(json, "\"dead_lettered\"");
    }

    #[test]
    fn test_record_payload_serde_roundtrip() {
        let p = RecordPayload::Pointer(CompactionPointer {
            pointer_id: "ptr-9".into(),
            target_store: StoreKind::Vector,
            target_key: "k9".into(),
            replaced_count: 12,
            summary: "twelve duplicates".into(),
            archive_refs: Vec::new(),
        });
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(p, serde_json::from_str::<RecordPayload>(&json).unwrap());
    }
}
