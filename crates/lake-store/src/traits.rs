//! Storage trait definitions for the context lake.
//!
//! These traits define the core storage abstractions:
//! - `ArchiveLog`: append-only durable record of every ingested item
//! - `StoreAdapter`: uniform write/query/health surface per backend
//! - `Playbook`: append-only store of distilled lessons
//!
//! All traits are async and backend-agnostic. In-memory implementations are
//! provided via the `fakes` module.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::fingerprint::{Fingerprint, IngestionId};
use crate::records::{
    ContextItem, HealthStatus, ItemStatus, PlaybookLesson, ScoredCandidate, StoreKind,
    StoreRecord, WriteAck,
};

// ---------------------------------------------------------------------------
// ArchiveLog — durable ingestion record
// ---------------------------------------------------------------------------

/// Append-only archive of raw ingested items.
///
/// Guarantees:
/// - `append` is idempotent on `(project_id, fingerprint)`: re-appending an
///   identical item returns the existing id without creating a duplicate,
///   bumping the held item's occurrence counter.
/// - Items are never deleted; status transitions and occurrence counts are
///   the only mutations.
/// - Legal transitions: `Archived -> Routed | DeadLettered`,
///   `DeadLettered -> Routed` (operator replay), and
///   `Routed -> DeadLettered` (a re-enqueued duplicate exhausting
///   retries). An item never returns to `Archived`.
#[async_trait]
pub trait ArchiveLog: Send + Sync {
    /// Durably append an item, returning its id. Returns the existing id
    /// when an item with the same `(project_id, fingerprint)` is present.
    async fn append(&self, item: ContextItem) -> StoreResult<IngestionId>;

    /// Distinct project ids present in the archive, sorted.
    async fn projects(&self) -> StoreResult<Vec<String>>;

    /// Retrieve an item by id.
    async fn get(&self, id: &IngestionId) -> StoreResult<ContextItem>;

    /// Retrieve an item by its identity pair.
    async fn get_by_fingerprint(
        &self,
        project_id: &str,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<ContextItem>>;

    /// Transition an item's status, capturing an optional reason.
    async fn set_status(
        &self,
        id: &IngestionId,
        status: ItemStatus,
        reason: Option<String>,
    ) -> StoreResult<()>;

    /// All items for a project, newest first.
    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<ContextItem>>;

    /// Items for a project in a given status, newest first.
    async fn list_status(
        &self,
        project_id: &str,
        status: ItemStatus,
    ) -> StoreResult<Vec<ContextItem>>;
}

// ---------------------------------------------------------------------------
// StoreAdapter — query-facing backend
// ---------------------------------------------------------------------------

/// Query parameters for an adapter fan-out.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub project_id: String,
    pub agent_name: String,
    pub terms: String,
    pub limit: Option<usize>,
}

impl QueryParams {
    pub fn new(project_id: &str, agent_name: &str, terms: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            agent_name: agent_name.to_string(),
            terms: terms.to_string(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Uniform surface over a query-facing store backend.
///
/// Guarantees:
/// - `write` upserts on `record.key`: a retried write with the same key
///   replaces the previous record atomically. The lake never observes a
///   half-updated key.
/// - `query` returns candidates scored in [0.0, 1.0]; scoring is
///   deterministic for a fixed store state.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// The backend kind this adapter serves.
    fn kind(&self) -> StoreKind;

    /// Upsert a record on its key.
    async fn write(&self, record: StoreRecord) -> StoreResult<WriteAck>;

    /// Scored candidates for a query.
    async fn query(&self, params: &QueryParams) -> StoreResult<Vec<ScoredCandidate>>;

    /// Current backend health.
    async fn health(&self) -> HealthStatus;

    /// Remove a record by key. No-op if absent.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// All records for a project (used by background passes).
    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<StoreRecord>>;
}

// ---------------------------------------------------------------------------
// Playbook — distilled lessons
// ---------------------------------------------------------------------------

/// Append-only collection of lessons distilled from observed failures.
#[async_trait]
pub trait Playbook: Send + Sync {
    /// Append a lesson.
    async fn append(&self, lesson: PlaybookLesson) -> StoreResult<()>;

    /// All lessons for a project, oldest first.
    async fn lessons(&self, project_id: &str) -> StoreResult<Vec<PlaybookLesson>>;
}
