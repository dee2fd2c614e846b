//! In-memory implementations of the storage traits.
//!
//! `MemoryArchiveLog`, `MemoryStoreAdapter`, and `MemoryPlaybook` satisfy
//! the trait contracts without any external dependencies. They back the
//! daemon's default wiring and the test suites. Failure-injection wrappers
//! (`FailingAdapter`, `FlakyAdapter`, `SlowAdapter`) exercise retry,
//! dead-letter, and degraded-mode paths in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::fingerprint::{Fingerprint, IngestionId};
use crate::records::{
    ContextItem, HealthStatus, ItemStatus, PlaybookLesson, ScoredCandidate, StoreKind,
    StoreRecord, WriteAck,
};
use crate::traits::{ArchiveLog, Playbook, QueryParams, StoreAdapter};

// ---------------------------------------------------------------------------
// MemoryArchiveLog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ArchiveState {
    items: HashMap<String, ContextItem>,
    // (project_id, fingerprint hex) -> item id
    by_fingerprint: HashMap<(String, String), String>,
}

/// In-memory archive log backed by a `HashMap<id, ContextItem>` with a
/// fingerprint index enforcing append idempotency.
#[derive(Debug, Default)]
pub struct MemoryArchiveLog {
    state: Mutex<ArchiveState>,
}

impl MemoryArchiveLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total items archived (test helper).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn transition_allowed(from: ItemStatus, to: ItemStatus) -> bool {
    // Same-state sets are idempotent no-ops; an item never returns to the
    // initial Archived state.
    from == to || to != ItemStatus::Archived
}

#[async_trait]
impl ArchiveLog for MemoryArchiveLog {
    async fn append(&self, item: ContextItem) -> StoreResult<IngestionId> {
        let mut state = self.state.lock().unwrap();
        let identity = (
            item.project_id.clone(),
            item.fingerprint.as_str().to_string(),
        );
        if let Some(existing) = state.by_fingerprint.get(&identity).cloned() {
            if let Some(held) = state.items.get_mut(&existing) {
                held.occurrences = held.occurrences.saturating_add(1);
            }
            return Ok(IngestionId(existing));
        }
        let id = item.id.clone();
        state.by_fingerprint.insert(identity, id.0.clone());
        state.items.insert(id.0.clone(), item);
        Ok(id)
    }

    async fn projects(&self) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut projects: Vec<String> =
            state.items.values().map(|i| i.project_id.clone()).collect();
        projects.sort();
        projects.dedup();
        Ok(projects)
    }

    async fn get(&self, id: &IngestionId) -> StoreResult<ContextItem> {
        let state = self.state.lock().unwrap();
        state
            .items
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StoreError::ItemNotFound { id: id.0.clone() })
    }

    async fn get_by_fingerprint(
        &self,
        project_id: &str,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<ContextItem>> {
        let state = self.state.lock().unwrap();
        let identity = (project_id.to_string(), fingerprint.as_str().to_string());
        Ok(state
            .by_fingerprint
            .get(&identity)
            .and_then(|id| state.items.get(id))
            .cloned())
    }

    async fn set_status(
        &self,
        id: &IngestionId,
        status: ItemStatus,
        reason: Option<String>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::ItemNotFound { id: id.0.clone() })?;
        if !transition_allowed(item.status, status) {
            return Err(StoreError::InvalidStatusTransition {
                id: id.0.clone(),
                from: item.status.to_string(),
                to: status.to_string(),
            });
        }
        item.status = status;
        item.status_reason = reason;
        Ok(())
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<ContextItem>> {
        let state = self.state.lock().unwrap();
        let mut items: Vec<ContextItem> = state
            .items
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(items)
    }

    async fn list_status(
        &self,
        project_id: &str,
        status: ItemStatus,
    ) -> StoreResult<Vec<ContextItem>> {
        let mut items = self.list_project(project_id).await?;
        items.retain(|i| i.status == status);
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// MemoryStoreAdapter
// ---------------------------------------------------------------------------

/// In-memory query-facing store, one instance per `StoreKind`.
///
/// Scoring is deterministic term overlap: the fraction of lowercased query
/// terms that appear in the record's serving text or tags. Recency and
/// store priority do not affect the score; ordering ties are resolved by
/// the lake's merge.
#[derive(Debug)]
pub struct MemoryStoreAdapter {
    kind: StoreKind,
    records: Mutex<HashMap<String, StoreRecord>>,
}

impl MemoryStoreAdapter {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record count (test helper).
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn score(record: &StoreRecord, terms: &[String]) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }
        let haystack = format!(
            "{} {}",
            record.payload.serving_text().to_lowercase(),
            record.tags.join(" ").to_lowercase()
        );
        let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
        matched as f64 / terms.len() as f64
    }
}

#[async_trait]
impl StoreAdapter for MemoryStoreAdapter {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn write(&self, record: StoreRecord) -> StoreResult<WriteAck> {
        let mut records = self.records.lock().unwrap();
        let key = record.key.clone();
        let replaced = records.insert(key.clone(), record).is_some();
        Ok(WriteAck {
            key,
            store: self.kind,
            replaced,
        })
    }

    async fn query(&self, params: &QueryParams) -> StoreResult<Vec<ScoredCandidate>> {
        let terms: Vec<String> = params
            .terms
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        let records = self.records.lock().unwrap();
        let mut candidates: Vec<ScoredCandidate> = records
            .values()
            .filter(|r| r.project_id == params.project_id)
            .map(|r| ScoredCandidate {
                score: Self::score(r, &terms),
                record: r.clone(),
            })
            .filter(|c| c.score > 0.0)
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.key.cmp(&b.record.key))
        });
        if let Some(limit) = params.limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::Ok
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        records.remove(key);
        Ok(())
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<StoreRecord>> {
        let records = self.records.lock().unwrap();
        let mut out: Vec<StoreRecord> = records
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryPlaybook
// ---------------------------------------------------------------------------

/// In-memory append-only playbook.
#[derive(Debug, Default)]
pub struct MemoryPlaybook {
    lessons: Mutex<Vec<PlaybookLesson>>,
}

impl MemoryPlaybook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Playbook for MemoryPlaybook {
    async fn append(&self, lesson: PlaybookLesson) -> StoreResult<()> {
        self.lessons.lock().unwrap().push(lesson);
        Ok(())
    }

    async fn lessons(&self, project_id: &str) -> StoreResult<Vec<PlaybookLesson>> {
        let lessons = self.lessons.lock().unwrap();
        Ok(lessons
            .iter()
            .filter(|l| l.project_id == project_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Failure-injection wrappers (testing)
// ---------------------------------------------------------------------------

/// Adapter whose writes and queries always fail.
pub struct FailingAdapter {
    kind: StoreKind,
}

impl FailingAdapter {
    pub fn new(kind: StoreKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl StoreAdapter for FailingAdapter {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn write(&self, record: StoreRecord) -> StoreResult<WriteAck> {
        Err(StoreError::WriteFailed {
            store: self.kind.to_string(),
            reason: format!("injected failure for {}", record.key),
        })
    }

    async fn query(&self, _params: &QueryParams) -> StoreResult<Vec<ScoredCandidate>> {
        Err(StoreError::QueryFailed {
            store: self.kind.to_string(),
            reason: "injected failure".to_string(),
        })
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::Down
    }

    async fn remove(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable {
            store: self.kind.to_string(),
        })
    }

    async fn list_project(&self, _project_id: &str) -> StoreResult<Vec<StoreRecord>> {
        Err(StoreError::Unavailable {
            store: self.kind.to_string(),
        })
    }
}

/// Adapter that fails the first `failures` writes, then delegates to an
/// inner `MemoryStoreAdapter`. Exercises bounded retry.
pub struct FlakyAdapter {
    inner: MemoryStoreAdapter,
    remaining_failures: AtomicU32,
}

impl FlakyAdapter {
    pub fn new(kind: StoreKind, failures: u32) -> Self {
        Self {
            inner: MemoryStoreAdapter::new(kind),
            remaining_failures: AtomicU32::new(failures),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl StoreAdapter for FlakyAdapter {
    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    async fn write(&self, record: StoreRecord) -> StoreResult<WriteAck> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::WriteFailed {
                store: self.kind().to_string(),
                reason: "transient failure".to_string(),
            });
        }
        self.inner.write(record).await
    }

    async fn query(&self, params: &QueryParams) -> StoreResult<Vec<ScoredCandidate>> {
        self.inner.query(params).await
    }

    async fn health(&self) -> HealthStatus {
        self.inner.health().await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<StoreRecord>> {
        self.inner.list_project(project_id).await
    }
}

/// Adapter that sleeps before every query, for lake timeout tests.
pub struct SlowAdapter {
    inner: MemoryStoreAdapter,
    delay: Duration,
}

impl SlowAdapter {
    pub fn new(kind: StoreKind, delay: Duration) -> Self {
        Self {
            inner: MemoryStoreAdapter::new(kind),
            delay,
        }
    }

    /// Write directly to the inner store without delay (test setup).
    pub async fn seed(&self, record: StoreRecord) -> StoreResult<WriteAck> {
        self.inner.write(record).await
    }
}

#[async_trait]
impl StoreAdapter for SlowAdapter {
    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    async fn write(&self, record: StoreRecord) -> StoreResult<WriteAck> {
        tokio::time::sleep(self.delay).await;
        self.inner.write(record).await
    }

    async fn query(&self, params: &QueryParams) -> StoreResult<Vec<ScoredCandidate>> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(params).await
    }

    async fn health(&self) -> HealthStatus {
        self.inner.health().await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<StoreRecord>> {
        self.inner.list_project(project_id).await
    }
}
