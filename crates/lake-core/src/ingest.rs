//! Ingestion worker: durable intake, policy routing, bounded retry.
//!
//! `ingest` performs one blocking step — fingerprinting and the archive
//! append — and returns as soon as the item is durable. Routing into the
//! query-facing stores happens asynchronously on a bounded worker pool
//! with exponential backoff; exhausted items are dead-lettered for
//! operator replay and their archive entry is untouched.

use std::sync::Arc;
use std::time::Duration;

use lake_store::{
    ArchiveLog, ContextItem, IngestionId, ItemStatus, RecordPayload, StoreRecord,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::IngestConfig;
use crate::error::{EngineError, EngineResult};
use crate::manifest::AdapterManifest;
use crate::obs;
use crate::routing::RoutingPolicy;
use crate::tokens::TokenEstimator;

/// What the caller gets back from `ingest`: the durable id and the status
/// at return time (always `Archived`; routing completes asynchronously).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub ingestion_id: IngestionId,
    pub status: ItemStatus,
}

#[derive(Debug)]
struct RoutingJob {
    item_id: IngestionId,
}

/// Consumes ingest requests, archives them, and routes them to the stores
/// selected by the routing policy.
pub struct IngestionWorker {
    archive: Arc<dyn ArchiveLog>,
    tx: std::sync::Mutex<Option<mpsc::Sender<RoutingJob>>>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl IngestionWorker {
    /// Start the worker pool. Routing jobs flow through a bounded queue
    /// consumed by `config.worker_count` tasks.
    pub fn start(
        archive: Arc<dyn ArchiveLog>,
        manifest: AdapterManifest,
        policy: RoutingPolicy,
        config: IngestConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<RoutingJob>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let policy = Arc::new(policy);
        let config = Arc::new(config);

        let mut handles = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            let rx = Arc::clone(&rx);
            let archive = Arc::clone(&archive);
            let manifest = manifest.clone();
            let policy = Arc::clone(&policy);
            let config = Arc::clone(&config);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => {
                            route_item(&*archive, &manifest, &policy, &config, job.item_id).await;
                        }
                        None => break,
                    }
                }
            }));
        }

        Self {
            archive,
            tx: std::sync::Mutex::new(Some(tx)),
            handles: std::sync::Mutex::new(handles),
        }
    }

    /// Durably archive a fragment and schedule its routing.
    ///
    /// The archive append is the only blocking step; failure there is
    /// fatal (`EngineError::ArchiveWrite`). A duplicate
    /// `(project_id, source, payload)` returns the existing id and
    /// re-schedules routing, which upserts and cannot duplicate records.
    pub async fn ingest(
        &self,
        project_id: &str,
        agent_name: &str,
        source: &str,
        payload: Vec<u8>,
    ) -> EngineResult<IngestReceipt> {
        let item = ContextItem::new(project_id, agent_name, source, payload);
        let id = self
            .archive
            .append(item)
            .await
            .map_err(EngineError::ArchiveWrite)?;
        obs::emit_archived(&id.0, project_id, source);

        self.enqueue(RoutingJob { item_id: id.clone() }).await?;

        Ok(IngestReceipt {
            ingestion_id: id,
            status: ItemStatus::Archived,
        })
    }

    /// Re-enqueue a dead-lettered item (operator surface).
    pub async fn replay(&self, id: &IngestionId) -> EngineResult<()> {
        let item = self.archive.get(id).await.map_err(|_| {
            EngineError::UnknownIngestion { id: id.0.clone() }
        })?;
        if item.status != ItemStatus::DeadLettered {
            return Err(EngineError::NotReplayable {
                id: id.0.clone(),
                status: item.status.to_string(),
            });
        }
        obs::emit_replayed(&id.0);
        self.enqueue(RoutingJob {
            item_id: id.clone(),
        })
        .await
    }

    /// Re-enqueue every item of a project whose routing never completed.
    ///
    /// Called after a restart: archived-but-unrouted items are picked up
    /// and routed to completion (upserts keep this duplicate-free).
    pub async fn recover(&self, project_id: &str) -> EngineResult<usize> {
        let pending = self
            .archive
            .list_status(project_id, ItemStatus::Archived)
            .await?;
        let count = pending.len();
        for item in pending {
            self.enqueue(RoutingJob { item_id: item.id }).await?;
        }
        Ok(count)
    }

    /// Dead-lettered items awaiting operator attention, newest first.
    pub async fn dead_letters(&self, project_id: &str) -> EngineResult<Vec<ContextItem>> {
        Ok(self
            .archive
            .list_status(project_id, ItemStatus::DeadLettered)
            .await?)
    }

    /// Close the intake and wait for the queue to drain.
    pub async fn shutdown(&self) {
        // Dropping the sender lets workers run the queue dry and exit.
        self.tx.lock().unwrap().take();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn enqueue(&self, job: RoutingJob) -> EngineResult<()> {
        let tx = {
            let guard = self.tx.lock().unwrap();
            guard.clone()
        };
        match tx {
            Some(tx) => tx.send(job).await.map_err(|_| EngineError::WorkerShutdown),
            None => Err(EngineError::WorkerShutdown),
        }
    }
}

/// Build the store record for a routed item.
fn record_for(item: &ContextItem) -> StoreRecord {
    let text = item.payload_text();
    StoreRecord {
        key: StoreRecord::routing_key(&item.project_id, &item.fingerprint),
        project_id: item.project_id.clone(),
        fingerprint: item.fingerprint.clone(),
        item_id: item.id.clone(),
        agent_name: item.agent_name.clone(),
        source: item.source.clone(),
        tags: vec![
            format!("agent:{}", item.agent_name),
            format!("source:{}", item.source),
        ],
        token_estimate: TokenEstimator::estimate(&text),
        created_at: item.created_at,
        payload: RecordPayload::Expanded { text },
    }
}

/// Route one archived item into its target stores, retrying each store
/// write with exponential backoff. On exhaustion the item is
/// dead-lettered; the archive entry stays put.
async fn route_item(
    archive: &dyn ArchiveLog,
    manifest: &AdapterManifest,
    policy: &RoutingPolicy,
    config: &IngestConfig,
    item_id: IngestionId,
) {
    let item = match archive.get(&item_id).await {
        Ok(item) => item,
        Err(err) => {
            obs::emit_pass_item_error("routing", &item_id.0, &err);
            return;
        }
    };

    let record = record_for(&item);
    let targets = policy.targets_for(&item.source);
    let mut routed = 0usize;

    for kind in &targets {
        let Some(adapter) = manifest.get(*kind) else {
            // Policy names a store this engine does not serve; treat as a
            // permanent routing failure.
            let reason = format!("no adapter registered for store {kind}");
            obs::emit_dead_lettered(&item_id.0, &reason);
            let _ = archive
                .set_status(&item_id, ItemStatus::DeadLettered, Some(reason))
                .await;
            return;
        };

        let mut attempt = 0u32;
        loop {
            match adapter.write(record.clone()).await {
                Ok(_) => {
                    routed += 1;
                    break;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= config.max_attempts {
                        let reason =
                            format!("routing to {kind} failed after {attempt} attempts: {err}");
                        obs::emit_dead_lettered(&item_id.0, &reason);
                        let _ = archive
                            .set_status(&item_id, ItemStatus::DeadLettered, Some(reason))
                            .await;
                        return;
                    }
                    obs::emit_routing_retry(&item_id.0, &kind.to_string(), attempt, &err);
                    let delay = config.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    if let Err(err) = archive.set_status(&item_id, ItemStatus::Routed, None).await {
        obs::emit_pass_item_error("routing", &item_id.0, &err);
        return;
    }
    obs::emit_routed(&item_id.0, routed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lake_store::fakes::{FailingAdapter, FlakyAdapter, MemoryArchiveLog, MemoryStoreAdapter};
    use lake_store::StoreKind;

    fn fast_config() -> IngestConfig {
        IngestConfig {
            queue_capacity: 16,
            worker_count: 2,
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    fn memory_only_policy() -> RoutingPolicy {
        RoutingPolicy::new(vec![StoreKind::Memory])
    }

    #[tokio::test]
    async fn test_ingest_archives_before_returning() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let adapter = Arc::new(MemoryStoreAdapter::new(StoreKind::Memory));
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![adapter.clone()]),
            memory_only_policy(),
            fast_config(),
        );

        let receipt = worker
            .ingest("p1", "coder", "logs", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(receipt.status, ItemStatus::Archived);
        assert!(archive.get(&receipt.ingestion_id).await.is_ok());

        worker.shutdown().await;
        let item = archive.get(&receipt.ingestion_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Routed);
        assert_eq!(adapter.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ingest_single_archive_entry_and_record() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let adapter = Arc::new(MemoryStoreAdapter::new(StoreKind::Memory));
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![adapter.clone()]),
            memory_only_policy(),
            fast_config(),
        );

        let first = worker
            .ingest("p1", "coder", "logs", b"same payload".to_vec())
            .await
            .unwrap();
        let second = worker
            .ingest("p1", "coder", "logs", b"same payload".to_vec())
            .await
            .unwrap();
        assert_eq!(first.ingestion_id, second.ingestion_id);

        worker.shutdown().await;
        assert_eq!(archive.len(), 1);
        assert_eq!(adapter.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_to_success() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let adapter = Arc::new(FlakyAdapter::new(StoreKind::Memory, 2));
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![adapter.clone()]),
            memory_only_policy(),
            fast_config(),
        );

        let receipt = worker
            .ingest("p1", "coder", "logs", b"flaky".to_vec())
            .await
            .unwrap();
        worker.shutdown().await;

        let item = archive.get(&receipt.ingestion_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Routed);
        assert_eq!(adapter.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![Arc::new(FailingAdapter::new(StoreKind::Memory))]),
            memory_only_policy(),
            fast_config(),
        );

        let receipt = worker
            .ingest("p1", "coder", "logs", b"doomed".to_vec())
            .await
            .unwrap();
        worker.shutdown().await;

        let item = archive.get(&receipt.ingestion_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::DeadLettered);
        assert!(item.status_reason.unwrap().contains("memory"));

        let dead = worker.dead_letters("p1").await.unwrap();
        assert_eq!(dead.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_requires_dead_letter_state() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let adapter = Arc::new(MemoryStoreAdapter::new(StoreKind::Memory));
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![adapter]),
            memory_only_policy(),
            fast_config(),
        );

        let receipt = worker
            .ingest("p1", "coder", "logs", b"fine".to_vec())
            .await
            .unwrap();
        // Item routes successfully, so replay must refuse.
        loop {
            let item = archive.get(&receipt.ingestion_id).await.unwrap();
            if item.status == ItemStatus::Routed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let err = worker.replay(&receipt.ingestion_id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotReplayable { .. }));
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_recover_routes_archived_leftovers() {
        let archive = Arc::new(MemoryArchiveLog::new());

        // Simulate a crash after archiving: the entry exists but no worker
        // ever routed it.
        let orphan = ContextItem::new("p1", "coder", "logs", b"orphan".to_vec());
        let orphan_id = archive.append(orphan).await.unwrap();

        let adapter = Arc::new(MemoryStoreAdapter::new(StoreKind::Memory));
        let worker = IngestionWorker::start(
            archive.clone(),
            AdapterManifest::new(vec![adapter.clone()]),
            memory_only_policy(),
            fast_config(),
        );
        let recovered = worker.recover("p1").await.unwrap();
        assert_eq!(recovered, 1);

        worker.shutdown().await;
        assert_eq!(archive.get(&orphan_id).await.unwrap().status, ItemStatus::Routed);
        assert_eq!(adapter.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_after_shutdown_rejected() {
        let archive = Arc::new(MemoryArchiveLog::new());
        let worker = IngestionWorker::start(
            archive,
            AdapterManifest::new(vec![Arc::new(MemoryStoreAdapter::new(StoreKind::Memory))]),
            memory_only_policy(),
            fast_config(),
        );
        worker.shutdown().await;

        let err = worker
            .ingest("p1", "coder", "logs", b"late".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkerShutdown));
    }
}
