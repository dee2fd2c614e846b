//! Engine facade: one object wiring intake, query, and background passes.
//!
//! `ContextEngine` owns the archive, the adapter manifest, the playbook,
//! the usage stats, and the lease registry, and exposes the operations a
//! daemon or embedding host needs. Background passes can run on demand or
//! on the configured schedules via `spawn_schedules`.

use std::sync::Arc;
use std::time::Duration;

use lake_store::{ArchiveLog, ContextItem, IngestionId, Playbook, PlaybookLesson};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::EngineConfig;
use crate::curator::{Curator, CuratorReport};
use crate::error::EngineResult;
use crate::ingest::{IngestReceipt, IngestionWorker};
use crate::lake::{ContextLake, LakeResult};
use crate::lease::LeaseRegistry;
use crate::manifest::AdapterManifest;
use crate::reflector::{Reflector, ReflectorReport};
use crate::routing::RoutingPolicy;
use crate::usage::UsageStats;

/// The assembled context system.
pub struct ContextEngine {
    archive: Arc<dyn ArchiveLog>,
    playbook: Arc<dyn Playbook>,
    worker: Arc<IngestionWorker>,
    lake: ContextLake,
    curator: Arc<Curator>,
    reflector: Arc<Reflector>,
    config: EngineConfig,
}

impl ContextEngine {
    /// Wire up an engine over the given backends. Fails when the config
    /// does not validate.
    pub fn new(
        archive: Arc<dyn ArchiveLog>,
        manifest: AdapterManifest,
        playbook: Arc<dyn Playbook>,
        policy: RoutingPolicy,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;

        let usage = Arc::new(UsageStats::new());
        let leases = LeaseRegistry::default();

        let worker = Arc::new(IngestionWorker::start(
            Arc::clone(&archive),
            manifest.clone(),
            policy,
            config.ingest.clone(),
        ));
        let lake = ContextLake::new(
            Arc::clone(&archive),
            manifest.clone(),
            Arc::clone(&usage),
            config.lake.clone(),
        );
        let curator = Arc::new(Curator::new(
            Arc::clone(&archive),
            manifest.clone(),
            Arc::clone(&playbook),
            leases.clone(),
            config.curator.clone(),
        ));
        let reflector = Arc::new(Reflector::new(
            manifest,
            usage,
            leases,
            config.reflector.clone(),
        ));

        Ok(Self {
            archive,
            playbook,
            worker,
            lake,
            curator,
            reflector,
            config,
        })
    }

    /// Durably archive a fragment and schedule its routing.
    pub async fn ingest(
        &self,
        project_id: &str,
        agent_name: &str,
        source: &str,
        payload: Vec<u8>,
    ) -> EngineResult<IngestReceipt> {
        self.worker.ingest(project_id, agent_name, source, payload).await
    }

    /// Reconstruct a context window for an agent query.
    pub async fn query(
        &self,
        project_id: &str,
        agent_name: &str,
        terms: &str,
        token_budget: usize,
    ) -> EngineResult<LakeResult> {
        self.lake.query(project_id, agent_name, terms, token_budget).await
    }

    /// Re-enqueue a dead-lettered item.
    pub async fn replay(&self, id: &IngestionId) -> EngineResult<()> {
        self.worker.replay(id).await
    }

    /// Route every archived-but-unrouted item across all known projects.
    /// Called once after a restart.
    pub async fn recover(&self) -> EngineResult<usize> {
        let mut total = 0usize;
        for project in self.archive.projects().await? {
            total += self.worker.recover(&project).await?;
        }
        Ok(total)
    }

    /// Dead-lettered items awaiting operator attention, newest first.
    pub async fn dead_letters(&self, project_id: &str) -> EngineResult<Vec<ContextItem>> {
        self.worker.dead_letters(project_id).await
    }

    /// Distilled lessons for a project, oldest first.
    pub async fn playbook_lessons(&self, project_id: &str) -> EngineResult<Vec<PlaybookLesson>> {
        Ok(self.playbook.lessons(project_id).await?)
    }

    /// Run one curator pass over a project now.
    pub async fn run_curator(&self, project_id: &str) -> EngineResult<Option<CuratorReport>> {
        self.curator.run_pass(project_id).await
    }

    /// Run one reflector pass over a project now.
    pub async fn run_reflector(&self, project_id: &str) -> EngineResult<Option<ReflectorReport>> {
        self.reflector.run_pass(project_id).await
    }

    /// Spawn the periodic curator and reflector schedules. Each tick walks
    /// every project in the archive; a busy lease skips that project until
    /// the next tick.
    pub fn spawn_schedules(&self) -> Vec<JoinHandle<()>> {
        let curator = Arc::clone(&self.curator);
        let curator_archive = Arc::clone(&self.archive);
        let curator_every = Duration::from_secs(self.config.curator.interval_secs);
        let curator_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(curator_every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                run_scheduled("curator", &curator_archive, |project| {
                    let curator = Arc::clone(&curator);
                    async move { curator.run_pass(&project).await.map(|_| ()) }
                })
                .await;
            }
        });

        let reflector = Arc::clone(&self.reflector);
        let reflector_archive = Arc::clone(&self.archive);
        let reflector_every = Duration::from_secs(self.config.reflector.interval_secs);
        let reflector_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reflector_every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                run_scheduled("reflector", &reflector_archive, |project| {
                    let reflector = Arc::clone(&reflector);
                    async move { reflector.run_pass(&project).await.map(|_| ()) }
                })
                .await;
            }
        });

        vec![curator_handle, reflector_handle]
    }

    /// Close the intake and wait for in-flight routing to drain.
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }
}

/// One schedule tick: run a pass over every project, logging failures
/// without stopping the walk.
async fn run_scheduled<F, Fut>(pass: &str, archive: &Arc<dyn ArchiveLog>, run: F)
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = EngineResult<()>>,
{
    let projects = match archive.projects().await {
        Ok(projects) => projects,
        Err(err) => {
            warn!(event = "schedule.projects_failed", pass = %pass, error = %err);
            return;
        }
    };
    for project in projects {
        if let Err(err) = run(project.clone()).await {
            warn!(
                event = "schedule.pass_failed",
                pass = %pass,
                project_id = %project,
                error = %err,
            );
        }
    }
}
