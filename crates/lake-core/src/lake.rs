//! Context lake: federated query across the registered store adapters.
//!
//! A query fans out to every adapter concurrently under one timeout,
//! merges and ranks the candidates deterministically, resolves compaction
//! pointers, and packs the result greedily into the caller's token budget.
//! A single adapter outage degrades the result instead of failing it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lake_store::{
    ArchiveLog, IngestionId, QueryParams, RecordPayload, ScoredCandidate, StoreKind,
};
use serde::{Deserialize, Serialize};

use crate::config::LakeConfig;
use crate::error::EngineResult;
use crate::manifest::AdapterManifest;
use crate::obs;
use crate::tokens::TokenEstimator;
use crate::usage::UsageStats;

/// Where a served item came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub store: StoreKind,
    pub key: String,
    pub item_id: IngestionId,
}

/// One item in a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LakeItem {
    pub content: String,
    pub score: f64,
    pub provenance: Provenance,
    /// True when the content came from a compaction pointer (summary or
    /// full expansion) rather than an expanded record.
    pub pointer: bool,
    pub tokens: usize,
}

/// An assembled query result. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LakeResult {
    pub items: Vec<LakeItem>,
    pub total_tokens: usize,
    /// True when at least one eligible candidate was excluded by the
    /// token budget.
    pub truncated: bool,
    /// True when at least one adapter was excluded from the merge.
    pub degraded: bool,
}

/// Federated query engine over the adapter manifest.
pub struct ContextLake {
    archive: Arc<dyn ArchiveLog>,
    manifest: AdapterManifest,
    usage: Arc<UsageStats>,
    config: LakeConfig,
}

impl ContextLake {
    pub fn new(
        archive: Arc<dyn ArchiveLog>,
        manifest: AdapterManifest,
        usage: Arc<UsageStats>,
        config: LakeConfig,
    ) -> Self {
        Self {
            archive,
            manifest,
            usage,
            config,
        }
    }

    /// Reconstruct an optimal context window for an agent query.
    pub async fn query(
        &self,
        project_id: &str,
        agent_name: &str,
        terms: &str,
        token_budget: usize,
    ) -> EngineResult<LakeResult> {
        let params =
            QueryParams::new(project_id, agent_name, terms).with_limit(self.config.adapter_limit);
        let timeout = Duration::from_millis(self.config.query_timeout_ms);

        let fan_out = self.manifest.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let params = params.clone();
            async move {
                let kind = adapter.kind();
                let outcome = tokio::time::timeout(timeout, async {
                    if adapter.health().await == lake_store::HealthStatus::Down {
                        return Err(lake_store::StoreError::Unavailable {
                            store: kind.to_string(),
                        });
                    }
                    adapter.query(&params).await
                })
                .await;
                (kind, outcome)
            }
        });

        let mut degraded = false;
        let mut candidates: Vec<(StoreKind, ScoredCandidate)> = Vec::new();
        for (kind, outcome) in join_all(fan_out).await {
            match outcome {
                Ok(Ok(batch)) => candidates.extend(batch.into_iter().map(|c| (kind, c))),
                Ok(Err(err)) => {
                    obs::emit_adapter_degraded(&kind.to_string(), &err.to_string());
                    degraded = true;
                }
                Err(_elapsed) => {
                    obs::emit_adapter_degraded(&kind.to_string(), "timeout");
                    degraded = true;
                }
            }
        }

        candidates.sort_by(rank_order);

        // Cross-adapter dedup on identity, keeping the highest-ranked copy.
        let mut seen: HashSet<String> = HashSet::new();
        candidates.retain(|(_, c)| seen.insert(c.record.fingerprint.as_str().to_string()));

        let mut items = Vec::new();
        let mut total_tokens = 0usize;
        let mut truncated = false;

        for (kind, candidate) in candidates {
            let content = self.resolve_content(&candidate).await;
            let tokens = TokenEstimator::estimate(&content);
            if total_tokens + tokens > token_budget {
                truncated = true;
                continue;
            }
            total_tokens += tokens;
            self.usage.record_hit(project_id, &candidate.record.key);
            items.push(LakeItem {
                content,
                score: candidate.score,
                provenance: Provenance {
                    store: kind,
                    key: candidate.record.key.clone(),
                    item_id: candidate.record.item_id.clone(),
                },
                pointer: candidate.record.payload.is_pointer(),
                tokens,
            });
        }

        obs::emit_query_served(
            project_id,
            agent_name,
            items.len(),
            total_tokens,
            truncated,
            degraded,
        );

        Ok(LakeResult {
            items,
            total_tokens,
            truncated,
            degraded,
        })
    }

    /// Content a candidate serves: expanded text, pointer summary, or —
    /// for pointers scoring under the relevance threshold — the full
    /// archived payloads behind the pointer.
    async fn resolve_content(&self, candidate: &ScoredCandidate) -> String {
        match &candidate.record.payload {
            RecordPayload::Expanded { text } => text.clone(),
            RecordPayload::Pointer(pointer) => {
                if candidate.score >= self.config.min_relevance {
                    return pointer.summary.clone();
                }
                let mut parts = Vec::with_capacity(pointer.archive_refs.len());
                for archive_ref in &pointer.archive_refs {
                    match self.archive.get(archive_ref).await {
                        Ok(item) => parts.push(item.payload_text()),
                        Err(err) => {
                            obs::emit_pass_item_error("pointer_resolution", &archive_ref.0, &err)
                        }
                    }
                }
                if parts.is_empty() {
                    pointer.summary.clone()
                } else {
                    parts.join("\n")
                }
            }
        }
    }
}

/// Total deterministic ordering: score desc, recency desc, store priority
/// (vector > graph > memory), then key.
fn rank_order(
    (kind_a, a): &(StoreKind, ScoredCandidate),
    (kind_b, b): &(StoreKind, ScoredCandidate),
) -> std::cmp::Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| kind_a.priority().cmp(&kind_b.priority()))
        .then_with(|| a.record.key.cmp(&b.record.key))
}
