//! Reflector: usage-driven compaction of cold verbose records.
//!
//! A pass reads a trailing-window snapshot of query usage and rewrites
//! expanded records that are both verbose and cold into compaction
//! pointers with tight summaries. Each rewrite is a single-key upsert, so
//! the lake never observes a half-updated record. Hot records stay
//! expanded for fast access.

use std::sync::Arc;

use chrono::Duration;
use lake_store::{CompactionPointer, RecordPayload, StoreRecord};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::config::ReflectorConfig;
use crate::error::EngineResult;
use crate::lease::LeaseRegistry;
use crate::manifest::AdapterManifest;
use crate::obs;
use crate::tokens::TokenEstimator;
use crate::usage::UsageStats;

/// Outcome of one reflector pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectorReport {
    pub examined: usize,
    pub rewritten: usize,
    pub item_errors: usize,
}

/// Background usage-analysis and write-back pass.
pub struct Reflector {
    manifest: AdapterManifest,
    usage: Arc<UsageStats>,
    leases: LeaseRegistry,
    config: ReflectorConfig,
}

impl Reflector {
    pub fn new(
        manifest: AdapterManifest,
        usage: Arc<UsageStats>,
        leases: LeaseRegistry,
        config: ReflectorConfig,
    ) -> Self {
        Self {
            manifest,
            usage,
            leases,
            config,
        }
    }

    /// Run one pass over a project. Returns `None` when another pass holds
    /// the project lease. Per-item errors are logged and skipped.
    pub async fn run_pass(&self, project_id: &str) -> EngineResult<Option<ReflectorReport>> {
        let Some(_lease) = self.leases.acquire("reflector", project_id) else {
            obs::emit_lease_busy("reflector", project_id);
            return Ok(None);
        };
        // The span is attached rather than entered so the future stays Send.
        let report = self
            .reflect_project(project_id)
            .instrument(obs::pass_span("reflector", project_id))
            .await;
        Ok(Some(report))
    }

    async fn reflect_project(&self, project_id: &str) -> ReflectorReport {
        let window = Duration::seconds(self.config.usage_window_secs as i64);
        let snapshot = self.usage.project_snapshot(project_id, window);

        let mut report = ReflectorReport {
            examined: 0,
            rewritten: 0,
            item_errors: 0,
        };

        for adapter in self.manifest.iter() {
            let records = match adapter.list_project(project_id).await {
                Ok(records) => records,
                Err(err) => {
                    obs::emit_pass_item_error("reflector", &adapter.kind().to_string(), &err);
                    report.item_errors += 1;
                    continue;
                }
            };

            for record in records {
                report.examined += 1;
                let hits = snapshot.get(&record.key).copied().unwrap_or(0);
                if hits >= self.config.min_hits {
                    continue;
                }
                let Some(rewritten) = self.rewrite(&record, adapter.kind()) else {
                    continue;
                };
                match adapter.write(rewritten).await {
                    Ok(_) => report.rewritten += 1,
                    Err(err) => {
                        obs::emit_pass_item_error("reflector", &record.key, &err);
                        report.item_errors += 1;
                    }
                }
            }
        }

        self.usage.prune(window);
        obs::emit_reflector_finished(project_id, report.rewritten, report.item_errors);
        report
    }

    /// The pointer replacement for a cold record, or `None` when the
    /// record is not worth rewriting.
    fn rewrite(&self, record: &StoreRecord, kind: lake_store::StoreKind) -> Option<StoreRecord> {
        let pointer = match &record.payload {
            RecordPayload::Expanded { text } => {
                if record.token_estimate < self.config.verbose_threshold_tokens {
                    return None;
                }
                CompactionPointer {
                    pointer_id: format!("ptr-{}", record.fingerprint.short()),
                    target_store: kind,
                    target_key: record.key.clone(),
                    replaced_count: 1,
                    summary: tighten(text, self.config.summary_max_chars),
                    archive_refs: vec![record.item_id.clone()],
                }
            }
            RecordPayload::Pointer(existing) => {
                // Still cold: tighten an oversized summary in place.
                if existing.summary.chars().count() <= self.config.summary_max_chars {
                    return None;
                }
                CompactionPointer {
                    summary: tighten(&existing.summary, self.config.summary_max_chars),
                    ..existing.clone()
                }
            }
        };

        let mut rewritten = record.clone();
        rewritten.token_estimate = TokenEstimator::estimate(&pointer.summary);
        rewritten.payload = RecordPayload::Pointer(pointer);
        Some(rewritten)
    }
}

fn tighten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}...", kept.trim_end())
}
