//! Curator: periodic deduplication, playbook distillation, and pruning.
//!
//! A pass groups the expanded records of a project by a similarity
//! signature, compacts groups whose occurrence weight crosses the
//! threshold into a single pointer record, appends playbook lessons for
//! recognized failure patterns, and prunes aged trivial records from the
//! query-facing stores. The archive is never touched beyond reads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use lake_store::{
    ArchiveLog, CompactionPointer, Playbook, PlaybookLesson, RecordPayload, StoreRecord,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::config::CuratorConfig;
use crate::error::EngineResult;
use crate::lease::LeaseRegistry;
use crate::manifest::AdapterManifest;
use crate::obs;

/// Outcome of one curator pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratorReport {
    pub compacted_groups: usize,
    pub replaced_records: usize,
    pub pruned: usize,
    pub lessons_appended: usize,
    pub item_errors: usize,
}

impl CuratorReport {
    fn empty() -> Self {
        Self {
            compacted_groups: 0,
            replaced_records: 0,
            pruned: 0,
            lessons_appended: 0,
            item_errors: 0,
        }
    }

    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.compacted_groups == 0 && self.pruned == 0 && self.lessons_appended == 0
    }
}

/// Similarity signature: lowercase, whitespace collapsed to single spaces,
/// ASCII digits stripped, then SHA-256. Groups repeated payloads that
/// differ only in timestamps or counters.
pub fn similarity_signature(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_ascii_digit() {
            continue;
        }
        if c.is_whitespace() {
            if !last_was_space {
                normalized.push(' ');
                last_was_space = true;
            }
            continue;
        }
        for lc in c.to_lowercase() {
            normalized.push(lc);
        }
        last_was_space = false;
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.trim_end().as_bytes());
    hex::encode(hasher.finalize())
}

/// Pointer record key for a duplicate group.
fn group_key(project_id: &str, signature: &str) -> String {
    format!("dup-{}-{}", project_id, &signature[..12])
}

/// Background deduplication and pruning pass.
pub struct Curator {
    archive: Arc<dyn ArchiveLog>,
    manifest: AdapterManifest,
    playbook: Arc<dyn Playbook>,
    leases: LeaseRegistry,
    config: CuratorConfig,
}

impl Curator {
    pub fn new(
        archive: Arc<dyn ArchiveLog>,
        manifest: AdapterManifest,
        playbook: Arc<dyn Playbook>,
        leases: LeaseRegistry,
        config: CuratorConfig,
    ) -> Self {
        Self {
            archive,
            manifest,
            playbook,
            leases,
            config,
        }
    }

    /// Run one pass over a project. Returns `None` when another pass holds
    /// the project lease. Per-item errors are logged and skipped; the pass
    /// always completes over the remaining items.
    pub async fn run_pass(&self, project_id: &str) -> EngineResult<Option<CuratorReport>> {
        let Some(_lease) = self.leases.acquire("curator", project_id) else {
            obs::emit_lease_busy("curator", project_id);
            return Ok(None);
        };
        // The span is attached rather than entered so the future stays Send.
        let report = self
            .curate_project(project_id)
            .instrument(obs::pass_span("curator", project_id))
            .await;
        Ok(Some(report))
    }

    async fn curate_project(&self, project_id: &str) -> CuratorReport {
        let mut report = CuratorReport::empty();
        for adapter in self.manifest.iter() {
            self.curate_adapter(project_id, adapter.as_ref(), &mut report)
                .await;
        }

        obs::emit_curator_finished(
            project_id,
            report.compacted_groups,
            report.pruned,
            report.lessons_appended,
            report.item_errors,
        );
        report
    }

    async fn curate_adapter(
        &self,
        project_id: &str,
        adapter: &dyn lake_store::StoreAdapter,
        report: &mut CuratorReport,
    ) {
        let records = match adapter.list_project(project_id).await {
            Ok(records) => records,
            Err(err) => {
                obs::emit_pass_item_error("curator", &adapter.kind().to_string(), &err);
                report.item_errors += 1;
                return;
            }
        };

        // Group expanded records by similarity signature. Pointer records
        // mark already-compacted groups and are left alone.
        let mut groups: HashMap<String, Vec<StoreRecord>> = HashMap::new();
        for record in &records {
            if let RecordPayload::Expanded { text } = &record.payload {
                groups
                    .entry(similarity_signature(text))
                    .or_default()
                    .push(record.clone());
            }
        }

        let mut signatures: Vec<String> = groups.keys().cloned().collect();
        signatures.sort();

        for signature in signatures {
            let mut members = groups.remove(&signature).unwrap_or_default();
            // Deterministic representative: earliest created, key tiebreak.
            members.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.key.cmp(&b.key))
            });

            let weight = self.group_weight(&members, report).await;
            if weight < self.config.duplicate_threshold {
                self.prune_aged(project_id, adapter, &members, report).await;
                continue;
            }

            if let Err(err) = self
                .compact_group(project_id, adapter, &signature, &members, weight, report)
                .await
            {
                obs::emit_pass_item_error("curator", &group_key(project_id, &signature), &err);
                report.item_errors += 1;
            }
        }
    }

    /// Occurrence weight of a group: the sum of archive occurrence
    /// counters behind its member records.
    async fn group_weight(&self, members: &[StoreRecord], report: &mut CuratorReport) -> usize {
        let mut weight = 0usize;
        for member in members {
            match self.archive.get(&member.item_id).await {
                Ok(item) => weight += item.occurrences as usize,
                Err(err) => {
                    obs::emit_pass_item_error("curator", &member.key, &err);
                    report.item_errors += 1;
                    weight += 1;
                }
            }
        }
        weight
    }

    async fn compact_group(
        &self,
        project_id: &str,
        adapter: &dyn lake_store::StoreAdapter,
        signature: &str,
        members: &[StoreRecord],
        weight: usize,
        report: &mut CuratorReport,
    ) -> EngineResult<()> {
        let representative = &members[0];
        let key = group_key(project_id, signature);

        // Merge with an existing pointer for this group, if any, so a
        // re-grown group updates in place instead of forking.
        let mut archive_refs: Vec<_> = members.iter().map(|m| m.item_id.clone()).collect();
        if let Ok(existing) = adapter.list_project(project_id).await {
            if let Some(RecordPayload::Pointer(prior)) = existing
                .iter()
                .find(|r| r.key == key)
                .map(|r| r.payload.clone())
            {
                for prior_ref in prior.archive_refs {
                    if !archive_refs.contains(&prior_ref) {
                        archive_refs.push(prior_ref);
                    }
                }
            }
        }

        let mut replaced_count = 0usize;
        for archive_ref in &archive_refs {
            replaced_count += match self.archive.get(archive_ref).await {
                Ok(item) => item.occurrences as usize,
                Err(_) => 1,
            };
        }
        debug_assert!(replaced_count >= weight);

        let summary = format!(
            "{} (repeated {} times)",
            truncate_chars(representative.payload.serving_text(), 200),
            replaced_count
        );

        let pointer = CompactionPointer {
            pointer_id: format!("ptr-{}", &signature[..12]),
            target_store: adapter.kind(),
            target_key: key.clone(),
            replaced_count,
            summary: summary.clone(),
            archive_refs,
        };

        adapter
            .write(StoreRecord {
                key: key.clone(),
                project_id: project_id.to_string(),
                fingerprint: representative.fingerprint.clone(),
                item_id: representative.item_id.clone(),
                agent_name: representative.agent_name.clone(),
                source: representative.source.clone(),
                tags: representative.tags.clone(),
                token_estimate: crate::tokens::TokenEstimator::estimate(&summary),
                created_at: representative.created_at,
                payload: RecordPayload::Pointer(pointer),
            })
            .await?;

        // Members replaced by the pointer leave the query-facing store;
        // their archive entries stay put.
        for member in members {
            if member.key != key {
                adapter.remove(&member.key).await?;
                report.replaced_records += 1;
            }
        }
        report.compacted_groups += 1;

        self.maybe_append_lesson(project_id, signature, representative, replaced_count, report)
            .await;
        Ok(())
    }

    async fn maybe_append_lesson(
        &self,
        project_id: &str,
        signature: &str,
        representative: &StoreRecord,
        replaced_count: usize,
        report: &mut CuratorReport,
    ) {
        let text = representative.payload.serving_text().to_lowercase();
        let Some(pattern) = self
            .config
            .failure_patterns
            .iter()
            .find(|p| text.contains(p.as_str()))
        else {
            return;
        };

        let lesson_id = format!("lesson-{}-{}", &signature[..12], representative.agent_name);
        match self.playbook.lessons(project_id).await {
            Ok(existing) if existing.iter().any(|l| l.id == lesson_id) => return,
            Ok(_) => {}
            Err(err) => {
                obs::emit_pass_item_error("curator", &lesson_id, &err);
                report.item_errors += 1;
                return;
            }
        }

        let lesson = PlaybookLesson {
            id: lesson_id,
            project_id: project_id.to_string(),
            agent_name: representative.agent_name.clone(),
            trigger_pattern: pattern.clone(),
            lesson_text: format!(
                "Agent {} repeatedly produced '{}' payloads ({} occurrences): {}",
                representative.agent_name,
                pattern,
                replaced_count,
                truncate_chars(representative.payload.serving_text(), 200),
            ),
            created_at: Utc::now(),
        };
        match self.playbook.append(lesson).await {
            Ok(()) => report.lessons_appended += 1,
            Err(err) => {
                obs::emit_pass_item_error("curator", "playbook", &err);
                report.item_errors += 1;
            }
        }
    }

    /// Remove aged trivial records from the query-facing store. The
    /// archive keeps every original.
    async fn prune_aged(
        &self,
        _project_id: &str,
        adapter: &dyn lake_store::StoreAdapter,
        members: &[StoreRecord],
        report: &mut CuratorReport,
    ) {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days as i64);
        for member in members {
            if member.created_at < cutoff && member.token_estimate < self.config.relevance_floor_tokens
            {
                match adapter.remove(&member.key).await {
                    Ok(()) => report.pruned += 1,
                    Err(err) => {
                        obs::emit_pass_item_error("curator", &member.key, &err);
                        report.item_errors += 1;
                    }
                }
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lake_store::fakes::{MemoryArchiveLog, MemoryPlaybook};

    #[test]
    fn test_run_pass_future_is_send() {
        fn require_send<T: Send>(_: T) {}
        let curator = Curator::new(
            Arc::new(MemoryArchiveLog::new()),
            AdapterManifest::new(Vec::new()),
            Arc::new(MemoryPlaybook::new()),
            LeaseRegistry::default(),
            CuratorConfig::default(),
        );
        require_send(curator.run_pass("p1"));
    }

    #[test]
    fn test_signature_ignores_case_whitespace_digits() {
        let a = similarity_signature("Error 42: connection  refused\n");
        let b = similarity_signature("error 7: CONNECTION refused");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_distinguishes_content() {
        assert_ne!(
            similarity_signature("connection refused"),
            similarity_signature("permission denied")
        );
    }

    #[test]
    fn test_group_key_stable() {
        let sig = similarity_signature("some payload");
        assert_eq!(group_key("p1", &sig), group_key("p1", &sig));
        assert!(group_key("p1", &sig).starts_with("dup-p1-"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = "x".repeat(20);
        let t = truncate_chars(&long, 10);
        assert!(t.starts_with("xxxxxxxxxx"));
        assert!(t.ends_with("..."));
    }
}
