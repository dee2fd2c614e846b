//! Structured observability for engine lifecycle events.
//!
//! This module provides:
//! - `init_tracing` for global subscriber setup in binaries
//! - `pass_span` for project-scoped tracing spans around background passes
//! - Emission functions for ingestion, query, and background-pass events
//!
//! Events are emitted at `info!` level (filterable via `RUST_LOG`).

use tracing::{info, warn, Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber. Call once at program start.
///
/// * `json` — emit newline-delimited JSON log lines for aggregation.
/// * `level` — default verbosity when `RUST_LOG` is not set.
///
/// Subsequent calls are silently ignored (the global subscriber can only
/// be set once per process).
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

/// Span for one background pass over a project.
///
/// Returned un-entered so pass futures stay `Send`; attach it with
/// `tracing::Instrument` rather than holding an entered guard across an
/// `.await`.
pub fn pass_span(pass: &str, project_id: &str) -> Span {
    tracing::info_span!("lake.pass", pass = %pass, project_id = %project_id)
}

/// Emit event: item durably archived.
pub fn emit_archived(ingestion_id: &str, project_id: &str, source: &str) {
    info!(
        event = "ingest.archived",
        ingestion_id = %ingestion_id,
        project_id = %project_id,
        source = %source,
    );
}

/// Emit event: routing completed for an item.
pub fn emit_routed(ingestion_id: &str, stores: usize) {
    info!(event = "ingest.routed", ingestion_id = %ingestion_id, stores = stores);
}

/// Emit event: routing attempt failed, will retry (warning level).
pub fn emit_routing_retry(ingestion_id: &str, store: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "ingest.retry",
        ingestion_id = %ingestion_id,
        store = %store,
        attempt = attempt,
        error = %error,
    );
}

/// Emit event: item dead-lettered after retry exhaustion (warning level).
pub fn emit_dead_lettered(ingestion_id: &str, reason: &str) {
    warn!(event = "ingest.dead_lettered", ingestion_id = %ingestion_id, reason = %reason);
}

/// Emit event: dead-lettered item replayed by an operator.
pub fn emit_replayed(ingestion_id: &str) {
    info!(event = "ingest.replayed", ingestion_id = %ingestion_id);
}

/// Emit event: query served.
pub fn emit_query_served(
    project_id: &str,
    agent_name: &str,
    items: usize,
    total_tokens: usize,
    truncated: bool,
    degraded: bool,
) {
    info!(
        event = "query.served",
        project_id = %project_id,
        agent_name = %agent_name,
        items = items,
        total_tokens = total_tokens,
        truncated = truncated,
        degraded = degraded,
    );
}

/// Emit event: an adapter was excluded from a query (warning level).
pub fn emit_adapter_degraded(store: &str, reason: &str) {
    warn!(event = "query.adapter_degraded", store = %store, reason = %reason);
}

/// Emit event: curator pass finished.
pub fn emit_curator_finished(project_id: &str, compacted: usize, pruned: usize, lessons: usize, errors: usize) {
    info!(
        event = "curator.pass_finished",
        project_id = %project_id,
        compacted_groups = compacted,
        pruned = pruned,
        lessons = lessons,
        errors = errors,
    );
}

/// Emit event: reflector pass finished.
pub fn emit_reflector_finished(project_id: &str, rewritten: usize, errors: usize) {
    info!(
        event = "reflector.pass_finished",
        project_id = %project_id,
        rewritten = rewritten,
        errors = errors,
    );
}

/// Emit event: a pass skipped because another holds the project lease.
pub fn emit_lease_busy(pass: &str, project_id: &str) {
    info!(event = "pass.lease_busy", pass = %pass, project_id = %project_id);
}

/// Emit event: per-item error inside a background pass (warning level).
pub fn emit_pass_item_error(pass: &str, key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pass.item_error", pass = %pass, key = %key, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_span_is_send() {
        fn require_send<T: Send>(_: T) {}
        require_send(pass_span("curator", "p1"));
    }
}
