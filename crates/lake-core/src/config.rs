//! Engine configuration.
//!
//! All knobs live in one serde-deserializable tree with working defaults.
//! The adapter manifest is explicit: backends are enumerated at
//! construction time and passed into the engine, never registered as a
//! side effect of loading code.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Ingestion worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bounded routing queue capacity.
    pub queue_capacity: usize,
    /// Number of routing workers consuming the queue.
    pub worker_count: usize,
    /// Maximum routing attempts per store before dead-lettering.
    pub max_attempts: u32,
    /// Base backoff delay; attempt n waits `base_delay_ms * 2^n`.
    pub base_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 4,
            max_attempts: 4,
            base_delay_ms: 50,
        }
    }
}

/// Context lake query settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LakeConfig {
    /// Overall fan-out timeout; adapters not answering in time are treated
    /// as unhealthy for that query.
    pub query_timeout_ms: u64,
    /// Candidates below this score trigger full pointer expansion instead
    /// of serving the summary.
    pub min_relevance: f64,
    /// Per-adapter candidate limit.
    pub adapter_limit: usize,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 2_000,
            min_relevance: 0.25,
            adapter_limit: 64,
        }
    }
}

/// Curator pass settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratorConfig {
    /// Minimum duplicate-group size that triggers compaction.
    pub duplicate_threshold: usize,
    /// Records older than this are candidates for pruning.
    pub retention_days: u64,
    /// Pruning floor: aged records under this token estimate are removed
    /// from query-facing stores (the archive keeps them).
    pub relevance_floor_tokens: usize,
    /// Substrings marking a compacted group as a failure pattern worth a
    /// playbook lesson.
    pub failure_patterns: Vec<String>,
    /// Seconds between scheduled passes.
    pub interval_secs: u64,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 3,
            retention_days: 90,
            relevance_floor_tokens: 8,
            failure_patterns: vec![
                "error".to_string(),
                "failed".to_string(),
                "exception".to_string(),
                "timeout".to_string(),
            ],
            interval_secs: 300,
        }
    }
}

/// Reflector pass settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectorConfig {
    /// Trailing usage window in seconds.
    pub usage_window_secs: u64,
    /// Records with fewer hits than this inside the window are cold.
    pub min_hits: usize,
    /// Only records at least this verbose are rewritten into pointers.
    pub verbose_threshold_tokens: usize,
    /// Maximum summary length for rewritten pointers.
    pub summary_max_chars: usize,
    /// Seconds between scheduled passes.
    pub interval_secs: u64,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            usage_window_secs: 3_600,
            min_hits: 2,
            verbose_threshold_tokens: 64,
            summary_max_chars: 240,
            interval_secs: 600,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest: IngestConfig,
    pub lake: LakeConfig,
    pub curator: CuratorConfig,
    pub reflector: ReflectorConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> EngineResult<()> {
        if self.ingest.queue_capacity == 0 {
            return Err(EngineError::Config {
                reason: "ingest.queue_capacity must be at least 1".into(),
            });
        }
        if self.ingest.worker_count == 0 {
            return Err(EngineError::Config {
                reason: "ingest.worker_count must be at least 1".into(),
            });
        }
        if self.ingest.max_attempts == 0 {
            return Err(EngineError::Config {
                reason: "ingest.max_attempts must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.lake.min_relevance) {
            return Err(EngineError::Config {
                reason: format!(
                    "lake.min_relevance must be in [0.0, 1.0], got {}",
                    self.lake.min_relevance
                ),
            });
        }
        if self.curator.duplicate_threshold < 2 {
            return Err(EngineError::Config {
                reason: "curator.duplicate_threshold must be at least 2".into(),
            });
        }
        if self.reflector.summary_max_chars == 0 {
            return Err(EngineError::Config {
                reason: "reflector.summary_max_chars must be at least 1".into(),
            });
        }
        Ok(())
    }
}
