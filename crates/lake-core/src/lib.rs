//! Context Lake Core Library
//!
//! Re-exports the engine components for programmatic access: the ingestion
//! worker, the federated context lake, and the curator and reflector
//! background passes over the `lake-store` storage traits.

pub mod config;
pub mod curator;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod lake;
pub mod lease;
pub mod manifest;
pub mod obs;
pub mod reflector;
pub mod routing;
pub mod tokens;
pub mod usage;

pub use config::{CuratorConfig, EngineConfig, IngestConfig, LakeConfig, ReflectorConfig};
pub use curator::{similarity_signature, Curator, CuratorReport};
pub use engine::ContextEngine;
pub use error::{EngineError, EngineResult};
pub use ingest::{IngestReceipt, IngestionWorker};
pub use lake::{ContextLake, LakeItem, LakeResult, Provenance};
pub use lease::{Lease, LeaseRegistry};
pub use manifest::AdapterManifest;
pub use obs::init_tracing;
pub use reflector::{Reflector, ReflectorReport};
pub use routing::RoutingPolicy;
pub use tokens::TokenEstimator;
pub use usage::UsageStats;

pub use lake_store::{
    ArchiveLog, CompactionPointer, ContextItem, Fingerprint, HealthStatus, IngestionId,
    ItemStatus, Playbook, PlaybookLesson, QueryParams, RecordPayload, ScoredCandidate,
    StoreAdapter, StoreError, StoreKind, StoreRecord, WriteAck,
};

/// Crate version exposed for daemon startup logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
