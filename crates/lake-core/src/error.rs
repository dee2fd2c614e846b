//! Engine error types.
//!
//! Each variant corresponds to a distinct operational failure domain so
//! operators can tell archive failures from routing failures from
//! query-adapter outages from background-pass errors.

use lake_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Archive log write failed. The only fatal ingest error: without the
    /// archive entry there is no durability guarantee.
    #[error("Archive write failed: {0}")]
    ArchiveWrite(#[source] StoreError),

    /// Routing write failed (retried internally; surfaced on replay and
    /// in dead-letter reasons).
    #[error("Routing to {store} failed: {reason}")]
    Routing { store: String, reason: String },

    /// A store adapter failed during a query fan-out. Queries degrade
    /// instead of failing; this surfaces only in per-adapter diagnostics.
    #[error("Adapter query failed: {0}")]
    AdapterQuery(#[source] StoreError),

    /// A curator or reflector pass failed wholesale (per-item errors are
    /// logged and skipped, not raised).
    #[error("Background pass failed: {reason}")]
    BackgroundPass { reason: String },

    /// Invalid engine configuration.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Item not found (replay of an unknown ingestion id).
    #[error("Unknown ingestion id: {id}")]
    UnknownIngestion { id: String },

    /// Item is not in a replayable state.
    #[error("Ingestion {id} is not dead-lettered (status: {status})")]
    NotReplayable { id: String, status: String },

    /// The ingestion worker has shut down and accepts no more work.
    #[error("Ingestion worker is shut down")]
    WorkerShutdown,

    /// Underlying storage error outside the domains above.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
