//! Storage layer for the context lake.
//!
//! Defines the `ArchiveLog`, `StoreAdapter`, and `Playbook` traits together
//! with the record types they exchange, and provides in-memory
//! implementations used by tests and the default daemon wiring.

pub mod error;
pub mod fakes;
pub mod fingerprint;
pub mod records;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fingerprint::{Fingerprint, IngestionId};
pub use records::{
    CompactionPointer, ContextItem, HealthStatus, ItemStatus, PlaybookLesson, RecordPayload,
    ScoredCandidate, StoreKind, StoreRecord, WriteAck,
};
pub use traits::{ArchiveLog, Playbook, QueryParams, StoreAdapter};
