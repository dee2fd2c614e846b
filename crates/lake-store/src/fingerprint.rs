//! Content fingerprints and ingestion identifiers.

use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StoreError;

/// Content fingerprint (SHA-256 hex string).
///
/// Computed over `project_id`, `source`, and the raw payload, so the same
/// payload ingested for two projects (or via two sources) yields distinct
/// fingerprints. The inner field is private to guarantee the string is
/// always valid lowercase hex produced by `from_parts` or validated via
/// `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an ingested fragment.
    pub fn from_parts(project_id: &str, source: &str, payload: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(project_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(source.as_bytes());
        hasher.update(b"\n");
        hasher.update(payload);
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars), used in store record keys.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = StoreError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidFingerprint { value: s });
        }
        Ok(Fingerprint(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an archived ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestionId(pub String);

impl IngestionId {
    /// Generate a new random IngestionId.
    pub fn new() -> Self {
        IngestionId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for IngestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IngestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::from_parts("p1", "logs", b"payload");
        let b = Fingerprint::from_parts("p1", "logs", b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_sensitive_to_all_parts() {
        let base = Fingerprint::from_parts("p1", "logs", b"payload");
        assert_ne!(base, Fingerprint::from_parts("p2", "logs", b"payload"));
        assert_ne!(base, Fingerprint::from_parts("p1", "events", b"payload"));
        assert_ne!(base, Fingerprint::from_parts("p1", "logs", b"other"));
    }

    #[test]
    fn test_fingerprint_try_from_rejects_garbage() {
        assert!(Fingerprint::try_from("zz".to_string()).is_err());
        assert!(Fingerprint::try_from("abc123".to_string()).is_err());
        let valid = Fingerprint::from_parts("p", "s", b"x").as_str().to_string();
        assert!(Fingerprint::try_from(valid).is_ok());
    }

    #[test]
    fn test_short_is_prefix() {
        let fp = Fingerprint::from_parts("p", "s", b"x");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
    }

    #[test]
    fn test_ingestion_ids_unique() {
        assert_ne!(IngestionId::new(), IngestionId::new());
    }
}
