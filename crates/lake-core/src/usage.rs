//! Query usage statistics feeding the reflector.
//!
//! Hit counts cannot live in store state because queries never write to
//! stores. The engine owns one `UsageStats` recorder; the lake records hits
//! for served records and the reflector reads windowed snapshots.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// In-process recorder of which store records queries actually served.
#[derive(Debug, Default)]
pub struct UsageStats {
    // (project_id, record key) -> hit timestamps, oldest first
    hits: Mutex<HashMap<(String, String), Vec<DateTime<Utc>>>>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a query served this record.
    pub fn record_hit(&self, project_id: &str, key: &str) {
        let mut hits = self.hits.lock().unwrap();
        hits.entry((project_id.to_string(), key.to_string()))
            .or_default()
            .push(Utc::now());
    }

    /// Hits for one record inside the trailing window.
    pub fn hits_within(&self, project_id: &str, key: &str, window: Duration) -> usize {
        let cutoff = Utc::now() - window;
        let hits = self.hits.lock().unwrap();
        hits.get(&(project_id.to_string(), key.to_string()))
            .map(|ts| ts.iter().filter(|t| **t >= cutoff).count())
            .unwrap_or(0)
    }

    /// Snapshot of windowed hit counts for a project.
    pub fn project_snapshot(&self, project_id: &str, window: Duration) -> HashMap<String, usize> {
        let cutoff = Utc::now() - window;
        let hits = self.hits.lock().unwrap();
        hits.iter()
            .filter(|((p, _), _)| p == project_id)
            .map(|((_, key), ts)| (key.clone(), ts.iter().filter(|t| **t >= cutoff).count()))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Drop timestamps older than the window, keeping the map bounded.
    pub fn prune(&self, window: Duration) {
        let cutoff = Utc::now() - window;
        let mut hits = self.hits.lock().unwrap();
        for ts in hits.values_mut() {
            ts.retain(|t| *t >= cutoff);
        }
        hits.retain(|_, ts| !ts.is_empty());
    }

    /// Number of tracked records (test helper).
    pub fn len(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count_hits() {
        let stats = UsageStats::new();
        stats.record_hit("p1", "k1");
        stats.record_hit("p1", "k1");
        stats.record_hit("p1", "k2");

        assert_eq!(stats.hits_within("p1", "k1", Duration::hours(1)), 2);
        assert_eq!(stats.hits_within("p1", "k2", Duration::hours(1)), 1);
        assert_eq!(stats.hits_within("p1", "k3", Duration::hours(1)), 0);
    }

    #[test]
    fn test_snapshot_scoped_to_project() {
        let stats = UsageStats::new();
        stats.record_hit("p1", "k1");
        stats.record_hit("p2", "k1");

        let snap = stats.project_snapshot("p1", Duration::hours(1));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["k1"], 1);
    }

    #[test]
    fn test_prune_drops_empty_entries() {
        let stats = UsageStats::new();
        stats.record_hit("p1", "k1");
        stats.prune(Duration::seconds(-1));
        assert!(stats.is_empty());
    }
}
