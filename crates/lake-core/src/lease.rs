//! Per-project exclusivity leases for background passes.
//!
//! The curator and reflector must never run two passes over the same
//! project concurrently. A `Lease` is an RAII token scoped to
//! `(pass name, project_id)`; it releases on drop. Leases carry a TTL so a
//! pass that dies without dropping (e.g. an aborted task whose drop never
//! ran on a crashed thread) does not wedge the scope forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Holder {
    taken_at: Instant,
    // Per-acquire generation: a stale lease dropping after its scope was
    // reclaimed must not release the new holder.
    generation: u64,
}

#[derive(Debug)]
struct LeaseState {
    held: HashMap<(String, String), Holder>,
    ttl: Duration,
    next_generation: u64,
}

/// Registry of outstanding leases.
#[derive(Debug, Clone)]
pub struct LeaseRegistry {
    state: Arc<Mutex<LeaseState>>,
}

impl LeaseRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LeaseState {
                held: HashMap::new(),
                ttl,
                next_generation: 0,
            })),
        }
    }

    /// Try to acquire the lease for `(scope, project_id)`.
    ///
    /// Returns `None` when another holder has an unexpired lease. An
    /// expired holder's scope is reclaimed.
    pub fn acquire(&self, scope: &str, project_id: &str) -> Option<Lease> {
        let key = (scope.to_string(), project_id.to_string());
        let mut state = self.state.lock().unwrap();
        let ttl = state.ttl;
        if let Some(holder) = state.held.get(&key) {
            if holder.taken_at.elapsed() < ttl {
                return None;
            }
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        state.held.insert(
            key.clone(),
            Holder {
                taken_at: Instant::now(),
                generation,
            },
        );
        Some(Lease {
            registry: Arc::clone(&self.state),
            key,
            generation,
        })
    }

    /// Number of live leases (test helper).
    pub fn held_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        let ttl = state.ttl;
        state
            .held
            .values()
            .filter(|h| h.taken_at.elapsed() < ttl)
            .count()
    }
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// RAII exclusivity token; releases its scope on drop.
#[derive(Debug)]
pub struct Lease {
    registry: Arc<Mutex<LeaseState>>,
    key: (String, String),
    generation: u64,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut state = self.registry.lock().unwrap();
        // Release only if this token is still the registered holder.
        if state
            .held
            .get(&self.key)
            .is_some_and(|h| h.generation == self.generation)
        {
            state.held.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let registry = LeaseRegistry::new(Duration::from_secs(60));
        let lease = registry.acquire("curator", "p1");
        assert!(lease.is_some());
        assert_eq!(registry.held_count(), 1);

        drop(lease);
        assert_eq!(registry.held_count(), 0);
        assert!(registry.acquire("curator", "p1").is_some());
    }

    #[test]
    fn test_second_acquire_blocked_while_held() {
        let registry = LeaseRegistry::new(Duration::from_secs(60));
        let _held = registry.acquire("curator", "p1").unwrap();
        assert!(registry.acquire("curator", "p1").is_none());
    }

    #[test]
    fn test_scopes_independent() {
        let registry = LeaseRegistry::new(Duration::from_secs(60));
        let _curator = registry.acquire("curator", "p1").unwrap();
        assert!(registry.acquire("reflector", "p1").is_some());
        assert!(registry.acquire("curator", "p2").is_some());
    }

    #[test]
    fn test_expired_lease_reclaimed() {
        let registry = LeaseRegistry::new(Duration::from_millis(1));
        let _stale = registry.acquire("curator", "p1").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(registry.acquire("curator", "p1").is_some());
    }

    #[test]
    fn test_stale_drop_leaves_new_holder_exclusive() {
        let registry = LeaseRegistry::new(Duration::from_millis(50));
        let stale = registry.acquire("curator", "p1").unwrap();
        std::thread::sleep(Duration::from_millis(60));

        // The scope was reclaimed by a fresh holder after the TTL lapsed.
        let _fresh = registry.acquire("curator", "p1").unwrap();
        drop(stale);

        assert_eq!(registry.held_count(), 1);
        assert!(registry.acquire("curator", "p1").is_none());
    }
}
