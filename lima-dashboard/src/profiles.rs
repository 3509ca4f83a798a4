//! Profile resolution cache
//!
//! Memoizes submitter profile lookups for one session. Entries are
//! write-once: a profile, or `None` for "looked up, not found", is never
//! fetched again for the life of the cache. Concurrent requests for an id
//! that is already being fetched wait on the same lookup instead of issuing
//! another one.
//!
//! Lookups run on their own task, so a caller that gives up (subscription
//! torn down) does not abort the request; its result just never reaches a
//! cache that is still in use. Each lookup is bounded by a timeout; expiry
//! is treated like any other failed lookup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::model::UserProfile;
use crate::store::ProfileSource;

/// System senders that never have a stored profile
const RESERVED_SUBMITTERS: [(&str, &str); 4] = [
    ("office", "Escritório"),
    ("reception-tablet", "Recepção/Check-in"),
    ("tablet_user", "Recepção/Check-in"),
    ("system", "Sistema"),
];

/// Fixed identity for reserved submitter ids
pub fn reserved_identity(id: &str) -> Option<UserProfile> {
    RESERVED_SUBMITTERS
        .iter()
        .find(|(reserved, _)| *reserved == id)
        .map(|(reserved, name)| UserProfile {
            uid: reserved.to_string(),
            display_name: name.to_string(),
            photo_url: None,
            email: None,
        })
}

/// Name shown when no profile is available: the first `len` characters of the id
pub fn fallback_name(id: &str, len: usize) -> String {
    let truncated: String = id.chars().take(len).collect();
    if truncated.len() < id.len() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

type Slot = Arc<OnceCell<Option<UserProfile>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Option<UserProfile>>,
    in_flight: HashMap<String, Slot>,
}

/// Session-scoped memo of `submitter id -> profile | not found`
pub struct ProfileCache<P> {
    source: Arc<P>,
    timeout: Duration,
    state: Mutex<CacheState>,
    lookups: AtomicUsize,
}

impl<P: ProfileSource> ProfileCache<P> {
    pub fn new(source: Arc<P>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            state: Mutex::new(CacheState::default()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Resolve one submitter id, fetching at most once per id
    pub async fn resolve(&self, id: &str) -> Option<UserProfile> {
        if let Some(profile) = reserved_identity(id) {
            return Some(profile);
        }

        let slot = {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.entries.get(id) {
                return entry.clone();
            }
            Arc::clone(
                state
                    .in_flight
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let profile = slot.get_or_init(|| self.fetch(id)).await.clone();

        let mut state = self.state.lock().await;
        state
            .entries
            .entry(id.to_string())
            .or_insert_with(|| profile.clone());
        state.in_flight.remove(id);
        profile
    }

    /// Resolve every id in `ids` that is not cached yet
    ///
    /// Ids already cached (including negative results) and reserved ids are
    /// skipped; ids already being fetched are joined, not re-requested.
    pub async fn resolve_batch<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: HashSet<&str> = ids
            .into_iter()
            .filter(|id| reserved_identity(id).is_none())
            .collect();
        let missing: Vec<&str> = {
            let state = self.state.lock().await;
            unique
                .into_iter()
                .filter(|id| !state.entries.contains_key(*id))
                .collect()
        };
        if missing.is_empty() {
            return;
        }
        debug!("Resolving {} uncached submitter profiles", missing.len());
        join_all(missing.into_iter().map(|id| self.resolve(id))).await;
    }

    /// Cached result without fetching
    ///
    /// Outer `None`: never attempted. `Some(None)`: looked up, not found.
    pub async fn cached(&self, id: &str) -> Option<Option<UserProfile>> {
        if let Some(profile) = reserved_identity(id) {
            return Some(Some(profile));
        }
        self.state.lock().await.entries.get(id).cloned()
    }

    /// Display name from the cache, falling back to the truncated id
    pub async fn display_name(&self, id: &str, fallback_len: usize) -> String {
        match self.cached(id).await {
            Some(Some(profile)) => profile.display_name,
            _ => fallback_name(id, fallback_len),
        }
    }

    /// Number of lookups issued to the profile source
    pub fn lookups_issued(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn fetch(&self, id: &str) -> Option<UserProfile> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let source = Arc::clone(&self.source);
        let owned = id.to_string();
        let lookup = tokio::spawn(async move { source.get_profile(&owned).await });

        let outcome = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(joined) => joined,
            Err(_) => {
                let err = SyncError::ProfileLookup {
                    id: id.to_string(),
                    reason: format!("no answer within {:?}", self.timeout),
                };
                warn!("{}; using fallback name", err);
                return None;
            }
        };

        match outcome {
            Ok(Ok(profile)) => {
                if profile.is_none() {
                    debug!("No profile stored for submitter {}", id);
                }
                profile
            }
            Ok(Err(e)) => {
                let err = SyncError::ProfileLookup {
                    id: id.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}; using fallback name", err);
                None
            }
            Err(e) => {
                warn!("Profile lookup task for {} failed: {}", id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

    /// Counts calls and answers after a short delay
    #[derive(Default)]
    struct SlowDirectory {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ProfileSource for SlowDirectory {
        async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(StoreError::Unavailable("timeout".to_string()));
            }
            if id == "ghost" {
                return Ok(None);
            }
            Ok(Some(UserProfile {
                uid: id.to_string(),
                display_name: format!("Mecânico {}", id),
                photo_url: None,
                email: None,
            }))
        }
    }

    #[tokio::test]
    async fn test_repeated_resolution_fetches_once() {
        let source = Arc::new(SlowDirectory::default());
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);

        for _ in 0..5 {
            cache.resolve_batch(["mech1"]).await;
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.display_name("mech1", 8).await, "Mecânico mech1");
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let source = Arc::new(SlowDirectory::default());
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);

        assert_eq!(cache.resolve("ghost").await, None);
        assert_eq!(cache.resolve("ghost").await, None);
        assert_eq!(cache.cached("ghost").await, Some(None));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_batches_share_in_flight_lookup() {
        let source = Arc::new(SlowDirectory::default());
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);

        tokio::join!(
            cache.resolve_batch(["mech1", "mech2", "mech1"]),
            cache.resolve_batch(["mech2", "mech1"]),
            cache.resolve("mech1"),
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.lookups_issued(), 2);
    }

    #[tokio::test]
    async fn test_reserved_ids_bypass_lookup() {
        let source = Arc::new(SlowDirectory::default());
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);

        cache.resolve_batch(["office", "reception-tablet", "tablet_user"]).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.display_name("office", 8).await, "Escritório");
        assert_eq!(cache.display_name("tablet_user", 8).await, "Recepção/Check-in");
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_to_fallback() {
        let source = Arc::new(SlowDirectory {
            fail: true,
            ..SlowDirectory::default()
        });
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);

        assert_eq!(cache.resolve("a1b2c3d4e5f6").await, None);
        assert_eq!(cache.display_name("a1b2c3d4e5f6", 6).await, "a1b2c3...");
    }

    /// Accepts the request and never answers
    struct OfflineDirectory;

    impl ProfileSource for OfflineDirectory {
        async fn get_profile(&self, _id: &str) -> Result<Option<UserProfile>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_unanswered_lookup_times_out_to_fallback() {
        let cache = ProfileCache::new(Arc::new(OfflineDirectory), Duration::from_millis(30));

        let resolved = tokio::time::timeout(Duration::from_secs(2), cache.resolve_batch(["a1b2c3d4e5f6"])).await;
        assert!(resolved.is_ok(), "batch resolution outlived the lookup timeout");
        assert_eq!(cache.cached("a1b2c3d4e5f6").await, Some(None));
        assert_eq!(cache.display_name("a1b2c3d4e5f6", 6).await, "a1b2c3...");
        assert_eq!(cache.lookups_issued(), 1);
    }

    #[tokio::test]
    async fn test_uncached_id_uses_fallback_without_fetching() {
        let source = Arc::new(SlowDirectory::default());
        let cache = ProfileCache::new(Arc::clone(&source), LOOKUP_TIMEOUT);
        assert_eq!(cache.cached("mech9").await, None);
        assert_eq!(cache.display_name("mech9", 8).await, "mech9");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_name_is_char_safe() {
        assert_eq!(fallback_name("joão-ferreira", 4), "joão...");
        assert_eq!(fallback_name("abc", 8), "abc");
    }
}
