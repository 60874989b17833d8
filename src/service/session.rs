//! Process-wide cache of the tracker session token.
//!
//! The token lives in the key-value slot under [`COOKIE_KEY`]. A single async mutex
//! serializes population so concurrent messages share one handshake.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::{
    base::config::COOKIE_KEY,
    service::{db::DbClient, tracker::TrackerClient},
};

/// A session token along with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// The token; empty if the handshake failed.
    pub token: String,
    /// Whether the token was served from the cache rather than a fresh handshake.
    pub cached: bool,
}

/// Session token cache.
///
/// It is designed to be trivially cloneable; clones share the same slot and lock.
#[derive(Clone)]
pub struct SessionCache {
    db: DbClient,
    tracker: TrackerClient,
    lock: Arc<Mutex<()>>,
}

impl SessionCache {
    pub fn new(db: DbClient, tracker: TrackerClient) -> Self {
        Self {
            db,
            tracker,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Return the cached token, or perform the handshake and cache its result.
    ///
    /// Never fails: a failed handshake is logged and yields an empty, uncached token.
    #[instrument(skip_all)]
    pub async fn resolve(&self) -> ResolvedSession {
        let _guard = self.lock.lock().await;

        match self.db.get_value(COOKIE_KEY).await {
            Ok(Some(token)) => return ResolvedSession { token, cached: true },
            Ok(None) => {}
            Err(e) => warn!("Failed to read cached session token: {}", e),
        }

        match self.tracker.negotiate_session().await {
            Ok(token) => {
                info!("Caching new session token.");

                if let Err(e) = self.db.set_value(COOKIE_KEY, &token).await {
                    warn!("Failed to cache session token: {}", e);
                }

                ResolvedSession { token, cached: false }
            }
            Err(e) => {
                error!("Negotiated authentication failed: {}", e);
                ResolvedSession { token: String::new(), cached: false }
            }
        }
    }

    /// Drop the cached token if it is still `stale`.
    ///
    /// A token that another task has already replaced is left alone.
    #[instrument(skip_all)]
    pub async fn invalidate(&self, stale: &str) {
        let _guard = self.lock.lock().await;

        match self.db.get_value(COOKIE_KEY).await {
            Ok(Some(current)) if current == stale => {
                info!("Invalidating rejected session token.");

                if let Err(e) = self.db.remove_value(COOKIE_KEY).await {
                    warn!("Failed to invalidate session token: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read cached session token: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        base::types::{Credential, IssueLookup, Res},
        service::tracker::GenericTrackerClient,
    };

    /// Tracker that hands out `token-N` on the N-th handshake, or always fails.
    struct CountingTracker {
        handshakes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GenericTrackerClient for CountingTracker {
        async fn negotiate_session(&self) -> Res<String> {
            let n = self.handshakes.fetch_add(1, Ordering::SeqCst) + 1;

            if self.fail {
                return Err(anyhow::anyhow!("no ticket"));
            }

            Ok(format!("token-{n}"))
        }

        async fn fetch_issue(&self, _issue_id: &str, _credential: &Credential) -> Res<IssueLookup> {
            unreachable!("the cache never fetches issues")
        }
    }

    async fn cache(fail: bool) -> (SessionCache, Arc<CountingTracker>) {
        let tracker = Arc::new(CountingTracker { handshakes: AtomicUsize::new(0), fail });
        let db = DbClient::surreal_memory().await.unwrap();

        (SessionCache::new(db, TrackerClient::new(tracker.clone())), tracker)
    }

    #[tokio::test]
    async fn second_resolve_reuses_the_token() {
        let (cache, tracker) = cache(false).await;

        assert_eq!(cache.resolve().await, ResolvedSession { token: "token-1".to_string(), cached: false });
        assert_eq!(cache.resolve().await, ResolvedSession { token: "token-1".to_string(), cached: true });
        assert_eq!(tracker.handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_handshake() {
        let (cache, tracker) = cache(false).await;

        let (a, b) = tokio::join!(cache.resolve(), cache.resolve());

        assert_eq!(a.token, "token-1");
        assert_eq!(b.token, "token-1");
        assert_eq!(tracker.handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_handshake_yields_empty_uncached_token() {
        let (cache, tracker) = cache(true).await;

        assert_eq!(cache.resolve().await.token, "");
        assert_eq!(cache.resolve().await.token, "");
        assert_eq!(tracker.handshakes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_handshake() {
        let (cache, tracker) = cache(false).await;

        let first = cache.resolve().await;
        cache.invalidate(&first.token).await;

        assert_eq!(cache.resolve().await, ResolvedSession { token: "token-2".to_string(), cached: false });
        assert_eq!(tracker.handshakes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_ignores_replaced_tokens() {
        let (cache, _) = cache(false).await;

        cache.resolve().await;
        cache.invalidate("token-0").await;

        assert!(cache.resolve().await.cached);
    }
}
