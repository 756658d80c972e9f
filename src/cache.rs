// Page cache
// Rendered HTML of the home feed, kept for a short time-to-live

use moka::future::Cache;
use std::time::Duration;

use crate::models::User;

/// Rendered pages keyed by request URI and viewer.
///
/// Entries are not invalidated on writes: a new post shows up on a cached
/// page only once the entry expires or the cache is cleared.
#[derive(Clone)]
pub struct PageCache {
    inner: Cache<String, String>,
}

impl PageCache {
    pub fn new(time_to_live: Duration) -> Self {
        PageCache {
            inner: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(time_to_live)
                .build(),
        }
    }

    /// Cache key for `uri` (path and query) as seen by `viewer`.
    pub fn key(uri: &str, viewer: Option<&User>) -> String {
        match viewer {
            Some(user) => format!("{}|{}", uri, user.id),
            None => format!("{}|anon", uri),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, html: String) {
        self.inner.insert(key, html).await;
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
