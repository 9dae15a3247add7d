// Resource cache - key-addressed cache of fetched resources
//
// Every remote resource lives under a structured tuple key (["chats"],
// ["chats", id, "messages"], ...). The cache owns the fetched data and its
// staleness; views own nothing but subscriptions. Three rules govern it:
//
// 1. De-duplication: at most one in-flight fetch per key. Concurrent
//    requesters for the same key await the same result over a broadcast
//    channel instead of issuing duplicate network calls.
// 2. Prefix invalidation: invalidating ["chats"] also invalidates
//    ["chats", "42", "messages"] - a writer does not need to know every
//    dependent view. Entries with live subscribers refetch in the
//    background; entries nobody watches are dropped and refetched lazily.
// 3. Notification: subscribers of a key receive a CacheUpdate whenever that
//    key's data changes. A dropped subscriber stops receiving deliveries;
//    an in-flight result is still cached for everyone else.
//
// Values are the gateway's normalized JSON (Arc<Value>); typed decoding
// happens at the resource layer. Errors are never cached as data: a failed
// fetch is delivered to every waiter and the entry stays refetchable.

use crate::error::ApiError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

/// Outcome of a fetch, as delivered to callers and subscribers.
pub type FetchResult = Result<Arc<Value>, ApiError>;

/// Fetch function stored with each entry so invalidation can refetch
/// without the writer re-supplying it.
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Cache Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Structured identifier for a cached resource.
///
/// Keys are tuples so that invalidating a prefix invalidates every key
/// sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// True when this key begins with every segment of `prefix`.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries and updates
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// No data yet (unknown key, first fetch in flight, or stale refetch).
    Pending,
    /// Fresh data available.
    Ready,
    /// The last fetch failed and no fresh data is available.
    Error,
}

/// Notification delivered to subscribers of a key.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub key: CacheKey,
    pub result: FetchResult,
}

struct Entry {
    fetcher: Fetcher,
    data: Option<Arc<Value>>,
    stale: bool,
    last_error: Option<ApiError>,
}

impl Entry {
    fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            data: None,
            stale: false,
            last_error: None,
        }
    }
}

/// A view's registration of interest in one key.
///
/// Dropping the subscription unregisters it: the cache prunes the closed
/// channel at the next notification, and results that were in flight are
/// still cached for other subscribers.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<CacheUpdate>,
}

impl Subscription {
    /// Wait for the next change to the subscribed key. Returns None if the
    /// cache has been dropped.
    pub async fn changed(&mut self) -> Option<CacheUpdate> {
        self.rx.recv().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The cache
// ─────────────────────────────────────────────────────────────────────────────

struct Inner {
    entries: HashMap<CacheKey, Entry>,
    inflight: HashMap<CacheKey, broadcast::Sender<FetchResult>>,
    subscribers: HashMap<CacheKey, Vec<mpsc::UnboundedSender<CacheUpdate>>>,
}

/// What a get() call decided under the lock; resolved outside it.
/// (Fresh hits return early and never reach this.)
enum Lookup {
    Leader,
    Follower(broadcast::Receiver<FetchResult>),
}

/// Key-addressed resource cache with de-duplication, prefix invalidation and
/// per-key subscriptions. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Mutex<Inner>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Return cached data for `key` if fresh; otherwise run `fetcher` -
    /// at most once even under concurrent callers - cache the result, and
    /// notify subscribers of the key.
    pub async fn get<F, Fut>(&self, key: CacheKey, fetcher: F) -> FetchResult
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || -> BoxFuture<'static, Result<Value, ApiError>> {
            Box::pin(fetcher())
        });
        self.get_with(key, fetcher).await
    }

    async fn get_with(&self, key: CacheKey, fetcher: Fetcher) -> FetchResult {
        let lookup = {
            let mut inner = self.inner.lock().unwrap();

            match inner.entries.get_mut(&key) {
                Some(entry) => {
                    // Keep the newest fetcher; background refetches use it.
                    entry.fetcher = fetcher.clone();
                    if !entry.stale {
                        if let Some(data) = &entry.data {
                            return Ok(data.clone());
                        }
                    }
                }
                None => {
                    inner.entries.insert(key.clone(), Entry::new(fetcher.clone()));
                }
            }

            match inner.inflight.get(&key) {
                Some(tx) => Lookup::Follower(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(4);
                    inner.inflight.insert(key.clone(), tx);
                    Lookup::Leader
                }
            }
        };

        match lookup {
            Lookup::Leader => self.run_fetch(key, fetcher).await,
            Lookup::Follower(mut rx) => match rx.recv().await {
                Ok(result) => result,
                // The fetching task disappeared without completing.
                Err(_) => Err(ApiError::Network("fetch abandoned".to_string())),
            },
        }
    }

    /// Mark every entry whose key starts with `prefix` stale. Entries with
    /// active subscribers refetch in the background; entries without are
    /// dropped and refetched lazily on next access.
    ///
    /// Returns before the refetches complete - post-invalidation data is
    /// eventually consistent, not immediately available.
    pub fn invalidate(&self, prefix: &CacheKey) {
        let refetches: Vec<(CacheKey, Fetcher)> = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;

            let matching: Vec<CacheKey> = inner
                .entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();

            let mut refetches = Vec::new();
            for key in matching {
                // Prune subscribers whose receiving end is gone before
                // deciding whether anyone is still watching.
                let watched = match inner.subscribers.get_mut(&key) {
                    Some(subs) => {
                        subs.retain(|tx| !tx.is_closed());
                        !subs.is_empty()
                    }
                    None => false,
                };

                if watched {
                    let entry = inner
                        .entries
                        .get_mut(&key)
                        .expect("matching key disappeared under lock");
                    entry.stale = true;
                    if !inner.inflight.contains_key(&key) {
                        let (tx, _) = broadcast::channel(4);
                        inner.inflight.insert(key.clone(), tx);
                        refetches.push((key, entry.fetcher.clone()));
                    }
                } else {
                    inner.entries.remove(&key);
                    inner.subscribers.remove(&key);
                }
            }
            refetches
        };

        for (key, fetcher) in refetches {
            tracing::debug!(key = %key, "Invalidated, refetching in background");
            let cache = self.clone();
            tokio::spawn(async move {
                // Failures are delivered to subscribers; nothing to do here.
                let _ = cache.run_fetch(key, fetcher).await;
            });
        }
    }

    /// Register interest in a key for the caller's lifetime.
    pub fn subscribe(&self, key: CacheKey) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .entry(key)
            .or_default()
            .push(tx);
        Subscription { rx }
    }

    /// Current snapshot for a key, without fetching.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(key)
            .and_then(|e| e.data.clone())
    }

    /// Observable status of a key. Absent data is pending, not an error.
    pub fn status(&self, key: &CacheKey) -> EntryStatus {
        let inner = self.inner.lock().unwrap();
        if inner.inflight.contains_key(key) {
            return EntryStatus::Pending;
        }
        match inner.entries.get(key) {
            Some(entry) if entry.data.is_some() && !entry.stale => EntryStatus::Ready,
            Some(entry) if entry.last_error.is_some() => EntryStatus::Error,
            _ => EntryStatus::Pending,
        }
    }

    /// Run the single fetch for a key and fan the outcome out to the
    /// de-duplicated waiters and the key's subscribers.
    async fn run_fetch(&self, key: CacheKey, fetcher: Fetcher) -> FetchResult {
        tracing::debug!(key = %key, "Fetching resource");
        let result: FetchResult = fetcher().await.map(Arc::new);
        self.complete_fetch(&key, result.clone());
        result
    }

    fn complete_fetch(&self, key: &CacheKey, result: FetchResult) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            let waiters = inner.inflight.remove(key);

            // The entry may have been dropped by an invalidation while the
            // fetch was in flight; then there is nothing to store into.
            if let Some(entry) = inner.entries.get_mut(key) {
                match &result {
                    Ok(data) => {
                        entry.data = Some(data.clone());
                        entry.stale = false;
                        entry.last_error = None;
                    }
                    Err(e) => {
                        entry.last_error = Some(e.clone());
                    }
                }
            }
            waiters
        };

        if let Some(tx) = waiters {
            // Ignore the error: no follower happens to be waiting.
            let _ = tx.send(result.clone());
        }

        self.notify(CacheUpdate {
            key: key.clone(),
            result,
        });
    }

    fn notify(&self, update: CacheUpdate) {
        let mut inner = self.inner.lock().unwrap();
        let mut drained = false;
        if let Some(subs) = inner.subscribers.get_mut(&update.key) {
            // Sending to a dropped subscription fails; prune it here.
            subs.retain(|tx| tx.send(update.clone()).is_ok());
            drained = subs.is_empty();
        }
        if drained {
            inner.subscribers.remove(&update.key);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(key)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(parts: &[&str]) -> CacheKey {
        CacheKey::new(parts.iter().copied())
    }

    /// Fetcher returning the number of times it has been called.
    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync + 'static {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!(n))
            })
        }
    }

    #[test]
    fn test_key_prefix_matching() {
        let messages = key(&["chats", "42", "messages"]);
        assert!(messages.starts_with(&key(&["chats"])));
        assert!(messages.starts_with(&key(&["chats", "42"])));
        assert!(messages.starts_with(&messages.clone()));
        assert!(!messages.starts_with(&key(&["chats", "7"])));
        assert!(!key(&["chats"]).starts_with(&messages));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key(&["chats", "42", "messages"]).to_string(), "chats/42/messages");
    }

    #[tokio::test]
    async fn test_concurrent_gets_invoke_fetcher_once() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get(key(&["chats"]), counting_fetcher(calls.clone())),
            cache.get(key(&["chats"]), counting_fetcher(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Both callers observe the same in-flight result.
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_fetcher() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get(key(&["chats"]), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        let second = cache
            .get(key(&["chats"]), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(cache.status(&key(&["chats"])), EntryStatus::Ready);
    }

    #[tokio::test]
    async fn test_invalidate_without_subscribers_refetches_lazily() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chats = key(&["chats"]);

        let before = cache
            .get(chats.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(*before, json!(1));

        cache.invalidate(&chats);
        // Dropped, not refetched eagerly.
        assert!(cache.peek(&chats).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Next access refetches and never observes the pre-invalidation value.
        let after = cache
            .get(chats.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(*after, json!(2));
    }

    #[tokio::test]
    async fn test_invalidate_with_subscriber_refetches_in_background() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chats = key(&["chats"]);

        let mut sub = cache.subscribe(chats.clone());
        cache
            .get(chats.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        // The initial fetch is delivered to the subscriber.
        let first = sub.changed().await.unwrap();
        assert_eq!(*first.result.unwrap(), json!(1));

        cache.invalidate(&chats);
        let refreshed = sub.changed().await.unwrap();
        assert_eq!(*refreshed.result.unwrap(), json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.peek(&chats).map(|v| (*v).clone()), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_prefix_invalidation_covers_nested_keys() {
        let cache = ResourceCache::new();
        let chats_calls = Arc::new(AtomicUsize::new(0));
        let msgs_calls = Arc::new(AtomicUsize::new(0));
        let chats = key(&["chats"]);
        let messages = key(&["chats", "42", "messages"]);

        cache
            .get(chats.clone(), counting_fetcher(chats_calls.clone()))
            .await
            .unwrap();
        cache
            .get(messages.clone(), counting_fetcher(msgs_calls.clone()))
            .await
            .unwrap();

        cache.invalidate(&chats);

        assert!(cache.peek(&chats).is_none());
        assert!(cache.peek(&messages).is_none());

        cache
            .get(messages.clone(), counting_fetcher(msgs_calls.clone()))
            .await
            .unwrap();
        assert_eq!(msgs_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_still_caches_result() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chats = key(&["chats"]);

        let sub = cache.subscribe(chats.clone());
        drop(sub);

        cache
            .get(chats.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        // Result cached despite the unregistered caller...
        assert!(cache.peek(&chats).is_some());
        // ...and the dead channel was pruned at notification time.
        assert_eq!(cache.subscriber_count(&chats), 0);
    }

    #[tokio::test]
    async fn test_errors_propagate_and_are_not_cached() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chats = key(&["chats"]);

        let flaky = |calls: Arc<AtomicUsize>| {
            move || {
                let calls = calls.clone();
                Box::pin(async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Err(ApiError::Network("connection refused".to_string()))
                    } else {
                        Ok(json!(n))
                    }
                }) as BoxFuture<'static, Result<Value, ApiError>>
            }
        };

        let err = cache.get(chats.clone(), flaky(calls.clone())).await;
        assert!(matches!(err, Err(ApiError::Network(_))));
        assert_eq!(cache.status(&chats), EntryStatus::Error);

        // The failure was not cached as data; the next access retries.
        let ok = cache.get(chats.clone(), flaky(calls.clone())).await.unwrap();
        assert_eq!(*ok, json!(2));
        assert_eq!(cache.status(&chats), EntryStatus::Ready);
    }
}
