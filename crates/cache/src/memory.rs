//! Memory-resident resource cache with a background fetch worker
//!
//! Lookups never wait for a load. A hit is returned at once; a miss is
//! queued for the cache's single fetch worker and reported later through
//! the request's callback. Cached resources are held through weak
//! handles, with a bounded retention ring keeping the most recently used
//! ones alive, so memory is released as soon as neither the ring nor any
//! caller needs a resource.

use crate::callback::{Callback, CompletionCallback, Outcome};
use crate::error::{CacheError, LoadError};
use crate::key::ResourceKey;
use crate::loader::ResourceLoader;
use crate::retention::RetentionRing;
use docview_scheduler::{Demand, FetchWorker, RequestQueue};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Dead weak slots are swept once the map grows past this many entries
/// (or twice the live count after the previous sweep, whichever is larger).
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `get` calls answered from memory
    pub hits: u64,

    /// `get` calls that had to queue a load
    pub misses: u64,

    /// Misses where the entry existed but had already been reclaimed
    pub reclaimed_misses: u64,

    /// Successful loader calls
    pub loads: u64,

    /// Failed loader calls
    pub load_failures: u64,

    /// Queued requests answered by another request's load of the same key
    pub dedup_hits: u64,

    /// Loads skipped because the callback no longer wanted them
    pub abandoned_loads: u64,

    /// Entries whose resource is still alive
    pub resident: usize,

    /// Resources held by the retention ring
    pub retained: usize,

    /// Retention ring capacity
    pub retention_capacity: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A queued request: the key plus whoever is waiting on it
struct PendingRequest<R> {
    key: ResourceKey,
    callback: Option<Callback<R>>,
}

impl<R> Demand for PendingRequest<R> {
    fn is_demand(&self) -> bool {
        self.callback.is_some()
    }
}

enum Lookup<R> {
    Hit(Arc<R>),
    Reclaimed,
    Miss,
}

/// Internal cache state
///
/// The map and the ring live under one lock so no observer ever sees an
/// entry present in one but not the other.
struct CacheState<R> {
    /// Weak handles to loaded resources
    entries: HashMap<ResourceKey, Weak<R>>,

    /// Strong handles to the most recently touched resources
    ring: RetentionRing<R>,

    /// Map size that triggers the next sweep of dead slots
    next_sweep: usize,

    stats: CacheStats,
}

impl<R> CacheState<R> {
    fn new(retention_capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ring: RetentionRing::new(retention_capacity),
            next_sweep: MIN_SWEEP_THRESHOLD.max(retention_capacity.saturating_mul(2)),
            stats: CacheStats::default(),
        }
    }

    /// Look a key up, touching the ring on a hit and dropping a dead slot
    fn lookup(&mut self, key: &ResourceKey) -> Lookup<R> {
        let Some(weak) = self.entries.get(key) else {
            return Lookup::Miss;
        };
        match weak.upgrade() {
            Some(resource) => {
                self.ring.touch(&resource);
                Lookup::Hit(resource)
            }
            None => {
                self.entries.remove(key);
                Lookup::Reclaimed
            }
        }
    }

    /// Install a resource, replacing any prior entry
    fn install(&mut self, key: ResourceKey, resource: &Arc<R>) {
        self.entries.insert(key, Arc::downgrade(resource));
        self.ring.touch(resource);

        if self.entries.len() > self.next_sweep {
            self.sweep();
        }
    }

    /// Drop map slots whose resource has been reclaimed
    fn sweep(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        let live = self.entries.len();
        self.next_sweep = MIN_SWEEP_THRESHOLD.max(live.saturating_mul(2));

        tracing::trace!(removed = before - live, live, "swept reclaimed cache slots");
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.ring.clear();
        self.next_sweep = MIN_SWEEP_THRESHOLD.max(self.ring.capacity().saturating_mul(2));
    }

    fn resident(&self) -> usize {
        self.entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Asynchronous, memory-adaptive resource cache
///
/// One instance per resource family (page images, thumbnails, page text,
/// ...). Each instance owns a single fetch worker thread, so loads for one
/// cache never run concurrently and a slow or shared backend sees at most
/// one outstanding request per cache.
///
/// Requests that carry a callback are serviced before bare prefetch
/// hints, and within each group the most recent request goes first.
/// Several requests for the same key collapse into one load; the later
/// ones are answered from memory.
///
/// # Example
///
/// ```
/// use docview_cache::{callback_fn, loader_fn, MemoryResidentCache, Outcome, ResourceKey};
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let loader = loader_fn(|_doc: &str, page: i32, _selector: i32| Ok(vec![page as u8; 4]));
/// let cache = MemoryResidentCache::new("page-image", loader, 50).unwrap();
///
/// let key = ResourceKey::new("doc1", 3, 0);
/// let (tx, rx) = mpsc::channel();
/// let callback = callback_fn(move |outcome: Outcome<Vec<u8>>| {
///     tx.send(outcome).ok();
/// });
///
/// // Not cached yet: the request is queued and `get` returns at once.
/// assert!(cache.get(&key, Some(callback)).is_none());
///
/// let page = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
/// assert_eq!(*page, vec![3, 3, 3, 3]);
///
/// // Now it is served from memory.
/// assert!(cache.check(&key).is_some());
/// ```
pub struct MemoryResidentCache<R: Send + Sync + 'static> {
    name: String,
    state: Arc<Mutex<CacheState<R>>>,
    queue: Arc<RequestQueue<PendingRequest<R>>>,
    loader: Arc<dyn ResourceLoader<Resource = R>>,
    worker: Option<FetchWorker>,
}

impl<R: Send + Sync + 'static> MemoryResidentCache<R> {
    /// Create a cache in front of `loader` and start its fetch worker
    ///
    /// # Arguments
    ///
    /// * `name` - Label used for the worker thread and in logs
    /// * `loader` - Source consulted on a miss
    /// * `retention_capacity` - Number of recently used resources kept
    ///   alive regardless of callers; zero keeps only what callers hold
    pub fn new<L>(
        name: impl Into<String>,
        loader: L,
        retention_capacity: usize,
    ) -> Result<Self, CacheError>
    where
        L: ResourceLoader<Resource = R> + 'static,
    {
        Self::with_shared_loader(name, Arc::new(loader), retention_capacity)
    }

    /// Create a cache around a loader that is shared with other owners
    pub fn with_shared_loader(
        name: impl Into<String>,
        loader: Arc<dyn ResourceLoader<Resource = R>>,
        retention_capacity: usize,
    ) -> Result<Self, CacheError> {
        let name = name.into();
        let state = Arc::new(Mutex::new(CacheState::new(retention_capacity)));
        let queue = Arc::new(RequestQueue::new());

        let worker = FetchWorker::spawn(name.clone(), queue.clone(), {
            let state = state.clone();
            let queue = queue.clone();
            let loader = loader.clone();
            move |request: PendingRequest<R>| process(&state, &queue, &*loader, request)
        })
        .map_err(CacheError::SpawnWorker)?;

        Ok(Self {
            name,
            state,
            queue,
            loader,
            worker: Some(worker),
        })
    }

    /// Retrieve a resource, queueing a load on a miss
    ///
    /// On a hit the resource is returned, and if a callback was supplied
    /// it is invoked right here, before `get` returns. On a miss a request
    /// is queued and `None` is returned immediately; the callback, if any,
    /// is invoked exactly once later from the fetch worker.
    ///
    /// Calling with no callback is a cheap existence check that doubles
    /// as a prefetch hint.
    pub fn get(&self, key: &ResourceKey, callback: Option<Callback<R>>) -> Option<Arc<R>> {
        let lookup = {
            let mut state = self.state.lock();
            let lookup = state.lookup(key);
            match lookup {
                Lookup::Hit(_) => state.stats.hits += 1,
                Lookup::Reclaimed => {
                    state.stats.misses += 1;
                    state.stats.reclaimed_misses += 1;
                }
                Lookup::Miss => state.stats.misses += 1,
            }
            lookup
        };

        match lookup {
            Lookup::Hit(resource) => {
                tracing::trace!(cache = %self.name, key = %key, "cache hit");
                if let Some(callback) = callback {
                    callback.on_complete(Ok(resource.clone()));
                }
                return Some(resource);
            }
            Lookup::Reclaimed => {
                tracing::debug!(cache = %self.name, key = %key, "entry was reclaimed; re-fetching");
            }
            Lookup::Miss => {}
        }

        tracing::trace!(
            cache = %self.name,
            key = %key,
            demand = callback.is_some(),
            "queueing fetch"
        );
        self.queue.push_front(PendingRequest {
            key: key.clone(),
            callback,
        });
        None
    }

    /// Queue a load for `key` unless it is already in memory
    ///
    /// Returns `true` if the resource was already resident.
    pub fn prefetch(&self, key: &ResourceKey) -> bool {
        self.get(key, None).is_some()
    }

    /// Retrieve a resource only if it is already in memory
    ///
    /// Never queues a load and never touches the loader.
    pub fn check(&self, key: &ResourceKey) -> Option<Arc<R>> {
        match self.state.lock().lookup(key) {
            Lookup::Hit(resource) => Some(resource),
            Lookup::Reclaimed | Lookup::Miss => None,
        }
    }

    /// Install a resource obtained elsewhere, replacing any prior entry
    ///
    /// Returns the shared handle now stored in the cache.
    pub fn put(&self, key: ResourceKey, resource: impl Into<Arc<R>>) -> Arc<R> {
        let resource = resource.into();
        self.state.lock().install(key, &resource);
        resource
    }

    /// Drop every cached entry and every retained resource
    ///
    /// Requests already queued or loading are unaffected and repopulate
    /// the cache when they finish.
    pub fn clear(&self) {
        self.state.lock().clear();
        tracing::debug!(cache = %self.name, "cache cleared");
    }

    /// Returns `true` if a request for `key` is waiting in the queue
    ///
    /// The request currently being loaded is not counted.
    pub fn has_pending(&self, key: &ResourceKey) -> bool {
        self.queue.any(|request| &request.key == key)
    }

    /// Number of requests waiting in the queue
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Remove queued prefetch hints whose key matches the predicate
    ///
    /// Requests carrying a callback are never removed, so every callback
    /// still gets its notification. Returns the number removed.
    pub fn discard_prefetch<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&ResourceKey) -> bool,
    {
        let removed = self
            .queue
            .remove_if(|request| request.callback.is_none() && predicate(&request.key));
        if !removed.is_empty() {
            tracing::debug!(
                cache = %self.name,
                count = removed.len(),
                "discarded prefetch requests"
            );
        }
        removed.len()
    }

    /// Ask every callback still waiting in the queue to flush
    pub fn flush_pending(&self) {
        let callbacks: Vec<Callback<R>> = self
            .queue
            .snapshot(|request| request.callback.clone())
            .into_iter()
            .flatten()
            .collect();

        for callback in callbacks {
            callback.flush();
        }
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.resident = state.resident();
        stats.retained = state.ring.len();
        stats.retention_capacity = state.ring.capacity();
        stats
    }

    /// The loader consulted on a miss
    pub fn loader(&self) -> &Arc<dyn ResourceLoader<Resource = R>> {
        &self.loader
    }

    pub fn retention_capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R: Send + Sync + 'static> fmt::Debug for MemoryResidentCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryResidentCache")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl<R: Send + Sync + 'static> Drop for MemoryResidentCache<R> {
    /// Stops the fetch worker; queued requests are dropped unanswered.
    fn drop(&mut self) {
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
    }
}

/// Service one queued request on the fetch worker
///
/// Requests for the same key still waiting in the queue are answered with
/// the same outcome, so a burst costs one load even when nothing retains
/// the resource in between.
fn process<R>(
    state: &Mutex<CacheState<R>>,
    queue: &RequestQueue<PendingRequest<R>>,
    loader: &dyn ResourceLoader<Resource = R>,
    request: PendingRequest<R>,
) where
    R: Send + Sync + 'static,
{
    let PendingRequest { key, callback } = request;

    let cached = match state.lock().lookup(&key) {
        Lookup::Hit(resource) => Some(resource),
        Lookup::Reclaimed | Lookup::Miss => None,
    };

    let outcome = match cached {
        Some(resource) => {
            state.lock().stats.dedup_hits += 1;
            tracing::debug!(key = %key, "already loaded by an earlier request");
            Ok(resource)
        }
        None => {
            if let Some(callback) = &callback {
                if !still_wanted(&key, &**callback) {
                    state.lock().stats.abandoned_loads += 1;
                    tracing::debug!(key = %key, "load no longer wanted; skipping");
                    return;
                }
            }

            tracing::debug!(key = %key, "loading");
            match load(loader, &key) {
                Ok(resource) => {
                    let resource = Arc::new(resource);
                    let mut state = state.lock();
                    state.install(key.clone(), &resource);
                    state.stats.loads += 1;
                    Ok(resource)
                }
                Err(err) => {
                    state.lock().stats.load_failures += 1;
                    tracing::debug!(key = %key, error = %err, "load failed");
                    Err(err)
                }
            }
        }
    };

    let duplicates = queue.take_matching(|pending| pending.key == key);
    if !duplicates.is_empty() {
        state.lock().stats.dedup_hits += duplicates.len() as u64;
        tracing::debug!(key = %key, count = duplicates.len(), "answering queued duplicates");
    }

    let waiting = callback
        .into_iter()
        .chain(duplicates.into_iter().filter_map(|pending| pending.callback));
    for callback in waiting {
        deliver(&key, &*callback, outcome.clone());
    }
}

/// Call the loader, turning a panic into [`LoadError::Internal`]
fn load<R>(loader: &dyn ResourceLoader<Resource = R>, key: &ResourceKey) -> Result<R, LoadError>
where
    R: Send + Sync + 'static,
{
    let fetched = panic::catch_unwind(AssertUnwindSafe(|| {
        loader.fetch(key.document_id(), key.page_index(), key.selector())
    }));

    fetched.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(key = %key, panic = %message, "loader panicked");
        Err(LoadError::Internal(format!("loader panicked: {}", message)))
    })
}

fn still_wanted<R>(key: &ResourceKey, callback: &dyn CompletionCallback<R>) -> bool
where
    R: Send + Sync + 'static,
{
    let wanted = panic::catch_unwind(AssertUnwindSafe(|| callback.should_still_load()));
    wanted.unwrap_or_else(|_| {
        tracing::warn!(key = %key, "should_still_load panicked; loading anyway");
        true
    })
}

fn deliver<R>(key: &ResourceKey, callback: &dyn CompletionCallback<R>, outcome: Outcome<R>)
where
    R: Send + Sync + 'static,
{
    if panic::catch_unwind(AssertUnwindSafe(|| callback.on_complete(outcome))).is_err() {
        tracing::error!(key = %key, "completion callback panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{callback_fn, CancellableCallback};
    use crate::loader::loader_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn key(page: i32) -> ResourceKey {
        ResourceKey::new("doc1", page, 0)
    }

    /// Loader returning `[page]` and counting its calls
    fn counting_loader(calls: Arc<AtomicUsize>) -> impl ResourceLoader<Resource = Vec<u8>> {
        loader_fn(move |_: &str, page: i32, _: i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![page as u8])
        })
    }

    fn channel_callback() -> (Callback<Vec<u8>>, mpsc::Receiver<Outcome<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let callback = callback_fn(move |outcome: Outcome<Vec<u8>>| {
            tx.lock().send(outcome).unwrap();
        });
        (callback, rx)
    }

    #[test]
    fn test_put_then_get_skips_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls.clone()), 4).unwrap();

        cache.put(key(1), vec![9, 9]);
        let got = cache.get(&key(1), None).expect("put value should be resident");

        assert_eq!(*got, vec![9, 9]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_put_replaces_prior_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 4).unwrap();

        cache.put(key(1), vec![1]);
        cache.put(key(1), vec![2]);

        assert_eq!(*cache.check(&key(1)).unwrap(), vec![2]);
    }

    #[test]
    fn test_check_never_loads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls.clone()), 4).unwrap();

        assert!(cache.check(&key(1)).is_none());
        assert!(cache.check(&key(1)).is_none());
        thread::sleep(Duration::from_millis(50));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn test_miss_then_callback_then_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls.clone()), 4).unwrap();
        let (callback, rx) = channel_callback();

        assert!(cache.get(&key(5), Some(callback)).is_none());

        let delivered = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(*delivered, vec![5]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        let again = cache.get(&key(5), None).unwrap();
        assert!(Arc::ptr_eq(&delivered, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hit_invokes_callback_inline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 4).unwrap();
        cache.put(key(2), vec![2]);

        let (callback, rx) = channel_callback();
        assert!(cache.get(&key(2), Some(callback)).is_some());

        // Delivered before `get` returned.
        assert_eq!(*rx.try_recv().unwrap().unwrap(), vec![2]);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_fn({
            let calls = calls.clone();
            move |doc: &str, page: i32, _: i32| -> Result<Vec<u8>, LoadError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoadError::NotFound(format!("{doc}/{page}")))
            }
        });
        let cache = MemoryResidentCache::new("test", loader, 4).unwrap();

        let (callback, rx) = channel_callback();
        cache.get(&key(99), Some(callback));
        assert!(rx.recv_timeout(WAIT).unwrap().unwrap_err().is_not_found());

        let (callback, rx) = channel_callback();
        cache.get(&key(99), Some(callback));
        assert!(rx.recv_timeout(WAIT).unwrap().is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().load_failures, 2);
        assert!(cache.check(&key(99)).is_none());
    }

    #[test]
    fn test_abandoned_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls.clone()), 4).unwrap();

        let (inner, rx) = channel_callback();
        let (callback, token) = CancellableCallback::wrap(inner);
        token.cancel();

        cache.get(&key(3), Some(callback));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().abandoned_loads, 1);
        assert!(cache.check(&key(3)).is_none());
    }

    #[test]
    fn test_loader_panic_is_contained() {
        let loader = loader_fn(|_: &str, page: i32, _: i32| {
            if page == 0 {
                panic!("decoder blew up");
            }
            Ok(vec![page as u8])
        });
        let cache = MemoryResidentCache::new("test", loader, 4).unwrap();

        let (callback, rx) = channel_callback();
        cache.get(&key(0), Some(callback));
        match rx.recv_timeout(WAIT).unwrap() {
            Err(LoadError::Internal(message)) => assert!(message.contains("decoder blew up")),
            other => panic!("expected internal error, got {:?}", other),
        }

        // The worker is still alive.
        let (callback, rx) = channel_callback();
        cache.get(&key(1), Some(callback));
        assert_eq!(*rx.recv_timeout(WAIT).unwrap().unwrap(), vec![1]);
    }

    #[test]
    fn test_callback_panic_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 4).unwrap();

        cache.get(&key(1), Some(callback_fn(|_: Outcome<Vec<u8>>| panic!("bad consumer"))));

        let (callback, rx) = channel_callback();
        cache.get(&key(2), Some(callback));
        assert!(rx.recv_timeout(WAIT).unwrap().is_ok());
    }

    #[test]
    fn test_retention_bound_allows_reclamation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 2).unwrap();

        for page in 0..5 {
            cache.put(key(page), vec![page as u8]);
        }

        let stats = cache.stats();
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.resident, 2);

        assert!(cache.check(&key(0)).is_none());
        assert!(cache.check(&key(3)).is_some());
        assert!(cache.check(&key(4)).is_some());

        assert!(cache.get(&key(1), None).is_none());
        assert_eq!(cache.stats().reclaimed_misses, 1);
    }

    #[test]
    fn test_caller_handle_keeps_resource_alive() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 0).unwrap();

        let held = cache.put(key(1), vec![1]);
        assert!(cache.check(&key(1)).is_some());

        drop(held);
        assert!(cache.check(&key(1)).is_none());
    }

    #[test]
    fn test_duplicates_share_one_load_without_retention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_fn({
            let calls = calls.clone();
            move |_: &str, page: i32, _: i32| {
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(vec![page as u8])
            }
        });
        let cache = MemoryResidentCache::new("test", loader, 0).unwrap();

        let receivers: Vec<_> = (0..4)
            .map(|_| {
                let (callback, rx) = channel_callback();
                assert!(cache.get(&key(7), Some(callback)).is_none());
                rx
            })
            .collect();

        // Each consumer drops its handle, so nothing keeps the page resident.
        for rx in receivers {
            assert_eq!(*rx.recv_timeout(WAIT).unwrap().unwrap(), vec![7]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().dedup_hits, 3);
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn test_largest_retention_capacity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache =
            MemoryResidentCache::new("test", counting_loader(calls.clone()), usize::MAX).unwrap();

        cache.put(key(1), vec![1]);
        let (callback, rx) = channel_callback();
        cache.get(&key(2), Some(callback));
        rx.recv_timeout(WAIT).unwrap().unwrap();

        assert!(cache.check(&key(1)).is_some());
        assert!(cache.check(&key(2)).is_some());
        assert_eq!(cache.stats().retained, 2);

        cache.clear();
        assert_eq!(cache.stats().retained, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 8).unwrap();

        for page in 0..3 {
            cache.put(key(page), vec![page as u8]);
        }
        cache.clear();

        for page in 0..3 {
            assert!(cache.check(&key(page)).is_none());
        }
        let stats = cache.stats();
        assert_eq!(stats.resident, 0);
        assert_eq!(stats.retained, 0);
    }

    #[test]
    fn test_sweep_drops_dead_slots() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 1).unwrap();

        for page in 0..(MIN_SWEEP_THRESHOLD as i32 * 3) {
            cache.put(key(page), vec![0]);
        }

        let state = cache.state.lock();
        assert!(state.entries.len() <= MIN_SWEEP_THRESHOLD + 1);
    }

    #[test]
    fn test_stats_hit_rate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 4).unwrap();
        cache.put(key(1), vec![1]);

        cache.get(&key(1), None);
        cache.get(&key(1), None);
        cache.get(&key(1), None);
        cache.get(&key(2), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
        assert_eq!(stats.retention_capacity, 4);
    }

    #[test]
    fn test_drop_stops_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoryResidentCache::new("test", counting_loader(calls), 4).unwrap();
        cache.prefetch(&key(1));

        // Must not hang.
        drop(cache);
    }
}
