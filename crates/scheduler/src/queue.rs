//! Pending-request queue with demand-first selection
//!
//! Requests are inserted at the front, so the list is ordered most recent
//! first. Selection scans from the front for the first request somebody
//! is waiting on; if there is none, the front-most request wins. A page
//! that just became visible therefore overtakes stale read-ahead hints.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Tells the queue whether a request has a waiting consumer
///
/// Demand requests are serviced before any speculative request,
/// regardless of insertion order.
pub trait Demand {
    /// Returns `true` if someone is waiting on the result of this request
    fn is_demand(&self) -> bool;
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total requests pushed
    pub submitted: u64,

    /// Demand requests handed to the consumer
    pub demand_serviced: u64,

    /// Speculative requests handed to the consumer
    pub prefetch_serviced: u64,

    /// Requests removed without being serviced
    pub discarded: u64,

    /// Requests currently waiting
    pub queue_size: usize,
}

impl QueueStats {
    /// Total requests handed to the consumer
    pub fn serviced(&self) -> u64 {
        self.demand_serviced + self.prefetch_serviced
    }
}

struct QueueState<T> {
    /// Most recently pushed at the front
    pending: VecDeque<T>,

    closed: bool,

    stats: QueueStats,
}

impl<T: Demand> QueueState<T> {
    /// Index of the request the consumer should take next
    fn select(&self) -> Option<usize> {
        if self.pending.is_empty() {
            return None;
        }
        Some(
            self.pending
                .iter()
                .position(Demand::is_demand)
                .unwrap_or(0),
        )
    }

    fn take_selected(&mut self) -> Option<T> {
        let index = self.select()?;
        let item = self.pending.remove(index)?;

        if item.is_demand() {
            self.stats.demand_serviced += 1;
        } else {
            self.stats.prefetch_serviced += 1;
        }
        Some(item)
    }
}

/// Thread-safe pending-request list for a single consumer
///
/// Producers call [`push_front`](Self::push_front) and never block beyond
/// the short critical section. The consumer blocks in
/// [`next_blocking`](Self::next_blocking) until a request arrives or the
/// queue is closed.
///
/// # Example
///
/// ```
/// use docview_scheduler::{Demand, RequestQueue};
///
/// struct Req(&'static str, bool);
///
/// impl Demand for Req {
///     fn is_demand(&self) -> bool {
///         self.1
///     }
/// }
///
/// let queue = RequestQueue::new();
/// queue.push_front(Req("visible page", true));
/// queue.push_front(Req("read-ahead", false));
///
/// // The demand request wins even though it is older.
/// assert_eq!(queue.try_next().unwrap().0, "visible page");
/// assert_eq!(queue.try_next().unwrap().0, "read-ahead");
/// assert!(queue.try_next().is_none());
/// ```
pub struct RequestQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T: Demand> RequestQueue<T> {
    /// Create a new empty, open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                closed: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        }
    }

    /// Insert a request at the front of the list and wake the consumer
    ///
    /// Requests pushed after [`close`](Self::close) are dropped.
    pub fn push_front(&self, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            state.stats.discarded += 1;
            return;
        }
        state.pending.push_front(item);
        state.stats.submitted += 1;
        drop(state);

        self.available.notify_one();
    }

    /// Take the next request without waiting
    pub fn try_next(&self) -> Option<T> {
        self.state.lock().take_selected()
    }

    /// Take the next request, waiting until one is available
    ///
    /// Returns `None` once the queue has been closed.
    pub fn next_blocking(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.take_selected() {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Close the queue, dropping whatever is still pending
    ///
    /// Wakes the consumer so it can observe the close and exit.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.stats.discarded += state.pending.len() as u64;
        state.pending.clear();
        drop(state);

        self.available.notify_all();
    }

    /// Returns `true` once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of requests currently waiting
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if no request is waiting
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Returns `true` if any waiting request matches the predicate
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.state.lock().pending.iter().any(predicate)
    }

    /// Remove every waiting request that matches the predicate
    ///
    /// The removed requests are returned in queue order so the caller can
    /// dispose of them outside the lock.
    pub fn remove_if<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.pending.len());

        for item in state.pending.drain(..) {
            if predicate(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        state.pending = kept;
        state.stats.discarded += removed.len() as u64;

        removed
    }

    /// Hand every waiting request that matches the predicate to the consumer
    ///
    /// Like [`remove_if`](Self::remove_if), but the requests count as
    /// serviced rather than discarded. Used when one unit of work answers
    /// several queued requests at once.
    pub fn take_matching<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.state.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(state.pending.len());

        for item in state.pending.drain(..) {
            if predicate(&item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        state.pending = kept;

        for item in &taken {
            if item.is_demand() {
                state.stats.demand_serviced += 1;
            } else {
                state.stats.prefetch_serviced += 1;
            }
        }

        taken
    }

    /// Collect a value from every waiting request, front to back
    pub fn snapshot<F, U>(&self, f: F) -> Vec<U>
    where
        F: FnMut(&T) -> U,
    {
        self.state.lock().pending.iter().map(f).collect()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.queue_size = state.pending.len();
        stats
    }
}

impl<T: Demand> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
