//! Dedicated fetch worker thread.
//!
//! Each queue gets exactly one worker, so requests are executed strictly
//! one after another. This bounds the load placed on a shared backend
//! (disk, a repository server) at the cost of latency under load.

use crate::{Demand, RequestQueue};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// A single background thread draining a [`RequestQueue`].
///
/// The worker blocks while the queue is empty and exits once the queue is
/// closed. The handler is expected to absorb ordinary failures itself; a
/// panic escaping the handler is an internal fault and aborts the process,
/// because a dead worker would stall every future request on its queue
/// without anyone noticing.
///
/// # Example
///
/// ```
/// use docview_scheduler::{Demand, FetchWorker, RequestQueue};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Prefetch(u32);
///
/// impl Demand for Prefetch {
///     fn is_demand(&self) -> bool {
///         false
///     }
/// }
///
/// let queue = Arc::new(RequestQueue::new());
/// let handled = Arc::new(AtomicUsize::new(0));
/// let counter = handled.clone();
///
/// let worker = FetchWorker::spawn("thumbnails", queue.clone(), move |_req: Prefetch| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })
/// .unwrap();
///
/// queue.close();
/// worker.join();
/// ```
pub struct FetchWorker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl FetchWorker {
    /// Spawn the worker thread for `queue`.
    ///
    /// The thread is named `docview-fetch-{name}`.
    pub fn spawn<T, F>(
        name: impl Into<String>,
        queue: Arc<RequestQueue<T>>,
        handler: F,
    ) -> io::Result<Self>
    where
        T: Demand + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let name = name.into();
        let thread = thread::Builder::new()
            .name(format!("docview-fetch-{}", name))
            .spawn({
                let name = name.clone();
                move || Self::run(&name, &queue, handler)
            })?;

        Ok(Self {
            name,
            thread: Some(thread),
        })
    }

    /// Main worker loop.
    fn run<T, F>(name: &str, queue: &RequestQueue<T>, mut handler: F)
    where
        T: Demand,
        F: FnMut(T),
    {
        let _guard = FatalOnPanic { name };
        tracing::debug!(worker = name, "fetch worker started");

        while let Some(request) = queue.next_blocking() {
            handler(request);
        }

        tracing::debug!(worker = name, "fetch worker stopped");
    }

    /// Name given at spawn time
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the worker thread
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    /// Returns `true` once the worker loop has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit.
    ///
    /// The queue must be closed first, otherwise this blocks forever.
    /// Joining from the worker thread itself is a no-op.
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!(worker = %self.name, "fetch worker panicked");
        }
    }
}

impl std::fmt::Debug for FetchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Escalates a panic unwinding out of the worker loop.
struct FatalOnPanic<'a> {
    name: &'a str,
}

impl Drop for FatalOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(
                worker = self.name,
                "internal fault in fetch worker; all further fetches would stall, aborting"
            );
            std::process::abort();
        }
    }
}
