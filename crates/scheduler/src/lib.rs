//! Docview Scheduler Library
//!
//! Single-consumer request queue with demand-first selection and a
//! dedicated fetch worker thread.
//!
//! Any number of threads push requests onto the front of a
//! [`RequestQueue`]. One [`FetchWorker`] per queue drains it, always
//! preferring requests somebody is waiting on (demand) over speculative
//! prefetch, and within each group the most recently added request.
//!
//! # Example
//!
//! ```
//! use docview_scheduler::{Demand, FetchWorker, RequestQueue};
//! use std::sync::{mpsc, Arc};
//!
//! struct Fetch {
//!     page: i32,
//!     waiting: bool,
//! }
//!
//! impl Demand for Fetch {
//!     fn is_demand(&self) -> bool {
//!         self.waiting
//!     }
//! }
//!
//! let queue = Arc::new(RequestQueue::new());
//! let (tx, rx) = mpsc::channel();
//!
//! let worker = FetchWorker::spawn("pages", queue.clone(), move |fetch: Fetch| {
//!     tx.send(fetch.page).ok();
//! })
//! .unwrap();
//!
//! queue.push_front(Fetch { page: 3, waiting: true });
//! assert_eq!(rx.recv().unwrap(), 3);
//!
//! queue.close();
//! worker.join();
//! ```

mod cancel;
mod queue;
mod worker;

// Re-export public API
pub use cancel::CancellationToken;
pub use queue::{Demand, QueueStats, RequestQueue};
pub use worker::FetchWorker;
