//! Docview Cache Library
//!
//! Asynchronous, memory-adaptive resource cache for a paginated document
//! viewer.
//!
//! A [`MemoryResidentCache`] sits between the interactive thread and a
//! slow [`ResourceLoader`] (page images, thumbnails, page text, note
//! layouts). Lookups never block on a load: a hit is returned at once, a
//! miss is queued for the cache's single fetch worker and reported later
//! through a [`CompletionCallback`]. Loaders compose, so a
//! [`PersistentTierLoader`] on disk can sit in front of a network loader
//! and behind the in-memory tier.

pub mod callback;
pub mod config;
pub mod disk;
pub mod error;
pub mod key;
pub mod loader;
pub mod memory;
pub mod persist;
pub mod retention;

pub use callback::{
    callback_fn, Callback, CancellableCallback, CompletionCallback, FnCallback, Outcome,
};
pub use config::{CacheConfig, ConfigError, RetentionConfig, DEFAULT_MAX_RESOURCE_SIZE};
pub use disk::{repository_id, DiskTierError, PersistentTierLoader};
pub use error::{CacheError, LoadError};
pub use key::{ResourceKey, ResourceKind};
pub use loader::{loader_fn, FnLoader, ResourceLoader, ResourceSize, SizeCappedLoader};
pub use memory::{CacheStats, MemoryResidentCache};
pub use persist::{Json, Persist, PersistError};
pub use retention::RetentionRing;

pub use docview_scheduler::CancellationToken;
