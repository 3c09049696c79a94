//! Consumer-side completion contract.
//!
//! A consumer hands the cache a callback along with its request and
//! receives exactly one notification: the resource, or the reason it could
//! not be produced.

use crate::error::LoadError;
use docview_scheduler::CancellationToken;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a callback receives.
pub type Outcome<R> = Result<Arc<R>, LoadError>;

/// Shared handle to a callback, as stored in the pending list.
pub type Callback<R> = Arc<dyn CompletionCallback<R>>;

/// Receives the result of a cache request.
///
/// `on_complete` is called exactly once per request that carried this
/// callback, either inline from `get` on a hit or later from the fetch
/// worker. The one exception is a load abandoned because
/// [`should_still_load`](Self::should_still_load) answered `false`: the
/// consumer said it no longer cares, so nothing is delivered.
///
/// Callbacks run on the fetch worker thread. They may call back into the
/// cache, but should hand heavy work elsewhere since the next load waits
/// for them.
pub trait CompletionCallback<R>: Send + Sync {
    /// Deliver the resource or the failure.
    fn on_complete(&self, outcome: Outcome<R>);

    /// Checked right before an expensive load starts.
    ///
    /// Returning `false` abandons the load silently.
    fn should_still_load(&self) -> bool {
        true
    }

    /// Asked to push out anything buffered.
    fn flush(&self) {}
}

/// Callback backed by a closure. Created with [`callback_fn`].
pub struct FnCallback<F, R> {
    f: F,
    _resource: PhantomData<fn(R)>,
}

/// Turn a closure into a shareable [`Callback`].
///
/// ```
/// use docview_cache::{callback_fn, Outcome};
///
/// let callback = callback_fn(|outcome: Outcome<Vec<u8>>| {
///     if let Ok(bytes) = outcome {
///         println!("page image ready: {} bytes", bytes.len());
///     }
/// });
/// # drop(callback);
/// ```
pub fn callback_fn<R, F>(f: F) -> Callback<R>
where
    F: Fn(Outcome<R>) + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    Arc::new(FnCallback {
        f,
        _resource: PhantomData,
    })
}

impl<F, R> CompletionCallback<R> for FnCallback<F, R>
where
    F: Fn(Outcome<R>) + Send + Sync,
    R: Send + Sync,
{
    fn on_complete(&self, outcome: Outcome<R>) {
        (self.f)(outcome)
    }
}

impl<F, R> fmt::Debug for FnCallback<F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallback").finish_non_exhaustive()
    }
}

/// Wraps a callback so that cancelling a token stops its load from
/// starting.
///
/// The viewer cancels the token when a page scrolls out of view; if the
/// request is still queued at that point, the worker skips the load.
/// A load already in progress is not interrupted.
pub struct CancellableCallback<R> {
    inner: Callback<R>,
    token: CancellationToken,
}

impl<R: Send + Sync + 'static> CancellableCallback<R> {
    pub fn new(inner: Callback<R>, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    /// Wrap `inner` with a fresh token, returning the callback and the
    /// token that controls it.
    pub fn wrap(inner: Callback<R>) -> (Callback<R>, CancellationToken) {
        let token = CancellationToken::new();
        let callback: Callback<R> = Arc::new(Self::new(inner, token.clone()));
        (callback, token)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<R: Send + Sync> CompletionCallback<R> for CancellableCallback<R> {
    fn on_complete(&self, outcome: Outcome<R>) {
        self.inner.on_complete(outcome)
    }

    fn should_still_load(&self) -> bool {
        !self.token.is_cancelled() && self.inner.should_still_load()
    }

    fn flush(&self) {
        self.inner.flush()
    }
}
