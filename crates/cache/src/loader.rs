//! The loader contract every resource source implements.

use crate::error::LoadError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A source of resources: disk, a repository server, a renderer.
///
/// `fetch` may block for as long as it needs. The cache only ever calls it
/// from its single fetch worker, so implementations need not be
/// reentrant; they must still be `Send + Sync` because the worker runs on
/// its own thread.
pub trait ResourceLoader: Send + Sync {
    /// What this loader produces.
    type Resource: Send + Sync + 'static;

    /// Produce the resource named by the three key parts, or say why not.
    fn fetch(
        &self,
        document_id: &str,
        page_index: i32,
        selector: i32,
    ) -> Result<Self::Resource, LoadError>;
}

impl<L: ResourceLoader + ?Sized> ResourceLoader for Arc<L> {
    type Resource = L::Resource;

    fn fetch(
        &self,
        document_id: &str,
        page_index: i32,
        selector: i32,
    ) -> Result<Self::Resource, LoadError> {
        (**self).fetch(document_id, page_index, selector)
    }
}

impl<L: ResourceLoader + ?Sized> ResourceLoader for Box<L> {
    type Resource = L::Resource;

    fn fetch(
        &self,
        document_id: &str,
        page_index: i32,
        selector: i32,
    ) -> Result<Self::Resource, LoadError> {
        (**self).fetch(document_id, page_index, selector)
    }
}

/// Loader backed by a closure. Created with [`loader_fn`].
pub struct FnLoader<F, R> {
    f: F,
    _resource: PhantomData<fn() -> R>,
}

/// Turn a closure into a [`ResourceLoader`].
///
/// ```
/// use docview_cache::{loader_fn, LoadError, ResourceLoader};
///
/// let loader = loader_fn(|doc: &str, page: i32, _selector: i32| {
///     if page < 0 {
///         return Err(LoadError::NotFound(format!("{doc} has no cover")));
///     }
///     Ok(vec![page as u8])
/// });
///
/// assert_eq!(loader.fetch("doc1", 3, 0).unwrap(), vec![3]);
/// ```
pub fn loader_fn<F, R>(f: F) -> FnLoader<F, R>
where
    F: Fn(&str, i32, i32) -> Result<R, LoadError> + Send + Sync,
    R: Send + Sync + 'static,
{
    FnLoader {
        f,
        _resource: PhantomData,
    }
}

impl<F, R> ResourceLoader for FnLoader<F, R>
where
    F: Fn(&str, i32, i32) -> Result<R, LoadError> + Send + Sync,
    R: Send + Sync + 'static,
{
    type Resource = R;

    fn fetch(&self, document_id: &str, page_index: i32, selector: i32) -> Result<R, LoadError> {
        (self.f)(document_id, page_index, selector)
    }
}

impl<F, R> fmt::Debug for FnLoader<F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

/// Resources whose in-memory size can be measured.
pub trait ResourceSize {
    /// Approximate size in bytes.
    fn byte_size(&self) -> usize;
}

impl ResourceSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ResourceSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl<T: ResourceSize + ?Sized> ResourceSize for Arc<T> {
    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

/// Rejects resources larger than `max_size` with [`LoadError::TooLarge`].
#[derive(Debug, Clone)]
pub struct SizeCappedLoader<L> {
    inner: L,
    max_size: usize,
}

impl<L> SizeCappedLoader<L> {
    pub fn new(inner: L, max_size: usize) -> Self {
        Self { inner, max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L> ResourceLoader for SizeCappedLoader<L>
where
    L: ResourceLoader,
    L::Resource: ResourceSize,
{
    type Resource = L::Resource;

    fn fetch(
        &self,
        document_id: &str,
        page_index: i32,
        selector: i32,
    ) -> Result<Self::Resource, LoadError> {
        let resource = self.inner.fetch(document_id, page_index, selector)?;
        let size = resource.byte_size();
        if size > self.max_size {
            tracing::warn!(
                document_id,
                page_index,
                selector,
                size,
                max_size = self.max_size,
                "resource exceeds size cap"
            );
            return Err(LoadError::TooLarge {
                max_size: self.max_size,
            });
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_loader() {
        let loader =
            loader_fn(|doc: &str, page: i32, selector: i32| Ok(format!("{doc}:{page}:{selector}")));
        assert_eq!(loader.fetch("d", 1, 2).unwrap(), "d:1:2");
    }

    #[test]
    fn test_shared_loader() {
        let loader: Arc<dyn ResourceLoader<Resource = Vec<u8>>> =
            Arc::new(loader_fn(|_: &str, page: i32, _: i32| Ok(vec![page as u8; 2])));
        assert_eq!(loader.fetch("d", 4, 0).unwrap(), vec![4, 4]);
    }

    #[test]
    fn test_size_cap() {
        let inner = loader_fn(|_: &str, page: i32, _: i32| Ok(vec![0u8; page as usize]));
        let capped = SizeCappedLoader::new(inner, 10);

        assert_eq!(capped.fetch("d", 10, 0).unwrap().len(), 10);
        assert_eq!(
            capped.fetch("d", 11, 0),
            Err(LoadError::TooLarge { max_size: 10 })
        );
    }

    #[test]
    fn test_size_cap_passes_errors_through() {
        let inner = loader_fn(|_: &str, _: i32, _: i32| -> Result<Vec<u8>, LoadError> {
            Err(LoadError::PrivilegeViolation("401".into()))
        });
        let capped = SizeCappedLoader::new(inner, 10);

        assert!(matches!(capped.fetch("d", 0, 0), Err(LoadError::PrivilegeViolation(_))));
    }
}
