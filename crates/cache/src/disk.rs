//! Persistent disk tier for cached resources.
//!
//! Resources are stored one per file under
//! `root/repo_id/document_id/kind/page_index/selector`, so the same key
//! triple used by the memory cache addresses the disk. The tier is itself a
//! [`ResourceLoader`]: a miss consults the next tier (usually the repository
//! server) and keeps a copy of what it returns.
//!
//! Files are written through a temporary file and moved into place without
//! clobbering, so when two writers race the first one wins and readers
//! never see a partial file.

use crate::error::LoadError;
use crate::key::{ResourceKey, ResourceKind};
use crate::loader::ResourceLoader;
use crate::persist::{Persist, PersistError};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Leading bytes of every file written by the tier
const MAGIC: &[u8; 4] = b"DVRC";

/// Bumped whenever the on-disk layout changes
const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4;

/// Errors raised by the disk tier
#[derive(Debug, thiserror::Error)]
pub enum DiskTierError {
    #[error("cache root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cache root is not writable: {}", .0.display())]
    ReadOnly(PathBuf),

    #[error("invalid repository id: {0:?}")]
    InvalidRepositoryId(String),

    #[error("disk cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode resource: {0}")]
    Encode(#[from] PersistError),
}

/// Directory name for one repository's share of the disk cache
pub fn repository_id(host: &str, port: u16) -> String {
    format!("{}-{}", host, port)
}

/// A name that can be used as exactly one path component
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

/// Disk-backed loader for one resource kind of one repository
pub struct PersistentTierLoader<R> {
    /// `root/repo_id`
    repo_dir: PathBuf,
    kind: ResourceKind,
    next: Option<Arc<dyn ResourceLoader<Resource = R>>>,
}

impl<R: Persist + Send + Sync + 'static> PersistentTierLoader<R> {
    /// Open the tier rooted at `root`
    ///
    /// The root is created if missing. An existing root must be a
    /// writable directory.
    pub fn open(
        root: impl AsRef<Path>,
        repo_id: &str,
        kind: ResourceKind,
    ) -> Result<Self, DiskTierError> {
        let root = root.as_ref();

        if !is_safe_component(repo_id) {
            return Err(DiskTierError::InvalidRepositoryId(repo_id.to_string()));
        }

        match fs::metadata(root) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(DiskTierError::NotADirectory(root.to_path_buf()));
            }
            Ok(metadata) if metadata.permissions().readonly() => {
                return Err(DiskTierError::ReadOnly(root.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(root)?,
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(root = %root.display(), repo_id, %kind, "opened disk tier");

        Ok(Self {
            repo_dir: root.join(repo_id),
            kind,
            next: None,
        })
    }

    /// Consult `loader` on a local miss and keep what it returns
    pub fn with_next<L>(self, loader: L) -> Self
    where
        L: ResourceLoader<Resource = R> + 'static,
    {
        self.with_shared_next(Arc::new(loader))
    }

    pub fn with_shared_next(mut self, loader: Arc<dyn ResourceLoader<Resource = R>>) -> Self {
        self.next = Some(loader);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// File backing `key`, or `None` if the key cannot live on disk
    pub fn path_for(&self, key: &ResourceKey) -> Option<PathBuf> {
        if !is_safe_component(key.document_id()) {
            return None;
        }
        Some(
            self.repo_dir
                .join(key.document_id())
                .join(self.kind.dir_name())
                .join(key.page_index().to_string())
                .join(key.selector().to_string()),
        )
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.path_for(key).is_some_and(|path| path.is_file())
    }

    /// Read a resource from disk
    ///
    /// A missing, unreadable or malformed file is a miss. Malformed files
    /// are removed so the next store can replace them.
    pub fn read(&self, key: &ResourceKey) -> Option<R> {
        let path = self.path_for(key)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    path = %path.display(),
                    error = %e,
                    "failed to read disk cache entry"
                );
                return None;
            }
        };

        match decode_file(&bytes) {
            Ok(resource) => Some(resource),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    path = %path.display(),
                    error = %e,
                    "discarding malformed disk cache entry"
                );
                fs::remove_file(&path).ok();
                None
            }
        }
    }

    /// Write a resource to disk unless a copy is already there
    ///
    /// Returns `Ok(false)` when nothing was written, either because a file
    /// already exists or because the key cannot live on disk.
    pub fn store(&self, key: &ResourceKey, resource: &R) -> Result<bool, DiskTierError> {
        let Some(path) = self.path_for(key) else {
            return Ok(false);
        };
        if path.exists() {
            return Ok(false);
        }

        let Some(dir) = path.parent() else {
            return Ok(false);
        };
        fs::create_dir_all(dir)?;

        let payload = resource.encode()?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(MAGIC)?;
        tmp.write_all(&FORMAT_VERSION.to_le_bytes())?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    /// Delete the stored copy of `key`, returning whether one existed
    pub fn remove(&self, key: &ResourceKey) -> Result<bool, DiskTierError> {
        let Some(path) = self.path_for(key) else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_file<R: Persist>(bytes: &[u8]) -> Result<R, PersistError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(PersistError::new("bad magic"));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(PersistError::new(format!("unsupported format version {}", version)));
    }

    R::decode(&bytes[HEADER_LEN..])
}

impl<R: Persist + Send + Sync + 'static> ResourceLoader for PersistentTierLoader<R> {
    type Resource = R;

    fn fetch(&self, document_id: &str, page_index: i32, selector: i32) -> Result<R, LoadError> {
        let key = ResourceKey::new(document_id, page_index, selector);

        if let Some(resource) = self.read(&key) {
            tracing::debug!(key = %key, kind = %self.kind, "disk tier hit");
            return Ok(resource);
        }

        let Some(next) = &self.next else {
            return Err(LoadError::NotFound(format!("{} not in disk cache", key)));
        };

        let resource = next.fetch(document_id, page_index, selector)?;
        match self.store(&key, &resource) {
            Ok(true) => tracing::debug!(key = %key, kind = %self.kind, "stored in disk tier"),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                key = %key,
                kind = %self.kind,
                error = %e,
                "failed to store in disk tier"
            ),
        }
        Ok(resource)
    }
}

impl<R> fmt::Debug for PersistentTierLoader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentTierLoader")
            .field("repo_dir", &self.repo_dir)
            .field("kind", &self.kind)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}
