//! Cache configuration for retention sizes, disk tier location and size caps.
//!
//! Configuration can be loaded from a TOML file, from environment variables,
//! or built programmatically. Nothing here is global: the values are handed
//! to each cache and disk tier when it is constructed.

use crate::disk::{DiskTierError, PersistentTierLoader};
use crate::key::ResourceKind;
use crate::persist::Persist;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default cap on a single resource, in bytes
pub const DEFAULT_MAX_RESOURCE_SIZE: usize = 30_000_000;

/// Retention ring capacity per resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub page_image: usize,
    pub page_thumbnail: usize,
    pub hi_res_page_image: usize,
    pub page_text: usize,
    pub note_layout: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            page_image: ResourceKind::PageImage.default_retention(),
            page_thumbnail: ResourceKind::PageThumbnail.default_retention(),
            hi_res_page_image: ResourceKind::HiResPageImage.default_retention(),
            page_text: ResourceKind::PageText.default_retention(),
            note_layout: ResourceKind::NoteLayout.default_retention(),
        }
    }
}

impl RetentionConfig {
    pub fn capacity_for(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::PageImage => self.page_image,
            ResourceKind::PageThumbnail => self.page_thumbnail,
            ResourceKind::HiResPageImage => self.hi_res_page_image,
            ResourceKind::PageText => self.page_text,
            ResourceKind::NoteLayout => self.note_layout,
        }
    }

    pub fn set_capacity(&mut self, kind: ResourceKind, capacity: usize) {
        let slot = match kind {
            ResourceKind::PageImage => &mut self.page_image,
            ResourceKind::PageThumbnail => &mut self.page_thumbnail,
            ResourceKind::HiResPageImage => &mut self.hi_res_page_image,
            ResourceKind::PageText => &mut self.page_text,
            ResourceKind::NoteLayout => &mut self.note_layout,
        };
        *slot = capacity;
    }
}

/// Configuration for the resource caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the persistent tier; `None` disables it.
    ///
    /// Written as an empty string in TOML when disabled.
    #[serde(with = "optional_dir")]
    pub disk_cache_dir: Option<PathBuf>,

    /// Largest resource a size-capped loader will accept, in bytes
    pub max_resource_size: usize,

    /// Retention ring capacities
    pub retention: RetentionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disk_cache_dir: Self::default_cache_dir(),
            max_resource_size: DEFAULT_MAX_RESOURCE_SIZE,
            retention: RetentionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Sets the disk cache directory.
    pub fn with_disk_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disables the persistent tier.
    pub fn without_disk_tier(mut self) -> Self {
        self.disk_cache_dir = None;
        self
    }

    /// Sets the retention capacity for one resource kind.
    pub fn with_retention(mut self, kind: ResourceKind, capacity: usize) -> Self {
        self.retention.set_capacity(kind, capacity);
        self
    }

    pub fn with_max_resource_size(mut self, bytes: usize) -> Self {
        self.max_resource_size = bytes;
        self
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/docview
    /// - Linux: ~/.cache/docview
    /// - Windows: %LOCALAPPDATA%\docview
    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("docview"))
    }

    /// Retention capacity for one resource kind.
    pub fn retention_for(&self, kind: ResourceKind) -> usize {
        self.retention.capacity_for(kind)
    }

    /// Opens the disk tier for one repository and resource kind.
    ///
    /// Returns `Ok(None)` when the persistent tier is disabled.
    pub fn open_disk_tier<R>(
        &self,
        repo_id: &str,
        kind: ResourceKind,
    ) -> Result<Option<PersistentTierLoader<R>>, DiskTierError>
    where
        R: Persist + Send + Sync + 'static,
    {
        self.disk_cache_dir
            .as_ref()
            .map(|root| PersistentTierLoader::open(root, repo_id, kind))
            .transpose()
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DOCVIEW_CACHE_DIR`: Disk cache directory; empty disables the tier
    /// - `DOCVIEW_MAX_RESOURCE_SIZE`: Resource size cap in bytes
    /// - `DOCVIEW_RETENTION_PAGE_IMAGE`, `DOCVIEW_RETENTION_PAGE_THUMBNAIL`,
    ///   `DOCVIEW_RETENTION_HI_RES_PAGE_IMAGE`, `DOCVIEW_RETENTION_PAGE_TEXT`,
    ///   `DOCVIEW_RETENTION_NOTE_LAYOUT`: Retention capacities
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DOCVIEW_CACHE_DIR") {
            config.disk_cache_dir = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Some(size) = parse_env("DOCVIEW_MAX_RESOURCE_SIZE")? {
            config.max_resource_size = size;
        }

        for kind in ResourceKind::ALL {
            let var = format!("DOCVIEW_RETENTION_{}", kind.env_suffix());
            if let Some(capacity) = parse_env(&var)? {
                config.retention.set_capacity(kind, capacity);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// disk_cache_dir = "/path/to/cache"
    /// max_resource_size = 30000000
    ///
    /// [retention]
    /// page_image = 50
    /// page_thumbnail = 200
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resource_size == 0 {
            return Err(ConfigError::InvalidValue("max_resource_size".to_string()));
        }
        Ok(())
    }
}

fn parse_env(var: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Ok(val) => val
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(None),
    }
}

mod optional_dir {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::path::PathBuf;

    pub fn serialize<S: Serializer>(
        dir: &Option<PathBuf>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dir {
            Some(path) => path.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PathBuf>, D::Error> {
        let path = PathBuf::deserialize(deserializer)?;
        Ok((!path.as_os_str().is_empty()).then_some(path))
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
