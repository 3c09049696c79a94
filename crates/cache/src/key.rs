//! Resource identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of one cacheable unit: which document, which page, which
/// kind of resource.
///
/// Equality, ordering and hashing are structural over the triple, with
/// ordering lexicographic in field order. A negative `page_index` names a
/// document-level resource such as the cover thumbnail.
///
/// Cloning is cheap: the document id is shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    document_id: Arc<str>,
    page_index: i32,
    selector: i32,
}

impl ResourceKey {
    /// Create a key from its three parts.
    pub fn new(document_id: impl Into<Arc<str>>, page_index: i32, selector: i32) -> Self {
        Self {
            document_id: document_id.into(),
            page_index,
            selector,
        }
    }

    /// Key for a document-level resource (page index `-1`).
    pub fn document_level(document_id: impl Into<Arc<str>>, selector: i32) -> Self {
        Self::new(document_id, -1, selector)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn page_index(&self) -> i32 {
        self.page_index
    }

    pub fn selector(&self) -> i32 {
        self.selector
    }

    /// Returns `true` for keys that do not name a specific page.
    pub fn is_document_level(&self) -> bool {
        self.page_index < 0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.document_id, self.page_index, self.selector)
    }
}

/// Families of resources the viewer caches.
///
/// Each family gets its own cache instance, its own directory in the disk
/// tier and its own retention capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Page image at reading resolution
    PageImage,
    /// Small page image for the thumbnail strip
    PageThumbnail,
    /// Page image at scanning resolution, used when zoomed in
    HiResPageImage,
    /// Extracted text and word boxes of a page
    PageText,
    /// Notes attached to a page
    NoteLayout,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::PageImage,
        ResourceKind::PageThumbnail,
        ResourceKind::HiResPageImage,
        ResourceKind::PageText,
        ResourceKind::NoteLayout,
    ];

    /// Directory name used by the disk tier.
    pub fn dir_name(self) -> &'static str {
        match self {
            ResourceKind::PageImage => "page-image",
            ResourceKind::PageThumbnail => "page-thumbnail",
            ResourceKind::HiResPageImage => "hi-res-page-image",
            ResourceKind::PageText => "page-text",
            ResourceKind::NoteLayout => "notes",
        }
    }

    /// Number of recently used resources kept strongly reachable by
    /// default.
    ///
    /// Hi-res images are huge and only useful while zoomed, so none are
    /// retained beyond what callers hold.
    pub fn default_retention(self) -> usize {
        match self {
            ResourceKind::PageImage => 50,
            ResourceKind::PageThumbnail => 200,
            ResourceKind::HiResPageImage => 0,
            ResourceKind::PageText => 10,
            ResourceKind::NoteLayout => 40,
        }
    }

    /// Suffix used for environment variable names.
    pub(crate) fn env_suffix(self) -> &'static str {
        match self {
            ResourceKind::PageImage => "PAGE_IMAGE",
            ResourceKind::PageThumbnail => "PAGE_THUMBNAIL",
            ResourceKind::HiResPageImage => "HI_RES_PAGE_IMAGE",
            ResourceKind::PageText => "PAGE_TEXT",
            ResourceKind::NoteLayout => "NOTE_LAYOUT",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
