//! Document handle abstraction
//!
//! The viewer never parses documents itself. It drives a [`Document`] that can
//! report page geometry and rasterize a page, or an affine-mapped region of a
//! page, into an RGBA bitmap.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::{RenderError, ViewerError};
use super::types::{Bitmap, PageSize, PixelSize, RegionTransform};

/// An open document capable of rasterizing its pages
pub trait Document: Send {
    /// Number of pages
    fn page_count(&self) -> usize;

    /// Intrinsic size of a page
    fn page_size(&self, page: usize) -> Result<PageSize, RenderError>;

    /// Rasterize a page into a bitmap of `target` pixels.
    ///
    /// With `region == None` the whole page is stretched to `target`. With a
    /// region transform, page coordinates are mapped through it and only what
    /// lands inside `target` is drawn.
    fn rasterize(
        &self,
        page: usize,
        target: PixelSize,
        region: Option<&RegionTransform>,
    ) -> Result<Bitmap, RenderError>;
}

/// Opens documents from local paths
pub trait DocumentLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, RenderError>;
}

/// The viewer's exclusively owned, currently open document.
///
/// Background tasks only ever see a `Weak` to this; once the viewer replaces
/// the document the old handle is dropped and in-flight tasks stop at their
/// next upgrade attempt.
pub struct DocumentHandle {
    identity: String,
    path: PathBuf,
    page_count: usize,
    inner: Mutex<Box<dyn Document>>,
}

impl DocumentHandle {
    /// Open `path` through `loader`, deriving the cache identity from the file name
    pub fn open(loader: &dyn DocumentLoader, path: &Path) -> Result<Self, ViewerError> {
        let document = loader
            .open(path)
            .map_err(|source| ViewerError::DocumentUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        let identity = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self::new(identity, path.to_path_buf(), document))
    }

    #[must_use]
    pub fn new(identity: String, path: PathBuf, document: Box<dyn Document>) -> Self {
        let page_count = document.page_count();
        Self {
            identity,
            path,
            page_count,
            inner: Mutex::new(document),
        }
    }

    /// Identity used for cache keys
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .page_size(page)
    }

    /// Rasterize with exclusive access to the underlying document
    pub fn rasterize(
        &self,
        page: usize,
        target: PixelSize,
        region: Option<&RegionTransform>,
    ) -> Result<Bitmap, RenderError> {
        if page >= self.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .rasterize(page, target, region)
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("identity", &self.identity)
            .field("path", &self.path)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}
