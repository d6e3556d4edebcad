//! Error taxonomy for the viewer

use std::path::PathBuf;

/// Errors from the document backend while opening or rasterizing
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl RenderError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors surfaced by the viewer and its background tasks
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Missing or unreadable file, or the document handle is gone
    #[error("document unavailable: {path:?}: {source}")]
    DocumentUnavailable {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    #[error("failed to rasterize page {page}: {source}")]
    RasterizeFailure {
        page: usize,
        #[source]
        source: RenderError,
    },

    #[error("bitmap cache I/O: {0}")]
    CacheIo(#[from] CacheError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("download of {url} failed: {detail}")]
    Download { url: String, detail: String },
}

/// Persistent cache failures; callers treat these as misses
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt entry {key}: {detail}")]
    Corrupt { key: String, detail: String },

    #[error("codec: {0}")]
    Codec(#[from] image::ImageError),

    #[error("index: {0}")]
    Index(#[from] serde_json::Error),
}
