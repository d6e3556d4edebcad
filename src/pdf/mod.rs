//! PDF viewport engine

pub mod cache;
pub mod compositor;
pub mod disk_cache;
pub mod document;
pub mod download;
pub mod error;
pub mod fling;
pub mod gesture;
pub mod layout;
#[cfg(feature = "pdf")]
pub mod mupdf_document;
pub mod request;
pub mod service;
pub mod types;
pub mod viewport;
pub mod worker;
pub mod zoom;

pub use cache::{BitmapCache, CacheKey, PageCache};
pub use compositor::{DrawOp, Paint, Palette, paint_frame};
pub use disk_cache::DiskCache;
pub use document::{Document, DocumentHandle, DocumentLoader};
pub use download::{Downloader, HttpDownloader};
pub use error::{CacheError, RenderError, ViewerError};
pub use gesture::{PointerAction, PointerEvent};
#[cfg(feature = "pdf")]
pub use mupdf_document::{MupdfDocument, MupdfLoader};
pub use request::ViewerMessage;
pub use service::{CancellationToken, Executor, TaskHandle, WorkerPool};
pub use types::*;
pub use viewport::{Viewer, ViewerServices, ViewerState};
pub use zoom::{ScaleBounds, Transform};
