//! Messages posted from background tasks to the owning thread

use std::path::PathBuf;

use super::layout::LayoutGeometry;
use super::types::{PageFrame, RenderedTile};
use super::zoom::Transform;

/// Result of a background task, applied on the owning thread in arrival order.
///
/// Every message carries the document generation it was computed for, and
/// tile results also carry the page-of-interest captured at submission. Scaling
/// tiles sit in viewport space, so they also carry the transform they were cut
/// for. The viewer drops any message whose tags no longer match its state.
#[derive(Debug)]
pub enum ViewerMessage {
    /// Page frames for a freshly opened document
    Layout {
        generation: u64,
        geometry: LayoutGeometry,
        frames: Vec<PageFrame>,
    },

    /// Display-resolution pages around the page-of-interest
    LoadingTiles {
        generation: u64,
        page_of_interest: usize,
        tiles: Vec<RenderedTile>,
    },

    /// Full-resolution crops of the visible region, positioned for `transform`
    ScalingTiles {
        generation: u64,
        page_of_interest: usize,
        transform: Transform,
        tiles: Vec<RenderedTile>,
    },

    /// A remote document finished downloading to `path`
    Downloaded { url: String, path: PathBuf },
}

impl ViewerMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Layout { .. } => "layout",
            Self::LoadingTiles { .. } => "loading-tiles",
            Self::ScalingTiles { .. } => "scaling-tiles",
            Self::Downloaded { .. } => "downloaded",
        }
    }
}
