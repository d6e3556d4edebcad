//! Vertical page layout
//!
//! Pages are scaled to the viewport content width and stacked top to bottom
//! with a fixed divider gap. Computed once per document load.

use log::debug;

use super::document::DocumentHandle;
use super::error::RenderError;
use super::types::{PageFrame, RectF};

/// Viewport measurements the layout depends on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutGeometry {
    pub viewport_width: f32,
    pub padding_left: f32,
    pub padding_right: f32,
    pub divider: f32,
}

impl LayoutGeometry {
    /// Left edge of every page frame
    #[must_use]
    pub fn content_left(&self) -> f32 {
        self.padding_left + self.divider
    }

    /// Right edge of every page frame
    #[must_use]
    pub fn content_right(&self) -> f32 {
        self.viewport_width - self.padding_right - self.divider
    }

    /// Width every page is scaled to
    #[must_use]
    pub fn content_width(&self) -> f32 {
        self.content_right() - self.content_left()
    }
}

/// Build one frame per page, contiguous with `divider` between consecutive frames
pub fn build_page_frames(
    document: &DocumentHandle,
    geometry: &LayoutGeometry,
) -> Result<Vec<PageFrame>, RenderError> {
    let left = geometry.content_left();
    let right = geometry.content_right();
    let width = geometry.content_width();
    if width <= 0.0 {
        return Err(RenderError::generic(format!(
            "viewport too narrow for layout: content width {width}"
        )));
    }

    let count = document.page_count();
    let mut frames = Vec::with_capacity(count);
    let mut total_height = 0.0_f32;

    for index in 0..count {
        let size = document.page_size(index)?;
        if size.width <= 0.0 || size.height <= 0.0 {
            return Err(RenderError::generic(format!(
                "page {index} has degenerate size {}x{}",
                size.width, size.height
            )));
        }
        let fill_width_scale = width / size.width;
        let scaled_height = size.height * fill_width_scale;
        if index != 0 {
            total_height += geometry.divider;
        }
        let rect = RectF::new(left, total_height, right, total_height + scaled_height);
        total_height = rect.bottom;
        frames.push(PageFrame {
            index,
            fill_width_scale,
            rect,
        });
    }

    debug!(
        "Laid out {count} pages for {}: width {width}, total height {total_height}",
        document.identity()
    );
    Ok(frames)
}

/// Total layout-space height of a frame list
#[must_use]
pub fn content_height(frames: &[PageFrame]) -> f32 {
    frames.last().map_or(0.0, |f| f.rect.bottom)
}
