//! Zoom and pan state for the viewport
//!
//! The canvas is drawn as `translate(translation)` then `scale(scale)`, so a
//! layout-space point `p` lands on screen at `p * scale + translation`.

use super::types::PointF;

/// Hard ceiling for the maximum zoom factor
pub const MAX_SCALE_CEILING: f32 = 20.0;
/// Default maximum zoom factor
pub const DEFAULT_MAX_SCALE: f32 = 10.0;
/// Default minimum zoom factor (fit width)
pub const DEFAULT_MIN_SCALE: f32 = 1.0;

/// Scale limits enforced on every zoom step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_SCALE,
            max: DEFAULT_MAX_SCALE,
        }
    }
}

impl ScaleBounds {
    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            self.min
        } else {
            scale.clamp(self.min, self.max)
        }
    }

    /// Set the maximum, capped at [`MAX_SCALE_CEILING`] and never below `min`
    pub fn set_max(&mut self, max: f32) {
        self.max = max.min(MAX_SCALE_CEILING).max(self.min);
    }
}

/// Extent of the content and the viewport along both axes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Extents {
    pub content_width: f32,
    pub content_height: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

/// Admissible translation range along one axis at `scale`
#[must_use]
pub fn translate_range(scale: f32, content: f32, viewport: f32) -> (f32, f32) {
    ((-(scale * content - viewport)).min(0.0), 0.0)
}

fn clamp_axis(value: f32, scale: f32, content: f32, viewport: f32) -> f32 {
    let (lower, upper) = translate_range(scale, content, viewport);
    if value > upper {
        upper
    } else if value < lower || value.is_nan() {
        lower
    } else {
        value
    }
}

/// Current canvas scale and translation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub translate: PointF,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate: PointF::default(),
        }
    }
}

impl Transform {
    #[must_use]
    pub fn new(scale: f32, translate: PointF) -> Self {
        Self { scale, translate }
    }

    /// Clamp a proposed translation at this transform's scale
    #[must_use]
    pub fn clamp_translation(&self, proposed: PointF, extents: &Extents) -> PointF {
        PointF::new(
            clamp_axis(
                proposed.x,
                self.scale,
                extents.content_width,
                extents.viewport_width,
            ),
            clamp_axis(
                proposed.y,
                self.scale,
                extents.content_height,
                extents.viewport_height,
            ),
        )
    }

    /// Replace the translation with its clamped value
    pub fn set_translation(&mut self, proposed: PointF, extents: &Extents) {
        self.translate = self.clamp_translation(proposed, extents);
    }

    /// Shift by a delta, clamped
    pub fn pan_by(&mut self, dx: f32, dy: f32, extents: &Extents) {
        let proposed = PointF::new(self.translate.x + dx, self.translate.y + dy);
        self.set_translation(proposed, extents);
    }

    /// Re-clamp after the extents changed
    pub fn reclamp(&mut self, extents: &Extents) {
        self.set_translation(self.translate, extents);
    }

    /// Vertical scroll distance from the top of the content
    #[must_use]
    pub fn scroll_y(&self) -> f32 {
        self.translate.y.abs()
    }

    /// Screen position of a layout-space point
    #[must_use]
    pub fn to_screen(&self, p: PointF) -> PointF {
        PointF::new(
            p.x * self.scale + self.translate.x,
            p.y * self.scale + self.translate.y,
        )
    }

    /// Layout-space position under a screen point
    #[must_use]
    pub fn to_layout(&self, p: PointF) -> PointF {
        PointF::new(
            (p.x - self.translate.x) / self.scale,
            (p.y - self.translate.y) / self.scale,
        )
    }
}
