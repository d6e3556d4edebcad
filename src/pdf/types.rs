//! Core types for the viewport engine

use std::sync::Arc;

/// A point in either layout space or viewport space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance(self, other: PointF) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Midpoint between two points
    #[must_use]
    pub fn midpoint(self, other: PointF) -> PointF {
        PointF::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned rectangle with float edges
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Map a layout-space rectangle through `translate then scale`
    #[must_use]
    pub fn scaled_translated(&self, scale: f32, translate: PointF) -> RectF {
        RectF::new(
            self.left * scale + translate.x,
            self.top * scale + translate.y,
            self.right * scale + translate.x,
            self.bottom * scale + translate.y,
        )
    }

    /// Overlap with another rectangle, `None` if they do not overlap
    #[must_use]
    pub fn intersection(&self, other: &RectF) -> Option<RectF> {
        let r = RectF::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { None } else { Some(r) }
    }
}

/// Intrinsic page size as reported by the document
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Target size of a rasterized bitmap in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round float dimensions down to whole pixels, never below one
    #[must_use]
    pub fn from_f32(width: f32, height: f32) -> Self {
        Self::new((width as u32).max(1), (height as u32).max(1))
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Maps page-local (intrinsic) coordinates into bitmap pixels:
/// `x' = x * scale + translate_x`, `y' = y * scale + translate_y`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionTransform {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

/// Decoded RGBA8 pixel buffer
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel data (4 bytes per pixel)
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Fully transparent bitmap
    #[must_use]
    pub fn new(size: PixelSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            pixels: vec![0; size.byte_len()],
        }
    }

    /// Bitmap filled with one RGBA colour
    #[must_use]
    pub fn filled(size: PixelSize, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(size.byte_len());
        for _ in 0..(size.width as usize * size.height as usize) {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width: size.width,
            height: size.height,
            pixels,
        }
    }

    #[must_use]
    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Geometry of one page in layout space, fixed for the lifetime of a document load
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageFrame {
    /// Page index (0-indexed)
    pub index: usize,
    /// Ratio mapping intrinsic page width to the viewport content width
    pub fill_width_scale: f32,
    /// Page rectangle in layout space
    pub rect: RectF,
}

impl PageFrame {
    /// Bitmap size that covers the page at its intrinsic resolution
    #[must_use]
    pub fn intrinsic_pixel_size(&self) -> PixelSize {
        PixelSize::from_f32(
            self.rect.width() / self.fill_width_scale,
            self.rect.height() / self.fill_width_scale,
        )
    }
}

/// Which tier a tile belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileTier {
    /// Whole page at display resolution, positioned in layout space
    Loading,
    /// Visible sub-rectangle at full zoom resolution, positioned in viewport space
    Scaling,
}

/// A rasterized page (or page region) ready to draw
#[derive(Clone, Debug)]
pub struct RenderedTile {
    pub page: usize,
    /// For loading tiles the page frame in layout space; for scaling tiles the
    /// frame's `rect` is the destination rectangle in viewport space
    pub frame: PageFrame,
    pub bitmap: Arc<Bitmap>,
}

/// An immutable, wholesale-replaced collection of tiles for one tier
pub type TileSet = Arc<Vec<RenderedTile>>;
