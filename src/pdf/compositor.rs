//! Frame composition
//!
//! [`compose`] turns the viewer state into a display list in viewport
//! coordinates, back to front: page placeholders with the dividers between
//! them, loading tiles (skipping pages covered by a scaling tile), the
//! vertical edge dividers, then scaling tiles on top. [`paint_frame`]
//! rasterizes a display list in software.

use std::sync::Arc;

use super::layout::LayoutGeometry;
use super::types::{Bitmap, PageFrame, PixelSize, RectF, RenderedTile, TileTier};
use super::zoom::Transform;

/// Solid fills used by the display list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paint {
    /// Blank page shown until a tile arrives
    Page,
    Divider,
}

#[derive(Clone, Debug)]
pub enum DrawOp {
    Fill {
        rect: RectF,
        paint: Paint,
    },
    Tile {
        page: usize,
        tier: TileTier,
        dest: RectF,
        bitmap: Arc<Bitmap>,
    },
}

/// Everything needed to draw one frame
pub struct FrameInputs<'a> {
    pub frames: &'a [PageFrame],
    pub loading: &'a [RenderedTile],
    pub scaling: &'a [RenderedTile],
    pub transform: &'a Transform,
    pub geometry: &'a LayoutGeometry,
    pub viewport_height: f32,
}

/// Build the display list for the current frame
#[must_use]
pub fn compose(inputs: &FrameInputs<'_>) -> Vec<DrawOp> {
    let (Some(first), Some(last)) = (inputs.frames.first(), inputs.frames.last()) else {
        return Vec::new();
    };

    let geometry = inputs.geometry;
    let scale = inputs.transform.scale;
    let translate = inputs.transform.translate;
    let viewport = RectF::new(0.0, 0.0, geometry.viewport_width, inputs.viewport_height);
    let to_viewport = |r: RectF| r.scaled_translated(scale, translate);

    let mut ops = Vec::new();
    let push_fill = |ops: &mut Vec<DrawOp>, rect: RectF, paint: Paint| {
        let rect = to_viewport(rect);
        if rect.intersection(&viewport).is_some() {
            ops.push(DrawOp::Fill { rect, paint });
        }
    };

    for frame in inputs.frames {
        push_fill(&mut ops, frame.rect, Paint::Page);
        if frame.index != last.index {
            let divider = RectF::new(
                geometry.padding_left,
                frame.rect.bottom,
                geometry.viewport_width - geometry.padding_right,
                frame.rect.bottom + geometry.divider,
            );
            push_fill(&mut ops, divider, Paint::Divider);
        }
    }

    for tile in inputs.loading {
        if inputs.scaling.iter().any(|s| s.page == tile.page) {
            continue;
        }
        let dest = to_viewport(tile.frame.rect);
        if dest.intersection(&viewport).is_some() {
            ops.push(DrawOp::Tile {
                page: tile.page,
                tier: TileTier::Loading,
                dest,
                bitmap: Arc::clone(&tile.bitmap),
            });
        }
    }

    let left_edge = RectF::new(
        geometry.padding_left,
        first.rect.top,
        geometry.padding_left + geometry.divider,
        last.rect.bottom,
    );
    let right_edge = RectF::new(
        geometry.viewport_width - geometry.padding_right - geometry.divider,
        first.rect.top,
        geometry.viewport_width - geometry.padding_right,
        last.rect.bottom,
    );
    push_fill(&mut ops, left_edge, Paint::Divider);
    push_fill(&mut ops, right_edge, Paint::Divider);

    // Scaling tiles are already in viewport space
    for tile in inputs.scaling {
        ops.push(DrawOp::Tile {
            page: tile.page,
            tier: TileTier::Scaling,
            dest: tile.frame.rect,
            bitmap: Arc::clone(&tile.bitmap),
        });
    }

    ops
}

/// Colours used when painting a display list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub background: [u8; 4],
    pub page: [u8; 4],
    pub divider: [u8; 4],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 0],
            page: [255, 255, 255, 255],
            divider: [0x88, 0x88, 0x88, 255],
        }
    }
}

/// Integer pixel span of `rect` clipped to `size`
fn pixel_bounds(rect: &RectF, size: PixelSize) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.left.max(0.0).round() as u32;
    let y0 = rect.top.max(0.0).round() as u32;
    let x1 = (rect.right.max(0.0).round() as u32).min(size.width);
    let y1 = (rect.bottom.max(0.0).round() as u32).min(size.height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Rasterize a display list into a `size` frame with nearest-neighbour scaling
#[must_use]
pub fn paint_frame(ops: &[DrawOp], size: PixelSize, palette: &Palette) -> Bitmap {
    let mut out = Bitmap::filled(size, palette.background);

    for op in ops {
        match op {
            DrawOp::Fill { rect, paint } => {
                let Some((x0, y0, x1, y1)) = pixel_bounds(rect, size) else {
                    continue;
                };
                let rgba = match paint {
                    Paint::Page => palette.page,
                    Paint::Divider => palette.divider,
                };
                for y in y0..y1 {
                    for x in x0..x1 {
                        out.set_pixel(x, y, rgba);
                    }
                }
            }
            DrawOp::Tile { dest, bitmap, .. } => {
                let Some((x0, y0, x1, y1)) = pixel_bounds(dest, size) else {
                    continue;
                };
                if bitmap.width == 0 || bitmap.height == 0 || dest.is_empty() {
                    continue;
                }
                let sx = bitmap.width as f32 / dest.width();
                let sy = bitmap.height as f32 / dest.height();
                for y in y0..y1 {
                    let src_y = (((y as f32 + 0.5 - dest.top) * sy) as u32).min(bitmap.height - 1);
                    for x in x0..x1 {
                        let src_x =
                            (((x as f32 + 0.5 - dest.left) * sx) as u32).min(bitmap.width - 1);
                        if let Some(px) = bitmap.pixel(src_x, src_y) {
                            if px[3] != 0 {
                                out.set_pixel(x, y, px);
                            }
                        }
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::PointF;

    fn geometry() -> LayoutGeometry {
        LayoutGeometry {
            viewport_width: 316.0,
            padding_left: 0.0,
            padding_right: 0.0,
            divider: 8.0,
        }
    }

    fn frames() -> Vec<PageFrame> {
        (0..3)
            .map(|i| {
                let top = i as f32 * 408.0;
                PageFrame {
                    index: i,
                    fill_width_scale: 0.5,
                    rect: RectF::new(8.0, top, 308.0, top + 400.0),
                }
            })
            .collect()
    }

    fn tile(page: usize, rect: RectF, shade: u8) -> RenderedTile {
        RenderedTile {
            page,
            frame: PageFrame {
                index: page,
                fill_width_scale: 0.5,
                rect,
            },
            bitmap: Arc::new(Bitmap::filled(PixelSize::new(4, 4), [shade, 0, 0, 255])),
        }
    }

    #[test]
    fn empty_layout_draws_nothing() {
        let ops = compose(&FrameInputs {
            frames: &[],
            loading: &[],
            scaling: &[],
            transform: &Transform::default(),
            geometry: &geometry(),
            viewport_height: 500.0,
        });
        assert!(ops.is_empty());
    }

    #[test]
    fn draw_order_and_scaling_suppression() {
        let frames = frames();
        let loading = vec![tile(0, frames[0].rect, 10), tile(1, frames[1].rect, 20)];
        let scaling = vec![tile(1, RectF::new(0.0, 108.0, 316.0, 500.0), 30)];
        let transform = Transform::new(1.0, PointF::new(0.0, -300.0));

        let ops = compose(&FrameInputs {
            frames: &frames,
            loading: &loading,
            scaling: &scaling,
            transform: &transform,
            geometry: &geometry(),
            viewport_height: 500.0,
        });

        let tiles: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Tile { page, tier, .. } => Some((*page, *tier)),
                DrawOp::Fill { .. } => None,
            })
            .collect();
        assert_eq!(tiles, vec![(0, TileTier::Loading), (1, TileTier::Scaling)]);
        assert!(matches!(ops.last(), Some(DrawOp::Tile { tier: TileTier::Scaling, .. })));

        // Page 2 starts at layout y 816, below the viewport
        let pages = ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Fill { paint: Paint::Page, .. }))
            .count();
        assert_eq!(pages, 2);
    }

    #[test]
    fn loading_tile_dest_follows_canvas_transform() {
        let frames = frames();
        let loading = vec![tile(0, frames[0].rect, 10)];
        let transform = Transform::new(2.0, PointF::new(-10.0, -20.0));
        let ops = compose(&FrameInputs {
            frames: &frames,
            loading: &loading,
            scaling: &[],
            transform: &transform,
            geometry: &geometry(),
            viewport_height: 500.0,
        });
        let dest = ops.iter().find_map(|op| match op {
            DrawOp::Tile { dest, .. } => Some(*dest),
            DrawOp::Fill { .. } => None,
        });
        assert_eq!(dest, Some(RectF::new(6.0, -20.0, 606.0, 780.0)));
    }

    #[test]
    fn painter_scales_tiles_and_fills() {
        let ops = vec![
            DrawOp::Fill {
                rect: RectF::new(0.0, 0.0, 8.0, 8.0),
                paint: Paint::Divider,
            },
            DrawOp::Tile {
                page: 0,
                tier: TileTier::Loading,
                dest: RectF::new(2.0, 2.0, 6.0, 6.0),
                bitmap: Arc::new(Bitmap::filled(PixelSize::new(2, 2), [200, 0, 0, 255])),
            },
        ];
        let frame = paint_frame(&ops, PixelSize::new(8, 8), &Palette::default());

        assert_eq!(frame.pixel(0, 0), Some([0x88, 0x88, 0x88, 255]));
        assert_eq!(frame.pixel(2, 2), Some([200, 0, 0, 255]));
        assert_eq!(frame.pixel(5, 5), Some([200, 0, 0, 255]));
        assert_eq!(frame.pixel(6, 6), Some([0x88, 0x88, 0x88, 255]));
    }
}
