//! Background render tasks
//!
//! Each task runs on a worker thread with a snapshot of its inputs and posts a
//! single [`ViewerMessage`]. Tasks never touch viewer state; the document is
//! reached through a `Weak` that is upgraded at each step.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use flume::Sender;
use log::{debug, error, warn};

use super::cache::{BitmapCache, CacheKey};
use super::document::DocumentHandle;
use super::download::Downloader;
use super::error::ViewerError;
use super::layout::{LayoutGeometry, build_page_frames};
use super::request::ViewerMessage;
use super::service::CancellationToken;
use super::types::{PageFrame, PixelSize, RectF, RegionTransform, RenderedTile};
use super::zoom::Transform;

/// Inputs for a layout task
pub struct LayoutJob {
    pub generation: u64,
    pub geometry: LayoutGeometry,
    pub document: Weak<DocumentHandle>,
}

/// Build the page frames and post them; posts nothing on failure
pub fn run_layout(job: LayoutJob, results: &Sender<ViewerMessage>) {
    let Some(document) = job.document.upgrade() else {
        debug!("Layout skipped: document closed");
        return;
    };

    match build_page_frames(&document, &job.geometry) {
        Ok(frames) => {
            let _ = results.send(ViewerMessage::Layout {
                generation: job.generation,
                geometry: job.geometry,
                frames,
            });
        }
        Err(e) => error!("Layout failed for {}: {e}", document.identity()),
    }
}

/// Pages kept rendered around the page-of-interest
#[must_use]
pub fn loading_window(
    page_of_interest: usize,
    offscreen_limit: usize,
    page_count: usize,
) -> Option<RangeInclusive<usize>> {
    let last = page_count.checked_sub(1)?;
    let start = page_of_interest.saturating_sub(offscreen_limit).min(last);
    let end = page_of_interest.saturating_add(offscreen_limit).min(last);
    Some(start..=end)
}

/// Inputs for a loading-tier task
pub struct LoadingJob {
    pub generation: u64,
    pub page_of_interest: usize,
    pub offscreen_limit: usize,
    pub frames: Arc<[PageFrame]>,
    pub document: Weak<DocumentHandle>,
    pub cache: BitmapCache,
}

/// Render (or fetch from cache) every page in the window around the
/// page-of-interest at its intrinsic size.
///
/// Pages that fail to rasterize are left out; whatever was produced is
/// posted unless the task was cancelled or the document went away.
pub fn run_loading_tiles(
    job: LoadingJob,
    token: &CancellationToken,
    results: &Sender<ViewerMessage>,
) {
    let Some(window) = loading_window(job.page_of_interest, job.offscreen_limit, job.frames.len())
    else {
        return;
    };

    let mut tiles = Vec::with_capacity(window.clone().count());
    for index in window {
        if token.is_cancelled() {
            debug!("Loading task for page {} cancelled", job.page_of_interest);
            return;
        }
        let Some(document) = job.document.upgrade() else {
            debug!("Loading task stopped: document closed");
            return;
        };
        let frame = job.frames[index];
        let key = CacheKey::for_page(document.identity(), index);

        let bitmap = match job.cache.get(&key) {
            Some(hit) => hit,
            None => match document.rasterize(index, frame.intrinsic_pixel_size(), None) {
                Ok(bitmap) => {
                    let bitmap = Arc::new(bitmap);
                    job.cache.put(key, Arc::clone(&bitmap));
                    bitmap
                }
                Err(source) => {
                    let err = ViewerError::RasterizeFailure {
                        page: index,
                        source,
                    };
                    warn!("{}: {err}", document.identity());
                    continue;
                }
            },
        };
        tiles.push(RenderedTile {
            page: index,
            frame,
            bitmap,
        });
    }

    let _ = results.send(ViewerMessage::LoadingTiles {
        generation: job.generation,
        page_of_interest: job.page_of_interest,
        tiles,
    });
}

/// Contiguous run of pages whose scaled frames overlap the viewport, searched
/// outward from the page-of-interest
#[must_use]
pub fn scaling_window(
    frames: &[PageFrame],
    transform: &Transform,
    viewport_height: f32,
    page_of_interest: usize,
) -> Option<RangeInclusive<usize>> {
    if page_of_interest >= frames.len() {
        return None;
    }
    let scale = transform.scale;
    let scroll = transform.scroll_y();

    let mut start = page_of_interest;
    for index in (0..=page_of_interest).rev() {
        if frames[index].rect.bottom * scale < scroll {
            break;
        }
        start = index;
    }

    let mut end = start;
    for (index, frame) in frames.iter().enumerate().skip(start) {
        if frame.rect.top * scale > scroll + viewport_height {
            break;
        }
        end = index;
    }

    Some(start..=end)
}

/// Visible part of one page in viewport space together with the transform
/// that maps the page's intrinsic coordinates into a bitmap of that size
#[must_use]
pub fn scaling_region(
    frame: &PageFrame,
    transform: &Transform,
    viewport_width: f32,
    viewport_height: f32,
) -> Option<(RectF, RegionTransform)> {
    let scale = transform.scale;
    let scroll = transform.scroll_y();
    let top = (frame.rect.top * scale - scroll).max(0.0);
    let bottom = (frame.rect.bottom * scale - scroll).min(viewport_height);
    if bottom <= top {
        return None;
    }

    let region = RegionTransform {
        scale: frame.fill_width_scale * scale,
        translate_x: transform.translate.x + frame.rect.left * scale,
        translate_y: (frame.rect.top * scale + transform.translate.y).min(0.0),
    };
    Some((RectF::new(0.0, top, viewport_width, bottom), region))
}

/// Inputs for a scaling-tier task
pub struct ScalingJob {
    pub generation: u64,
    pub page_of_interest: usize,
    pub frames: Arc<[PageFrame]>,
    pub transform: Transform,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub document: Weak<DocumentHandle>,
}

/// Render the exact visible crop of each on-screen page at the current zoom
pub fn run_scaling_tiles(
    job: ScalingJob,
    token: &CancellationToken,
    results: &Sender<ViewerMessage>,
) {
    let Some(window) = scaling_window(
        &job.frames,
        &job.transform,
        job.viewport_height,
        job.page_of_interest,
    ) else {
        return;
    };

    let mut tiles = Vec::new();
    for index in window {
        if token.is_cancelled() {
            debug!("Scaling task for page {} cancelled", job.page_of_interest);
            return;
        }
        let frame = &job.frames[index];
        let Some((dest, region)) = scaling_region(
            frame,
            &job.transform,
            job.viewport_width,
            job.viewport_height,
        ) else {
            continue;
        };
        let Some(document) = job.document.upgrade() else {
            debug!("Scaling task stopped: document closed");
            return;
        };

        let target = PixelSize::from_f32(dest.width(), dest.height());
        match document.rasterize(index, target, Some(&region)) {
            Ok(bitmap) => tiles.push(RenderedTile {
                page: index,
                frame: PageFrame {
                    index,
                    fill_width_scale: region.scale,
                    rect: dest,
                },
                bitmap: Arc::new(bitmap),
            }),
            Err(source) => warn!(
                "Visible region: {}",
                ViewerError::RasterizeFailure {
                    page: index,
                    source
                }
            ),
        }
    }

    let _ = results.send(ViewerMessage::ScalingTiles {
        generation: job.generation,
        page_of_interest: job.page_of_interest,
        transform: job.transform,
        tiles,
    });
}

/// Inputs for a download task
pub struct DownloadJob {
    pub url: String,
    pub dest: PathBuf,
    pub downloader: Arc<dyn Downloader>,
}

/// Fetch a remote document; posts `Downloaded` only on success
pub fn run_download(job: DownloadJob, results: &Sender<ViewerMessage>) {
    match job.downloader.fetch(&job.url, &job.dest) {
        Ok(()) => {
            let _ = results.send(ViewerMessage::Downloaded {
                url: job.url,
                path: job.dest,
            });
        }
        Err(e) => error!("{e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::pdf::types::{PageSize, PointF};
    use crate::test_utils::FakeDocument;

    fn frames(count: usize) -> Arc<[PageFrame]> {
        // 300 wide, 400 tall pages with an 8px divider
        (0..count)
            .map(|i| {
                let top = i as f32 * 408.0;
                PageFrame {
                    index: i,
                    fill_width_scale: 0.5,
                    rect: RectF::new(0.0, top, 300.0, top + 400.0),
                }
            })
            .collect()
    }

    fn document(pages: usize) -> Arc<DocumentHandle> {
        Arc::new(DocumentHandle::new(
            "fake.pdf".to_string(),
            PathBuf::from("fake.pdf"),
            Box::new(FakeDocument::new(vec![PageSize::new(600.0, 800.0); pages])),
        ))
    }

    #[test]
    fn loading_window_is_clamped_to_document() {
        assert_eq!(loading_window(0, 2, 10), Some(0..=2));
        assert_eq!(loading_window(5, 2, 10), Some(3..=7));
        assert_eq!(loading_window(9, 2, 10), Some(7..=9));
        assert_eq!(loading_window(0, 2, 1), Some(0..=0));
        assert_eq!(loading_window(0, 2, 0), None);
    }

    #[test]
    fn scaling_window_covers_visible_pages() {
        let frames = frames(5);
        // Scrolled so the viewport spans layout y 300..800
        let t = Transform::new(1.0, PointF::new(0.0, -300.0));
        assert_eq!(scaling_window(&frames, &t, 500.0, 1), Some(0..=1));

        let t = Transform::new(2.0, PointF::new(0.0, -1700.0));
        assert_eq!(scaling_window(&frames, &t, 500.0, 2), Some(2..=2));
    }

    #[test]
    fn scaling_region_clips_to_viewport() {
        let frame = PageFrame {
            index: 1,
            fill_width_scale: 0.5,
            rect: RectF::new(8.0, 408.0, 308.0, 808.0),
        };
        let t = Transform::new(2.0, PointF::new(-100.0, -1000.0));
        let (dest, region) = scaling_region(&frame, &t, 316.0, 500.0).unwrap();

        assert_eq!(dest, RectF::new(0.0, 0.0, 316.0, 500.0));
        assert_eq!(region.scale, 1.0);
        assert_eq!(region.translate_x, -100.0 + 16.0);
        assert_eq!(region.translate_y, 816.0 - 1000.0);
    }

    #[test]
    fn scaling_region_none_when_offscreen() {
        let frame = frames(1)[0];
        let t = Transform::new(1.0, PointF::new(0.0, -450.0));
        assert!(scaling_region(&frame, &t, 300.0, 500.0).is_none());
    }

    #[test]
    fn loading_task_fills_cache_and_posts_window() {
        let doc = document(6);
        let cache = BitmapCache::in_memory(5);
        let (tx, rx) = flume::unbounded();

        run_loading_tiles(
            LoadingJob {
                generation: 1,
                page_of_interest: 3,
                offscreen_limit: 2,
                frames: frames(6),
                document: Arc::downgrade(&doc),
                cache: cache.clone(),
            },
            &CancellationToken::new(),
            &tx,
        );

        match rx.try_recv().unwrap() {
            ViewerMessage::LoadingTiles {
                page_of_interest,
                tiles,
                ..
            } => {
                assert_eq!(page_of_interest, 3);
                let pages: Vec<_> = tiles.iter().map(|t| t.page).collect();
                assert_eq!(pages, vec![1, 2, 3, 4, 5]);
                assert_eq!(tiles[0].bitmap.size(), PixelSize::new(600, 800));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(cache.memory_len(), 5);
    }

    #[test]
    fn failed_page_is_omitted() {
        let doc = Arc::new(DocumentHandle::new(
            "fake.pdf".to_string(),
            PathBuf::from("fake.pdf"),
            Box::new(FakeDocument::new(vec![PageSize::new(600.0, 800.0); 3]).failing_page(1)),
        ));
        let (tx, rx) = flume::unbounded();

        run_loading_tiles(
            LoadingJob {
                generation: 1,
                page_of_interest: 0,
                offscreen_limit: 2,
                frames: frames(3),
                document: Arc::downgrade(&doc),
                cache: BitmapCache::in_memory(5),
            },
            &CancellationToken::new(),
            &tx,
        );

        let Ok(ViewerMessage::LoadingTiles { tiles, .. }) = rx.try_recv() else {
            panic!("expected loading tiles");
        };
        let pages: Vec<_> = tiles.iter().map(|t| t.page).collect();
        assert_eq!(pages, vec![0, 2]);
    }

    #[test]
    fn closed_document_posts_nothing() {
        let doc = document(3);
        let weak = Arc::downgrade(&doc);
        drop(doc);
        let (tx, rx) = flume::unbounded();

        run_layout(
            LayoutJob {
                generation: 1,
                geometry: LayoutGeometry {
                    viewport_width: 300.0,
                    padding_left: 0.0,
                    padding_right: 0.0,
                    divider: 8.0,
                },
                document: weak.clone(),
            },
            &tx,
        );
        run_loading_tiles(
            LoadingJob {
                generation: 1,
                page_of_interest: 0,
                offscreen_limit: 1,
                frames: frames(3),
                document: weak,
                cache: BitmapCache::in_memory(3),
            },
            &CancellationToken::new(),
            &tx,
        );

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancelled_loading_task_posts_nothing() {
        let doc = document(3);
        let token = CancellationToken::new();
        token.cancel();
        let (tx, rx) = flume::unbounded();

        run_loading_tiles(
            LoadingJob {
                generation: 1,
                page_of_interest: 0,
                offscreen_limit: 1,
                frames: frames(3),
                document: Arc::downgrade(&doc),
                cache: BitmapCache::in_memory(3),
            },
            &token,
            &tx,
        );

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn scaling_task_positions_tiles_in_viewport_space() {
        let doc = document(3);
        let (tx, rx) = flume::unbounded();

        run_scaling_tiles(
            ScalingJob {
                generation: 1,
                page_of_interest: 0,
                frames: frames(3),
                transform: Transform::new(1.0, PointF::new(0.0, -300.0)),
                viewport_width: 300.0,
                viewport_height: 500.0,
                document: Arc::downgrade(&doc),
            },
            &CancellationToken::new(),
            &tx,
        );

        let Ok(ViewerMessage::ScalingTiles { tiles, .. }) = rx.try_recv() else {
            panic!("expected scaling tiles");
        };
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].frame.rect, RectF::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(tiles[0].bitmap.size(), PixelSize::new(300, 100));
        assert_eq!(tiles[1].frame.rect, RectF::new(0.0, 108.0, 300.0, 500.0));
    }
}
