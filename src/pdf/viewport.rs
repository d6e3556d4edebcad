//! The viewer: owns the transform, the tile sets and the background tasks
//!
//! All state lives on the owning thread. Background tasks get a snapshot of
//! their inputs and post a [`ViewerMessage`]; [`Viewer::process_messages`]
//! applies those in order, dropping any whose generation or page-of-interest
//! no longer matches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::cache::{BitmapCache, memory_capacity};
use super::compositor::{DrawOp, FrameInputs, compose};
use super::document::{DocumentHandle, DocumentLoader};
use super::download::{Downloader, download_path};
use super::error::ViewerError;
use super::fling::{FLING_VELOCITY_FACTOR, FlingAnimation};
use super::gesture::{GestureController, GestureOutcome, PointerAction, PointerEvent, TouchMode};
use super::layout::{LayoutGeometry, content_height};
use super::request::ViewerMessage;
use super::service::{Executor, TaskHandle, spawn};
use super::types::{PageFrame, PointF, RenderedTile, TileSet};
use super::worker::{
    DownloadJob, LayoutJob, LoadingJob, ScalingJob, run_download, run_layout, run_loading_tiles,
    run_scaling_tiles,
};
use super::zoom::{Extents, ScaleBounds, Transform};
use crate::settings::ViewerConfig;

/// Fraction of the viewport height, measured from the current scroll offset,
/// that decides which page is current
pub const PAGE_PROBE_FRACTION: f32 = 0.4;

/// Interaction state of the viewer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerState {
    Idle,
    Panning,
    Pinching,
    Flinging,
}

/// Called with `(current_page, page_count)` on every page-of-interest change
pub type PageChangeListener = Box<dyn FnMut(usize, usize)>;

/// Collaborators injected into the viewer
pub struct ViewerServices {
    pub executor: Arc<dyn Executor>,
    pub loader: Arc<dyn DocumentLoader>,
    pub downloader: Arc<dyn Downloader>,
    pub cache: BitmapCache,
    /// Where url-opened documents are stored
    pub downloads_dir: PathBuf,
}

/// The page of interest: the first frame whose band
/// `(top*scale, (bottom+divider)*scale]` contains the probe point
#[must_use]
pub fn page_at_probe(
    frames: &[PageFrame],
    transform: &Transform,
    viewport_height: f32,
    divider: f32,
) -> Option<usize> {
    let probe = transform.scroll_y() + viewport_height * PAGE_PROBE_FRACTION;
    let scale = transform.scale;
    frames
        .iter()
        .find(|f| probe > f.rect.top * scale && probe <= (f.rect.bottom + divider) * scale)
        .map(|f| f.index)
}

pub struct Viewer {
    executor: Arc<dyn Executor>,
    loader: Arc<dyn DocumentLoader>,
    downloader: Arc<dyn Downloader>,
    cache: BitmapCache,
    downloads_dir: PathBuf,
    results_tx: Sender<ViewerMessage>,
    results_rx: Receiver<ViewerMessage>,

    document: Option<Arc<DocumentHandle>>,
    generation: u64,
    frames: Arc<[PageFrame]>,
    content_height: f32,
    loading_tiles: TileSet,
    scaling_tiles: TileSet,

    geometry: LayoutGeometry,
    viewport_height: f32,
    transform: Transform,
    bounds: ScaleBounds,
    offscreen_limit: usize,
    page_of_interest: usize,
    state: ViewerState,
    gesture: GestureController,
    fling: Option<FlingAnimation>,

    layout_task: Option<TaskHandle>,
    loading_task: Option<TaskHandle>,
    scaling_task: Option<TaskHandle>,
    pending_download: Option<(String, TaskHandle)>,
    listener: Option<PageChangeListener>,
}

impl Viewer {
    pub fn new(services: ViewerServices, config: &ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;
        let (results_tx, results_rx) = flume::unbounded();

        let mut bounds = ScaleBounds {
            min: config.min_scale,
            max: config.min_scale,
        };
        bounds.set_max(config.max_scale);

        services
            .cache
            .resize_memory(memory_capacity(config.offscreen_page_limit));

        Ok(Self {
            executor: services.executor,
            loader: services.loader,
            downloader: services.downloader,
            cache: services.cache,
            downloads_dir: services.downloads_dir,
            results_tx,
            results_rx,
            document: None,
            generation: 0,
            frames: Arc::from(Vec::new()),
            content_height: 0.0,
            loading_tiles: TileSet::default(),
            scaling_tiles: TileSet::default(),
            geometry: LayoutGeometry {
                viewport_width: 0.0,
                padding_left: config.padding_left,
                padding_right: config.padding_right,
                divider: config.divider_height,
            },
            viewport_height: 0.0,
            transform: Transform::new(bounds.min, PointF::default()),
            bounds,
            offscreen_limit: config.offscreen_page_limit,
            page_of_interest: 0,
            state: ViewerState::Idle,
            gesture: GestureController::new(config.zoom_enabled),
            fling: None,
            layout_task: None,
            loading_task: None,
            scaling_task: None,
            pending_download: None,
            listener: None,
        })
    }

    // ---- Document loading ----

    /// Open a local document, replacing the current one.
    ///
    /// On failure the current document and view are left untouched.
    pub fn open_path(&mut self, path: &Path) -> Result<(), ViewerError> {
        let document = DocumentHandle::open(self.loader.as_ref(), path).inspect_err(|e| {
            error!("{e}");
        })?;
        info!(
            "Opened {} ({} pages)",
            document.identity(),
            document.page_count()
        );

        for task in [self.loading_task.take(), self.scaling_task.take()]
            .into_iter()
            .flatten()
        {
            task.cancel();
        }
        self.layout_task = None;
        self.document = Some(Arc::new(document));
        self.generation += 1;
        self.frames = Arc::from(Vec::new());
        self.content_height = 0.0;
        self.loading_tiles = TileSet::default();
        self.scaling_tiles = TileSet::default();
        self.transform = Transform::new(self.bounds.min, PointF::default());
        self.page_of_interest = 0;
        self.fling = None;
        self.state = ViewerState::Idle;

        self.request_layout();
        Ok(())
    }

    /// Open a remote document. A previously downloaded copy is opened directly;
    /// otherwise the download runs in the background and the document opens
    /// once it lands.
    pub fn open_url(&mut self, url: &str) -> Result<(), ViewerError> {
        let dest = download_path(&self.downloads_dir, url);
        if dest.exists() {
            debug!("Using downloaded copy of {url} at {dest:?}");
            return self.open_path(&dest);
        }

        if let Some((_, task)) = self.pending_download.take() {
            task.cancel_if_pending();
        }
        info!("Downloading {url} to {dest:?}");
        let job = DownloadJob {
            url: url.to_string(),
            dest,
            downloader: Arc::clone(&self.downloader),
        };
        let results = self.results_tx.clone();
        let task = spawn(self.executor.as_ref(), "download", move |_| {
            run_download(job, &results);
        });
        self.pending_download = Some((url.to_string(), task));
        Ok(())
    }

    // ---- Host configuration ----

    /// Host measure pass. A width change re-runs the layout.
    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        let width_changed = width != self.geometry.viewport_width;
        self.geometry.viewport_width = width;
        self.viewport_height = height;

        if width_changed || self.frames.is_empty() {
            self.request_layout();
        }
        if !self.frames.is_empty() {
            self.transform.reclamp(&self.extents());
            self.recompute_page_of_interest();
        }
    }

    pub fn set_padding(&mut self, left: f32, right: f32) {
        if left == self.geometry.padding_left && right == self.geometry.padding_right {
            return;
        }
        self.geometry.padding_left = left;
        self.geometry.padding_right = right;
        self.request_layout();
    }

    /// Number of pages rendered on each side of the current page
    pub fn set_offscreen_window(&mut self, limit: usize) -> Result<(), ViewerError> {
        if limit < 1 {
            return Err(ViewerError::InvalidConfiguration(format!(
                "offscreen page limit must be at least 1, got {limit}"
            )));
        }
        self.offscreen_limit = limit;
        self.cache.resize_memory(memory_capacity(limit));
        Ok(())
    }

    pub fn set_zoom_enabled(&mut self, enabled: bool) {
        self.gesture.set_zoom_enabled(enabled);
    }

    /// Set the maximum zoom, capped at the hard ceiling
    pub fn set_max_scale(&mut self, max: f32) {
        self.bounds.set_max(max);
        if self.transform.scale > self.bounds.max {
            self.transform.scale = self.bounds.max;
            self.transform.reclamp(&self.extents());
            self.recompute_page_of_interest();
        }
    }

    pub fn set_page_change_listener(&mut self, listener: impl FnMut(usize, usize) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    // ---- Input ----

    /// Feed one pointer event. Returns whether the event was consumed.
    pub fn on_pointer_event(&mut self, event: &PointerEvent) -> bool {
        self.clear_scaling_tiles();
        if self.frames.is_empty() {
            return false;
        }

        if matches!(
            event.action,
            PointerAction::Down | PointerAction::PointerDown
        ) && self.fling.is_some()
        {
            self.stop_fling();
        }

        let extents = self.extents();
        let outcome = self
            .gesture
            .on_event(event, &mut self.transform, &self.bounds, &extents);

        match self.gesture.mode() {
            TouchMode::Single => self.state = ViewerState::Panning,
            TouchMode::Multi => self.state = ViewerState::Pinching,
            TouchMode::Idle => {}
        }

        match outcome {
            GestureOutcome::Started => true,
            GestureOutcome::Moved => {
                self.recompute_page_of_interest();
                true
            }
            GestureOutcome::Released { fling: Some(velocity) } => {
                self.start_fling(velocity, event.time);
                true
            }
            GestureOutcome::Released { fling: None } => {
                self.settle();
                true
            }
            GestureOutcome::Ignored => false,
        }
    }

    /// Advance a running fling. Returns whether the transform changed.
    pub fn tick(&mut self, now: Duration) -> bool {
        let Some(fling) = self.fling else {
            return false;
        };
        self.clear_scaling_tiles();

        let (translate, finished) = fling.value_at(now);
        let extents = self.extents();
        self.transform.set_translation(translate, &extents);
        self.recompute_page_of_interest();

        if finished {
            debug!("Fling finished at {:?}", self.transform.translate);
            self.fling = None;
            self.settle();
        }
        true
    }

    fn start_fling(&mut self, velocity: PointF, now: Duration) {
        let from = self.transform.translate;
        let proposed = PointF::new(
            from.x + velocity.x * FLING_VELOCITY_FACTOR,
            from.y + velocity.y * FLING_VELOCITY_FACTOR,
        );
        let to = self.transform.clamp_translation(proposed, &self.extents());
        if to == from {
            self.settle();
            return;
        }

        let fling = FlingAnimation::new(from, to, now);
        debug!("Fling from {from:?} to {to:?} over {:?}", fling.duration());
        self.fling = Some(fling);
        self.state = ViewerState::Flinging;
    }

    /// Cancel a running fling where it is
    fn stop_fling(&mut self) {
        if self.fling.take().is_some() {
            debug!("Fling cancelled at {:?}", self.transform.translate);
            self.submit_loading_task();
        }
    }

    fn settle(&mut self) {
        self.state = ViewerState::Idle;
        self.submit_loading_task();
    }

    // ---- Results ----

    /// Apply every result posted so far. Returns how many messages were handled.
    pub fn process_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.results_rx.try_recv() {
            debug!("Applying {} result", message.kind());
            self.apply(message);
            handled += 1;
        }
        handled
    }

    fn apply(&mut self, message: ViewerMessage) {
        match message {
            ViewerMessage::Layout {
                generation,
                geometry,
                frames,
            } => {
                if generation != self.generation {
                    debug!("Dropping layout for generation {generation}");
                    return;
                }
                self.layout_task = None;
                if geometry != self.geometry {
                    debug!("Dropping layout computed for {geometry:?}; re-measuring");
                    self.request_layout();
                } else {
                    self.apply_layout(frames);
                }
            }
            ViewerMessage::LoadingTiles {
                generation,
                page_of_interest,
                tiles,
            } => {
                if !self.is_current(generation, page_of_interest) {
                    debug!("Dropping stale loading tiles for page {page_of_interest}");
                } else if tiles.is_empty() {
                    debug!("Loading task for page {page_of_interest} produced no tiles");
                } else {
                    self.loading_tiles = Arc::new(tiles);
                    self.submit_scaling_task();
                }
            }
            ViewerMessage::ScalingTiles {
                generation,
                page_of_interest,
                transform,
                tiles,
            } => {
                if !self.is_current(generation, page_of_interest) || self.state != ViewerState::Idle
                {
                    debug!("Dropping stale scaling tiles for page {page_of_interest}");
                } else if transform != self.transform {
                    debug!("Dropping scaling tiles cut for {transform:?}");
                } else {
                    self.scaling_tiles = Arc::new(tiles);
                }
            }
            ViewerMessage::Downloaded { url, path } => {
                let expected = self
                    .pending_download
                    .as_ref()
                    .is_some_and(|(pending, _)| *pending == url);
                if !expected {
                    debug!("Ignoring superseded download of {url}");
                    return;
                }
                self.pending_download = None;
                if let Err(e) = self.open_path(&path) {
                    warn!("Downloaded document could not be opened: {e}");
                }
            }
        }
    }

    fn is_current(&self, generation: u64, page_of_interest: usize) -> bool {
        generation == self.generation && page_of_interest == self.page_of_interest
    }

    fn apply_layout(&mut self, frames: Vec<PageFrame>) {
        self.content_height = content_height(&frames);
        self.frames = Arc::from(frames);
        self.loading_tiles = TileSet::default();
        self.clear_scaling_tiles();
        self.transform.reclamp(&self.extents());
        self.page_of_interest = page_at_probe(
            &self.frames,
            &self.transform,
            self.viewport_height,
            self.geometry.divider,
        )
        .unwrap_or(0);

        info!(
            "Layout ready: {} pages, content height {}",
            self.frames.len(),
            self.content_height
        );
        self.submit_loading_task();
        self.notify_page_changed();
    }

    // ---- Task submission ----

    fn request_layout(&mut self) {
        let Some(document) = &self.document else {
            return;
        };
        if self.geometry.content_width() <= 0.0 {
            debug!("Viewport not measured yet; deferring layout");
            return;
        }
        if self.layout_task.as_ref().is_some_and(|t| !t.is_done()) {
            debug!("Layout already in flight");
            return;
        }

        let job = LayoutJob {
            generation: self.generation,
            geometry: self.geometry,
            document: Arc::downgrade(document),
        };
        let results = self.results_tx.clone();
        self.layout_task = Some(spawn(self.executor.as_ref(), "layout", move |_| {
            run_layout(job, &results);
        }));
    }

    fn submit_loading_task(&mut self) {
        let Some(document) = &self.document else {
            return;
        };
        if self.frames.is_empty() {
            return;
        }
        if let Some(previous) = self.loading_task.take() {
            previous.cancel_if_pending();
        }

        let job = LoadingJob {
            generation: self.generation,
            page_of_interest: self.page_of_interest,
            offscreen_limit: self.offscreen_limit,
            frames: Arc::clone(&self.frames),
            document: Arc::downgrade(document),
            cache: self.cache.clone(),
        };
        let results = self.results_tx.clone();
        self.loading_task = Some(spawn(self.executor.as_ref(), "loading", move |token| {
            run_loading_tiles(job, token, &results);
        }));
    }

    fn submit_scaling_task(&mut self) {
        if self.state != ViewerState::Idle || self.frames.is_empty() {
            return;
        }
        let Some(document) = &self.document else {
            return;
        };
        if self.geometry.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return;
        }
        if let Some(previous) = self.scaling_task.take() {
            previous.cancel_if_pending();
        }

        let job = ScalingJob {
            generation: self.generation,
            page_of_interest: self.page_of_interest,
            frames: Arc::clone(&self.frames),
            transform: self.transform,
            viewport_width: self.geometry.viewport_width,
            viewport_height: self.viewport_height,
            document: Arc::downgrade(document),
        };
        let results = self.results_tx.clone();
        self.scaling_task = Some(spawn(self.executor.as_ref(), "scaling", move |token| {
            run_scaling_tiles(job, token, &results);
        }));
    }

    fn clear_scaling_tiles(&mut self) {
        if !self.scaling_tiles.is_empty() {
            self.scaling_tiles = TileSet::default();
        }
        if let Some(task) = self.scaling_task.take() {
            task.cancel_if_pending();
        }
    }

    // ---- Page tracking ----

    fn recompute_page_of_interest(&mut self) {
        let Some(page) = page_at_probe(
            &self.frames,
            &self.transform,
            self.viewport_height,
            self.geometry.divider,
        ) else {
            return;
        };
        if page != self.page_of_interest {
            debug!("Page of interest {} -> {page}", self.page_of_interest);
            self.page_of_interest = page;
            self.notify_page_changed();
        }
    }

    fn notify_page_changed(&mut self) {
        let count = self.frames.len();
        let page = self.page_of_interest;
        if let Some(listener) = self.listener.as_mut() {
            listener(page, count);
        }
    }

    // ---- Drawing ----

    /// Display list for the current frame
    #[must_use]
    pub fn compose(&self) -> Vec<DrawOp> {
        compose(&FrameInputs {
            frames: &self.frames,
            loading: &self.loading_tiles,
            scaling: &self.scaling_tiles,
            transform: &self.transform,
            geometry: &self.geometry,
            viewport_height: self.viewport_height,
        })
    }

    // ---- Accessors ----

    fn extents(&self) -> Extents {
        Extents {
            content_width: self.geometry.viewport_width,
            content_height: self.content_height,
            viewport_width: self.geometry.viewport_width,
            viewport_height: self.viewport_height,
        }
    }

    #[must_use]
    pub fn state(&self) -> ViewerState {
        self.state
    }

    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[must_use]
    pub fn scale_bounds(&self) -> &ScaleBounds {
        &self.bounds
    }

    #[must_use]
    pub fn page_of_interest(&self) -> usize {
        self.page_of_interest
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.document.as_ref().map_or(0, |d| d.page_count())
    }

    #[must_use]
    pub fn frames(&self) -> &[PageFrame] {
        &self.frames
    }

    #[must_use]
    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    #[must_use]
    pub fn geometry(&self) -> &LayoutGeometry {
        &self.geometry
    }

    #[must_use]
    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    #[must_use]
    pub fn loading_tiles(&self) -> &[RenderedTile] {
        &self.loading_tiles
    }

    #[must_use]
    pub fn scaling_tiles(&self) -> &[RenderedTile] {
        &self.scaling_tiles
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn offscreen_limit(&self) -> usize {
        self.offscreen_limit
    }

    #[must_use]
    pub fn zoom_enabled(&self) -> bool {
        self.gesture.zoom_enabled()
    }

    #[must_use]
    pub fn document(&self) -> Option<&DocumentHandle> {
        self.document.as_deref()
    }

    #[must_use]
    pub fn is_flinging(&self) -> bool {
        self.fling.is_some()
    }

    /// Whether a download started by [`Viewer::open_url`] is still pending
    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.pending_download
            .as_ref()
            .is_some_and(|(_, task)| !task.is_done())
    }

    #[must_use]
    pub fn cache(&self) -> &BitmapCache {
        &self.cache
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("document", &self.document)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("page_of_interest", &self.page_of_interest)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::RectF;

    fn frames(count: usize, height: f32, divider: f32) -> Vec<PageFrame> {
        (0..count)
            .map(|i| {
                let top = i as f32 * (height + divider);
                PageFrame {
                    index: i,
                    fill_width_scale: 1.0,
                    rect: RectF::new(0.0, top, 300.0, top + height),
                }
            })
            .collect()
    }

    #[test]
    fn probe_picks_page_under_forty_percent_line() {
        let frames = frames(3, 400.0, 8.0);
        let at = |y: f32| Transform::new(1.0, PointF::new(0.0, y));

        assert_eq!(page_at_probe(&frames, &at(0.0), 500.0, 8.0), Some(0));
        // Probe at 399 + 200 = 599: inside page 1
        assert_eq!(page_at_probe(&frames, &at(-399.0), 500.0, 8.0), Some(1));
        // Probe exactly on page 0's divider bottom still belongs to page 0
        assert_eq!(page_at_probe(&frames, &at(-208.0), 500.0, 8.0), Some(0));
        assert_eq!(page_at_probe(&frames, &at(-209.0), 500.0, 8.0), Some(1));
    }

    #[test]
    fn probe_accounts_for_scale() {
        let frames = frames(3, 400.0, 0.0);
        let t = Transform::new(2.0, PointF::new(0.0, -700.0));
        // Probe 900 in scaled space is layout y 450
        assert_eq!(page_at_probe(&frames, &t, 500.0, 0.0), Some(1));
    }

    #[test]
    fn probe_past_the_end_finds_nothing() {
        let frames = frames(1, 400.0, 0.0);
        let t = Transform::new(1.0, PointF::new(0.0, -1000.0));
        assert_eq!(page_at_probe(&frames, &t, 500.0, 0.0), None);
    }
}
