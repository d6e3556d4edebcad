//! Command-line shell around the viewer
//!
//! Opens a document, sizes the viewport, optionally scrolls and zooms with
//! synthetic pointer input, then writes the composed frame to a PNG.
//!
//! ```bash
//! pdfview report.pdf --scroll-pages 2 --zoom 2.5 --output frame.png
//! pdfview https://example.com/paper.pdf --width 1200 --height 1600
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use pdfview::library::{resolve_log_path, resolve_viewer_paths};
use pdfview::panic_handler::initialize_panic_handler;
use pdfview::pdf::cache::memory_capacity;
use pdfview::pdf::{
    BitmapCache, DiskCache, HttpDownloader, MupdfLoader, Palette, PixelSize, PointF,
    PointerAction, PointerEvent, Viewer, ViewerServices, ViewerState, WorkerPool, paint_frame,
};
use pdfview::settings::{load_config, load_config_from_path};

/// Render a scrolled and zoomed viewport of a PDF to a PNG
#[derive(Parser, Debug)]
#[command(name = "pdfview")]
#[command(version, about, long_about = None)]
struct Args {
    /// Local path or http(s) url of the document
    source: String,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1080)]
    width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1920)]
    height: u32,

    /// Pages to scroll down (fractions allowed) with a slow drag
    #[arg(long, default_value_t = 0.0)]
    scroll_pages: f32,

    /// Pinch zoom factor applied around the viewport centre
    #[arg(long, default_value_t = 1.0)]
    zoom: f32,

    /// Output PNG path
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to wait for background rendering
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Drives synthetic pointer input with monotonic timestamps
struct InputClock {
    started: Instant,
}

impl InputClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    initialize_panic_handler();

    let log_path = resolve_log_path()?;
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), File::create(&log_path)?)?;
    info!("Starting pdfview, logging to {log_path:?}");

    let config = match &args.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    let paths = resolve_viewer_paths()?;

    let disk = match DiskCache::open(&paths.bitmap_cache_dir, config.disk_cache_budget) {
        Ok(disk) => Some(disk),
        Err(e) => {
            warn!("Persistent cache unavailable, continuing in memory only: {e}");
            None
        }
    };
    let cache = BitmapCache::new(memory_capacity(config.offscreen_page_limit), disk);
    let pool = Arc::new(WorkerPool::new(config.worker_threads));

    let mut viewer = Viewer::new(
        ViewerServices {
            executor: pool,
            loader: Arc::new(MupdfLoader),
            downloader: Arc::new(HttpDownloader),
            cache,
            downloads_dir: paths.downloads_dir,
        },
        &config,
    )
    .context("Invalid viewer configuration")?;
    viewer.set_page_change_listener(|page, count| println!("page {}/{count}", page + 1));
    viewer.set_viewport_size(args.width as f32, args.height as f32);

    if args.source.starts_with("http://") || args.source.starts_with("https://") {
        viewer.open_url(&args.source)?;
    } else {
        viewer
            .open_path(Path::new(&args.source))
            .with_context(|| format!("Failed to open {}", args.source))?;
    }

    let timeout = Duration::from_secs(args.timeout_secs);
    pump_until(&mut viewer, timeout, |v| !v.frames().is_empty())
        .context("Document never finished laying out")?;

    let clock = InputClock {
        started: Instant::now(),
    };
    if args.scroll_pages != 0.0 {
        scroll_pages(&mut viewer, &clock, args.scroll_pages);
    }
    if (args.zoom - 1.0).abs() > f32::EPSILON {
        pinch(&mut viewer, &clock, args.zoom);
    }
    while viewer.tick(clock.now()) && viewer.state() == ViewerState::Flinging {
        std::thread::sleep(Duration::from_millis(16));
    }

    let settled = pump_until(&mut viewer, timeout, |v| {
        let page = v.page_of_interest();
        v.loading_tiles().iter().any(|t| t.page == page) && !v.scaling_tiles().is_empty()
    });
    if let Err(e) = settled {
        warn!("Writing a partially rendered frame: {e}");
    }

    let size = PixelSize::new(args.width, args.height);
    let frame = paint_frame(&viewer.compose(), size, &Palette::default());
    image::save_buffer(
        &args.output,
        &frame.pixels,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
    )
    .with_context(|| format!("Failed to write {:?}", args.output))?;

    if let Some(disk) = viewer.cache().disk() {
        if let Err(e) = disk.flush() {
            warn!("Failed to save the bitmap cache index: {e}");
        }
    }

    println!(
        "wrote {:?}: page {}/{} at scale {:.2}",
        args.output,
        viewer.page_of_interest() + 1,
        viewer.page_count(),
        viewer.transform().scale
    );
    Ok(())
}

/// Apply background results until `done` holds
fn pump_until(
    viewer: &mut Viewer,
    timeout: Duration,
    done: impl Fn(&Viewer) -> bool,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        viewer.process_messages();
        if done(viewer) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out after {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Drag upwards slowly enough that the release does not fling
fn scroll_pages(viewer: &mut Viewer, clock: &InputClock, pages: f32) {
    let Some(first) = viewer.frames().first() else {
        return;
    };
    let page_extent = (first.rect.height() + viewer.geometry().divider) * viewer.transform().scale;
    let distance = pages * page_extent;
    let step = 40.0_f32.copysign(distance);
    let steps = (distance / step).ceil() as usize;

    let x = viewer.geometry().viewport_width / 2.0;
    let mut y = 0.0_f32;
    let mut time = clock.now();
    viewer.on_pointer_event(&PointerEvent::single(
        PointerAction::Down,
        PointF::new(x, y),
        time,
    ));
    let mut remaining = distance;
    for _ in 0..steps {
        let delta = if remaining.abs() < step.abs() { remaining } else { step };
        remaining -= delta;
        y -= delta;
        time += Duration::from_millis(200);
        viewer.on_pointer_event(&PointerEvent::single(
            PointerAction::Move,
            PointF::new(x, y),
            time,
        ));
    }
    time += Duration::from_millis(200);
    viewer.on_pointer_event(&PointerEvent::single(
        PointerAction::Up,
        PointF::new(x, y),
        time,
    ));
}

/// Two-finger pinch around the viewport centre scaling finger distance by `factor`
fn pinch(viewer: &mut Viewer, clock: &InputClock, factor: f32) {
    let cx = viewer.geometry().viewport_width / 2.0;
    let cy = viewer.viewport_height() / 2.0;
    let start = 100.0_f32;
    let end = start * factor;
    let pair = |d: f32| vec![PointF::new(cx - d / 2.0, cy), PointF::new(cx + d / 2.0, cy)];

    let t = clock.now();
    viewer.on_pointer_event(&PointerEvent::new(
        PointerAction::Down,
        vec![PointF::new(cx - start / 2.0, cy)],
        t,
    ));
    viewer.on_pointer_event(&PointerEvent::new(
        PointerAction::PointerDown,
        pair(start),
        t,
    ));
    viewer.on_pointer_event(&PointerEvent::new(
        PointerAction::Move,
        pair(end),
        t + Duration::from_millis(100),
    ));
    viewer.on_pointer_event(&PointerEvent::new(
        PointerAction::PointerUp,
        vec![PointF::new(cx - end / 2.0, cy)],
        t + Duration::from_millis(150),
    ));
    viewer.on_pointer_event(&PointerEvent::new(
        PointerAction::Up,
        vec![PointF::new(cx - end / 2.0, cy)],
        t + Duration::from_millis(200),
    ));
}
