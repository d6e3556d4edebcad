//! In-memory collaborators for driving the viewer deterministically in tests

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::pdf::document::{Document, DocumentLoader};
use crate::pdf::download::Downloader;
use crate::pdf::error::{RenderError, ViewerError};
use crate::pdf::service::{Executor, Job};
use crate::pdf::types::{Bitmap, PageSize, PixelSize, RegionTransform};

/// Colour a [`FakeDocument`] paints page `page` with
#[must_use]
pub fn page_colour(page: usize) -> [u8; 4] {
    let p = page as u8;
    [p.wrapping_mul(37), p.wrapping_mul(91).wrapping_add(13), 200, 255]
}

/// A document of solid-colour pages with configurable failures
#[derive(Clone, Debug, Default)]
pub struct FakeDocument {
    sizes: Vec<PageSize>,
    failing_sizes: HashSet<usize>,
    failing_pages: HashSet<usize>,
    rasterized: Arc<AtomicUsize>,
}

impl FakeDocument {
    #[must_use]
    pub fn new(sizes: Vec<PageSize>) -> Self {
        Self {
            sizes,
            ..Self::default()
        }
    }

    /// `page_size(page)` returns an error
    #[must_use]
    pub fn failing_size(mut self, page: usize) -> Self {
        self.failing_sizes.insert(page);
        self
    }

    /// `rasterize(page, ..)` returns an error
    #[must_use]
    pub fn failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Shared counter of successful rasterize calls
    #[must_use]
    pub fn rasterize_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.rasterized)
    }
}

impl Document for FakeDocument {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        if self.failing_sizes.contains(&page) {
            return Err(RenderError::generic(format!("no size for page {page}")));
        }
        self.sizes
            .get(page)
            .copied()
            .ok_or(RenderError::PageOutOfRange {
                page,
                count: self.sizes.len(),
            })
    }

    fn rasterize(
        &self,
        page: usize,
        target: PixelSize,
        _region: Option<&RegionTransform>,
    ) -> Result<Bitmap, RenderError> {
        if self.failing_pages.contains(&page) {
            return Err(RenderError::generic(format!("cannot render page {page}")));
        }
        self.rasterized.fetch_add(1, Ordering::SeqCst);
        Ok(Bitmap::filled(target, page_colour(page)))
    }
}

/// Serves [`FakeDocument`]s registered by path; anything else fails to open
#[derive(Debug, Default)]
pub struct FakeLoader {
    documents: Mutex<HashMap<PathBuf, FakeDocument>>,
}

impl FakeLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` under `path`
    #[must_use]
    pub fn with(self, path: impl Into<PathBuf>, document: FakeDocument) -> Self {
        self.insert(path, document);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, document: FakeDocument) {
        self.documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.into(), document);
    }
}

impl DocumentLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, RenderError> {
        self.documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
            .map(|doc| Box::new(doc) as Box<dyn Document>)
            .ok_or_else(|| RenderError::generic(format!("no such document: {path:?}")))
    }
}

/// Writes canned bytes for known urls and records every fetch
#[derive(Debug, Default)]
pub struct FakeDownloader {
    bodies: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeDownloader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Downloader for FakeDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ViewerError> {
        self.fetched
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(url.to_string());
        let body = self.bodies.get(url).ok_or_else(|| ViewerError::Download {
            url: url.to_string(),
            detail: "404".to_string(),
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ViewerError::Download {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        }
        fs::write(dest, body).map_err(|e| ViewerError::Download {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Queues jobs until the test runs them
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run the oldest queued job. Returns false if none was queued.
    pub fn run_next(&self) -> bool {
        let job = self.queue().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run queued jobs until the queue is empty. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.queue().push_back(job);
    }
}

/// Records page-change notifications
#[derive(Clone, Debug, Default)]
pub struct PageChanges {
    seen: Rc<RefCell<Vec<(usize, usize)>>>,
}

impl PageChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that appends to this recorder
    #[must_use]
    pub fn listener(&self) -> Box<dyn FnMut(usize, usize)> {
        let seen = Rc::clone(&self.seen);
        Box::new(move |page, count| seen.borrow_mut().push((page, count)))
    }

    #[must_use]
    pub fn all(&self) -> Vec<(usize, usize)> {
        self.seen.borrow().clone()
    }

    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }
}
