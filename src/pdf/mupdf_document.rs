//! MuPDF-backed [`Document`]
//!
//! `mupdf::Document` is not `Send`, so the handle only carries the path and
//! the page geometry read at open time. Every worker thread lazily opens its
//! own copy of the file the first time it rasterizes a page.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use log::debug;
use mupdf::{Colorspace, Device, Matrix, Pixmap};

use super::document::{Document, DocumentLoader};
use super::error::RenderError;
use super::types::{Bitmap, PageSize, PixelSize, RegionTransform};

thread_local! {
    static OPEN_DOCUMENT: RefCell<Option<(PathBuf, mupdf::Document)>> =
        const { RefCell::new(None) };
}

/// Opens PDF files with MuPDF
#[derive(Clone, Debug, Default)]
pub struct MupdfLoader;

impl DocumentLoader for MupdfLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, RenderError> {
        Ok(Box::new(MupdfDocument::open(path)?))
    }
}

/// A PDF file whose page geometry has been read
#[derive(Debug)]
pub struct MupdfDocument {
    path: PathBuf,
    page_sizes: Vec<PageSize>,
}

impl MupdfDocument {
    pub fn open(path: &Path) -> Result<Self, RenderError> {
        let doc = mupdf::Document::open(path.to_string_lossy().as_ref())?;
        let count = doc.page_count()?.max(0) as usize;
        let mut page_sizes = Vec::with_capacity(count);
        for index in 0..count {
            let bounds = doc.load_page(index as i32)?.bounds()?;
            page_sizes.push(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }
        debug!("Opened {path:?} with {count} pages");
        Ok(Self {
            path: path.to_path_buf(),
            page_sizes,
        })
    }

    /// Run `f` against this thread's open copy of the document
    fn with_document<T>(
        &self,
        f: impl FnOnce(&mupdf::Document) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        OPEN_DOCUMENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            let reopen = slot.as_ref().is_none_or(|(path, _)| path != &self.path);
            if reopen {
                let doc = mupdf::Document::open(self.path.to_string_lossy().as_ref())?;
                *slot = Some((self.path.clone(), doc));
            }
            match slot.as_ref() {
                Some((_, doc)) => f(doc),
                None => Err(RenderError::generic("document slot empty after open")),
            }
        })
    }
}

impl Document for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        self.page_sizes
            .get(page)
            .copied()
            .ok_or(RenderError::PageOutOfRange {
                page,
                count: self.page_sizes.len(),
            })
    }

    fn rasterize(
        &self,
        page: usize,
        target: PixelSize,
        region: Option<&RegionTransform>,
    ) -> Result<Bitmap, RenderError> {
        let size = self.page_size(page)?;
        self.with_document(|doc| {
            let page = doc.load_page(page as i32)?;
            let bounds = page.bounds()?;

            // Page coordinates start at the bounds origin, not necessarily (0, 0)
            let (sx, sy, tx, ty) = match region {
                Some(r) => (r.scale, r.scale, r.translate_x, r.translate_y),
                None => (
                    target.width as f32 / size.width,
                    target.height as f32 / size.height,
                    0.0,
                    0.0,
                ),
            };
            let ctm = Matrix::new(sx, 0.0, 0.0, sy, tx - bounds.x0 * sx, ty - bounds.y0 * sy);

            let rgb = Colorspace::device_rgb();
            let mut pixmap =
                Pixmap::new_with_w_h(&rgb, target.width as i32, target.height as i32, false)?;
            pixmap.clear_with(255)?;
            {
                let device = Device::from_pixmap(&pixmap)?;
                page.run(&device, &ctm)?;
            }
            pixmap_to_rgba(&pixmap)
        })
    }
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<Bitmap, RenderError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RenderError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(RenderError::generic("Pixmap buffer size mismatch"));
    }

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + row_bytes];
        for px in row.chunks_exact(n) {
            pixels.extend_from_slice(&px[..3]);
            pixels.push(if n >= 4 { px[3] } else { 255 });
        }
    }

    Ok(Bitmap {
        width: width as u32,
        height: height as u32,
        pixels,
    })
}
