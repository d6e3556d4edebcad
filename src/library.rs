use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::APP_NAME;

/// On-disk locations used by the viewer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewerPaths {
    /// Persistent bitmap cache
    pub bitmap_cache_dir: PathBuf,
    /// Documents fetched by url
    pub downloads_dir: PathBuf,
}

impl ViewerPaths {
    /// Lay the viewer's directories out under `root`
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            bitmap_cache_dir: root.join("bitmaps"),
            downloads_dir: root.join("downloads"),
        }
    }

    /// Create every directory if it does not exist
    pub fn create_all(&self) -> Result<()> {
        fs::create_dir_all(&self.bitmap_cache_dir).with_context(|| {
            format!(
                "Failed to create bitmap cache directory: {:?}",
                self.bitmap_cache_dir
            )
        })?;
        fs::create_dir_all(&self.downloads_dir).with_context(|| {
            format!(
                "Failed to create downloads directory: {:?}",
                self.downloads_dir
            )
        })?;
        Ok(())
    }
}

/// Compute XDG-compliant cache paths.
/// Creates the directories if they don't exist.
pub fn resolve_viewer_paths() -> Result<ViewerPaths> {
    let cache_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join(APP_NAME);

    let paths = ViewerPaths::under(&cache_dir);
    paths.create_all()?;
    Ok(paths)
}

/// Compute the XDG-compliant log file path.
/// Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join(format!("{APP_NAME}.log")))
}
