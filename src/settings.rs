use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::disk_cache::DEFAULT_DISK_BUDGET;
use crate::pdf::error::ViewerError;
use crate::pdf::service::DEFAULT_WORKERS;
use crate::pdf::zoom::{DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE, MAX_SCALE_CEILING};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
pub const APP_NAME: &str = "pdfview";

/// Pages rendered on each side of the current page
pub const DEFAULT_OFFSCREEN_PAGE_LIMIT: usize = 2;
/// Gap between pages and along the side edges, in viewport pixels
pub const DEFAULT_DIVIDER_HEIGHT: f32 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_offscreen_page_limit")]
    pub offscreen_page_limit: usize,

    #[serde(default = "default_true")]
    pub zoom_enabled: bool,

    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    /// Capped at 20 when applied
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    #[serde(default = "default_divider_height")]
    pub divider_height: f32,

    #[serde(default)]
    pub padding_left: f32,

    #[serde(default)]
    pub padding_right: f32,

    /// Byte budget of the persistent bitmap cache
    #[serde(default = "default_disk_cache_budget")]
    pub disk_cache_budget: u64,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_offscreen_page_limit() -> usize {
    DEFAULT_OFFSCREEN_PAGE_LIMIT
}

fn default_min_scale() -> f32 {
    DEFAULT_MIN_SCALE
}

fn default_max_scale() -> f32 {
    DEFAULT_MAX_SCALE
}

fn default_divider_height() -> f32 {
    DEFAULT_DIVIDER_HEIGHT
}

fn default_disk_cache_budget() -> u64 {
    DEFAULT_DISK_BUDGET
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKERS
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            offscreen_page_limit: DEFAULT_OFFSCREEN_PAGE_LIMIT,
            zoom_enabled: true,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            divider_height: DEFAULT_DIVIDER_HEIGHT,
            padding_left: 0.0,
            padding_right: 0.0,
            disk_cache_budget: DEFAULT_DISK_BUDGET,
            worker_threads: DEFAULT_WORKERS,
        }
    }
}

impl ViewerConfig {
    /// Reject values the viewer cannot run with
    pub fn validate(&self) -> Result<(), ViewerError> {
        let invalid = |msg: String| Err(ViewerError::InvalidConfiguration(msg));

        if self.offscreen_page_limit < 1 {
            return invalid(format!(
                "offscreen page limit must be at least 1, got {}",
                self.offscreen_page_limit
            ));
        }
        if self.worker_threads < 1 {
            return invalid("worker thread count must be at least 1".to_string());
        }
        if !self.min_scale.is_finite() || self.min_scale <= 0.0 {
            return invalid(format!("min scale must be positive, got {}", self.min_scale));
        }
        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            return invalid(format!(
                "max scale {} must be finite and not below min scale {}",
                self.max_scale, self.min_scale
            ));
        }
        if self.min_scale > MAX_SCALE_CEILING {
            return invalid(format!(
                "min scale {} exceeds the ceiling {MAX_SCALE_CEILING}",
                self.min_scale
            ));
        }
        for (name, value) in [
            ("divider height", self.divider_height),
            ("left padding", self.padding_left),
            ("right padding", self.padding_right),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        Ok(())
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the config from its default location, writing defaults if it does
/// not exist yet. Unreadable or invalid files fall back to defaults.
pub fn load_config() -> ViewerConfig {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return ViewerConfig::default();
    };
    if path.exists() {
        load_config_from_path(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let config = ViewerConfig::default();
        save_config_to_file(&config, &path);
        config
    }
}

pub fn load_config_from_path(path: &Path) -> ViewerConfig {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            return ViewerConfig::default();
        }
    };

    match serde_yaml::from_str::<ViewerConfig>(&content) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                debug!("Loaded settings from {path:?}");
                config
            }
            Err(e) => {
                error!("Ignoring settings file {path:?}: {e}");
                ViewerConfig::default()
            }
        },
        Err(e) => {
            error!("Failed to parse settings file {path:?}: {e}");
            ViewerConfig::default()
        }
    }
}

pub fn save_config_to_file(config: &ViewerConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = match serde_yaml::to_string(config) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };
    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_viewer_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.offscreen_page_limit, 2);
        assert_eq!(config.max_scale, 10.0);
        assert_eq!(config.min_scale, 1.0);
        assert_eq!(config.divider_height, 8.0);
        assert_eq!(config.disk_cache_budget, 100 * 1024 * 1024);
        assert_eq!(config.worker_threads, 3);
        assert!(config.zoom_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config: ViewerConfig =
            serde_yaml::from_str("offscreen_page_limit: 1\nzoom_enabled: false\n").unwrap();
        assert_eq!(config.offscreen_page_limit, 1);
        assert!(!config.zoom_enabled);
        assert_eq!(config.max_scale, DEFAULT_MAX_SCALE);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ViewerConfig {
            offscreen_page_limit: 0,
            ..ViewerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ViewerError::InvalidConfiguration(_))
        ));

        config.offscreen_page_limit = 1;
        config.max_scale = f32::NAN;
        assert!(config.validate().is_err());

        config.max_scale = 10.0;
        config.divider_height = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let config = ViewerConfig {
            offscreen_page_limit: 3,
            padding_left: 12.0,
            ..ViewerConfig::default()
        };

        save_config_to_file(&config, &path);

        assert_eq!(load_config_from_path(&path), config);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "offscreen_page_limit: [not a number").unwrap();
        assert_eq!(load_config_from_path(&path), ViewerConfig::default());
    }
}
