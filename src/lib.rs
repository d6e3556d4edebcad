// Export modules for use in tests
pub mod library;
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the viewer entry points
pub use pdf::{Viewer, ViewerServices};
pub use settings::ViewerConfig;
