//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the builder needs:
//! identify, publish, and thumbnail.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked. Tests use the recording `MockBackend` so discovery and rendering
//! can run on fake image bytes.

use super::params::ThumbnailParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` because thumbnails are produced from template filters that
/// may run on several rendering threads.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions. Fails for unreadable or undecodable files.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode `source` and write it re-encoded to `output`, creating parent
    /// directories as needed.
    fn publish(&self, source: &Path, output: &Path) -> Result<(), BackendError>;

    /// Execute a thumbnail operation (scale to cover + center crop).
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;
}
