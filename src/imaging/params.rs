//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the thumbnail helper (which decides which file to
//! create and where) and the [`backend`](super::backend), which does the
//! pixel work. Tests swap in a recording backend without touching the
//! callers.

use std::path::PathBuf;

/// Parameters for a thumbnail operation: scale to cover, then center-crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Exact output width in pixels.
    pub width: u32,
    /// Exact output height in pixels.
    pub height: u32,
}

impl ThumbnailParams {
    /// Zero-sized thumbnails cannot be encoded.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}
