//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Decode (JPEG, PNG, GIF) | `image::ImageReader` |
//! | Thumbnail crop | `image::DynamicImage::resize_to_fill` with `Lanczos3` |
//! | Encode | `image::DynamicImage::save_with_format`, format from the output extension |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::ThumbnailParams;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Encode `img` to `path`, picking the format from the extension.
///
/// JPEG has no alpha channel, so images are flattened to RGB first.
fn save_image(img: &DynamicImage, path: &Path) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let format = ImageFormat::from_path(path).map_err(|e| {
        BackendError::ProcessingFailed(format!("Unsupported output {}: {}", path.display(), e))
    })?;
    let result = if format == ImageFormat::Jpeg && img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(path, format)
    } else {
        img.save_with_format(path, format)
    };
    result.map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to encode {}: {}", path.display(), e))
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to identify {}: {}", path.display(), e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn publish(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        let img = load_image(source)?;
        save_image(&img, output)
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        if !params.is_valid() {
            return Err(BackendError::ProcessingFailed(format!(
                "Invalid thumbnail size {}x{} for {}",
                params.width,
                params.height,
                params.source.display()
            )));
        }
        let img = load_image(&params.source)?;
        let thumb = img.resize_to_fill(params.width, params.height, FilterType::Lanczos3);
        save_image(&thumb, &params.output)
    }
}
