//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` (header only) |
//! | **Publish** | full decode + re-encode into the build tree |
//! | **Thumbnail** | `resize_to_fill` with Lanczos3 (fit + center crop) |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use params::ThumbnailParams;
pub use rust_backend::RustBackend;
