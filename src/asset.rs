//! Resource files attached to the content tree.
//!
//! - [`ImageAsset`]: an image with per-language captions, published once to
//!   `<output>/static/img/<filename>`.
//! - [`StaticFile`]: any other typed file, rendered as `<link>`, `<script>`
//!   or a bare URL depending on its [`AssetKind`].
//! - [`AssetSink`]: the build-session state discovery writes into (published
//!   names, gallery buckets, warnings).
//! - [`Thumbnails`]: the mutex-guarded registry behind the `thumbnail`
//!   template filter.
//!
//! Every URL is relative to the page being rendered, passed in as a
//! [`RenderPage`].

use crate::imaging::{BackendError, Dimensions, ImageBackend, ThumbnailParams};
use crate::metadata::{Captions, DirectoryCatalogs};
use crate::naming::{self, AssetKind};
use crate::types::{BuildWarning, RenderPage};
use maud::html;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Root-relative directory of published images.
pub const IMAGE_DIR: &str = "static/img";
/// Root-relative directory of generated thumbnails.
pub const THUMBNAIL_DIR: &str = "static/img/thumbnail";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("image {path}: {source}")]
    Image { path: PathBuf, source: BackendError },
    #[error("cannot copy {path}: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============================================================================
// Images
// ============================================================================

/// An image found in a content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub filename: String,
    /// Filename without extension, lowercased. Key into catalogs.
    pub name: String,
    pub source: PathBuf,
    pub dimensions: Dimensions,
    /// Language → field → value.
    captions: BTreeMap<String, Captions>,
}

impl ImageAsset {
    /// Decode `path` and attach its captions. Does not publish.
    pub fn open(
        filename: &str,
        path: &Path,
        catalogs: &DirectoryCatalogs,
        backend: &dyn ImageBackend,
    ) -> Result<Self, AssetError> {
        let dimensions = backend.identify(path).map_err(|source| AssetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let name = naming::stem(filename).to_lowercase();
        Ok(Self {
            filename: filename.to_string(),
            captions: catalogs.captions_for(&name),
            name,
            source: path.to_path_buf(),
            dimensions,
        })
    }

    /// A caption field in one language; empty when absent.
    pub fn caption(&self, field: &str, lang: &str) -> &str {
        self.captions
            .get(lang)
            .and_then(|c| c.get(field))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Caption fields available in `lang`.
    pub fn caption_fields(&self, lang: &str) -> Vec<&str> {
        self.captions
            .get(lang)
            .map(|c| c.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gallery bucket this image joins in `lang`, if any.
    pub fn gallery(&self, lang: &str) -> Option<&str> {
        Some(self.caption("gallery", lang)).filter(|g| !g.is_empty())
    }

    /// Path below the build root.
    pub fn root_url(&self) -> String {
        format!("{IMAGE_DIR}/{}", self.filename)
    }

    /// URL of the published image as seen from `page`.
    pub fn resolve_url(&self, page: &RenderPage) -> String {
        format!("{}{}", page.to_build_root(), self.root_url())
    }

    /// `<img>` tag with captions of the page's language.
    pub fn img_tag(&self, page: &RenderPage, class: Option<&str>, id: Option<&str>) -> String {
        let lang = page.language.as_str();
        html! {
            img class=[class] id=[id] src=(self.resolve_url(page))
                title=(self.caption("title", lang)) alt=(self.caption("alt", lang));
        }
        .into_string()
    }
}

// ============================================================================
// Other files
// ============================================================================

/// A typed non-image file with a build-root-relative URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    pub kind: AssetKind,
    pub filename: String,
    /// Path below the build root, `/`-separated.
    pub root_url: String,
}

impl StaticFile {
    pub fn new(kind: AssetKind, filename: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            kind,
            filename: filename.into(),
            root_url: root_url.into(),
        }
    }

    pub fn url(&self, page: &RenderPage) -> String {
        format!("{}{}", page.to_build_root(), self.root_url)
    }

    /// The tag a template gets when it prints this file.
    pub fn render(&self, page: &RenderPage) -> String {
        let url = self.url(page);
        match self.kind {
            AssetKind::Style => html! {
                link href=(url) rel="stylesheet" type="text/css";
            }
            .into_string(),
            AssetKind::Icon => html! {
                link rel="shortcut icon" href=(url);
            }
            .into_string(),
            AssetKind::Javascript => html! {
                script src=(url) {}
            }
            .into_string(),
            _ => url,
        }
    }
}

// ============================================================================
// Galleries
// ============================================================================

/// Gallery name → images, in discovery order.
pub type GalleryMap = BTreeMap<String, Vec<Arc<ImageAsset>>>;

/// Per-language gallery buckets filled during discovery.
#[derive(Debug, Clone, Default)]
pub struct Galleries {
    by_language: BTreeMap<String, GalleryMap>,
}

impl Galleries {
    pub fn add(&mut self, lang: &str, gallery: &str, image: Arc<ImageAsset>) {
        self.by_language
            .entry(lang.to_string())
            .or_default()
            .entry(gallery.to_string())
            .or_default()
            .push(image);
    }

    pub fn for_language(&self, lang: &str) -> GalleryMap {
        self.by_language.get(lang).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Discovery side effects
// ============================================================================

/// Build-session state that page discovery writes into.
///
/// Only the page traversal gets a sink; the menu traversal runs without one
/// and therefore never publishes, copies or registers anything.
pub struct AssetSink<'a> {
    backend: &'a dyn ImageBackend,
    output: PathBuf,
    languages: Vec<String>,
    /// Published flat filename → source it came from.
    published: HashMap<String, PathBuf>,
    pub galleries: Galleries,
    pub warnings: Vec<BuildWarning>,
}

impl<'a> AssetSink<'a> {
    pub fn new(backend: &'a dyn ImageBackend, output: &Path, languages: Vec<String>) -> Self {
        Self {
            backend,
            output: output.to_path_buf(),
            languages,
            published: HashMap::new(),
            galleries: Galleries::default(),
            warnings: Vec::new(),
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Distinct flat names published so far.
    pub fn image_count(&self) -> usize {
        self.published.len()
    }

    /// Open an image, publish it, and register it in its galleries.
    pub fn load_image(
        &mut self,
        filename: &str,
        path: &Path,
        catalogs: &DirectoryCatalogs,
    ) -> Result<Arc<ImageAsset>, AssetError> {
        let image = Arc::new(ImageAsset::open(filename, path, catalogs, self.backend)?);
        self.publish(&image)?;
        for lang in &self.languages {
            if let Some(gallery) = image.gallery(lang) {
                debug!(image = %image.filename, lang = %lang, gallery, "gallery entry");
                self.galleries.add(lang, gallery, Arc::clone(&image));
            }
        }
        Ok(image)
    }

    fn publish(&mut self, image: &ImageAsset) -> Result<(), AssetError> {
        if let Some(previous) = self.published.get(&image.filename) {
            if previous == &image.source {
                return Ok(());
            }
            let warning = BuildWarning::NameCollision {
                name: image.filename.clone(),
                path: image.source.display().to_string(),
            };
            warn!("{warning}");
            self.warnings.push(warning);
        }
        let output = self.output.join(IMAGE_DIR).join(&image.filename);
        self.backend
            .publish(&image.source, &output)
            .map_err(|source| AssetError::Image {
                path: image.source.clone(),
                source,
            })?;
        self.published
            .insert(image.filename.clone(), image.source.clone());
        Ok(())
    }

    /// Copy a non-image content file next to its page's output and wrap it.
    ///
    /// `rel` is the owning node's path below the language root (empty for
    /// the root itself).
    pub fn attach_file(
        &mut self,
        kind: AssetKind,
        source: &Path,
        lang: &str,
        rel: &str,
    ) -> Result<StaticFile, AssetError> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let root_url = [lang, rel, &filename]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        let target = self.output.join(&root_url);
        let copy_err = |source| AssetError::Copy {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(copy_err)?;
        }
        fs::copy(source, &target).map_err(copy_err)?;
        Ok(StaticFile::new(kind, filename, root_url))
    }
}

// ============================================================================
// Thumbnails
// ============================================================================

/// Creates each requested thumbnail once per build.
///
/// The lock is held while a thumbnail is encoded so two rendering threads
/// never write the same file.
pub struct Thumbnails {
    backend: Arc<dyn ImageBackend>,
    output: PathBuf,
    done: Mutex<HashSet<String>>,
}

impl Thumbnails {
    pub fn new(backend: Arc<dyn ImageBackend>, output: &Path) -> Self {
        Self {
            backend,
            output: output.to_path_buf(),
            done: Mutex::new(HashSet::new()),
        }
    }

    /// File name of a thumbnail: `<name>-<w>x<h>-<hash>.<ext>`.
    ///
    /// The hash is taken over the source path so equally named images from
    /// different directories never share a thumbnail.
    pub fn file_name(image: &ImageAsset, width: u32, height: u32) -> String {
        let digest = Sha256::digest(image.source.to_string_lossy().as_bytes());
        let hash = format!("{:x}", digest);
        let ext = naming::extension(&image.filename).unwrap_or_else(|| "png".to_string());
        format!("{}-{width}x{height}-{}.{ext}", image.name, &hash[..8])
    }

    /// Ensure the thumbnail exists and return its build-root-relative path.
    pub fn ensure(&self, image: &ImageAsset, width: u32, height: u32) -> Result<String, AssetError> {
        let root_url = format!("{THUMBNAIL_DIR}/{}", Self::file_name(image, width, height));
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        if !done.contains(&root_url) {
            let params = ThumbnailParams {
                source: image.source.clone(),
                output: self.output.join(&root_url),
                width,
                height,
            };
            self.backend
                .thumbnail(&params)
                .map_err(|source| AssetError::Image {
                    path: image.source.clone(),
                    source,
                })?;
            done.insert(root_url.clone());
        }
        Ok(root_url)
    }

    /// `<img>` tag for a thumbnail, as the `thumbnail` filter prints it.
    pub fn img_tag(
        &self,
        image: &ImageAsset,
        page: &RenderPage,
        width: u32,
        height: u32,
        style: Option<&str>,
    ) -> Result<String, AssetError> {
        let url = format!("{}{}", page.to_build_root(), self.ensure(image, width, height)?);
        let lang = page.language.as_str();
        Ok(html! {
            img class=[style.filter(|s| !s.is_empty())] src=(url)
                title=(image.caption("title", lang)) alt=(image.caption("alt", lang))
                width=(width) height=(height);
        }
        .into_string())
    }

    /// Number of distinct thumbnails produced.
    pub fn count(&self) -> usize {
        self.done.lock().map(|d| d.len()).unwrap_or_else(|e| e.into_inner().len())
    }
}
