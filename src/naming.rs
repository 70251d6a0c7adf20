//! Centralized filename handling: name normalization and asset classification.
//!
//! Every file the builder touches is addressed by a *normalized name* so that
//! templates can reach it as a plain attribute. Spaces, dashes and dots become
//! underscores and the name is lowercased:
//!
//! - `Main-Style.css` → stem `Main-Style` → `main_style`
//! - `jquery.min.js` → stem `jquery.min` → `jquery_min`
//! - `Contact Us` (directory) → `contact_us`
//!
//! Files are classified by extension into an [`AssetKind`]. Dotfiles and
//! `catalog.*` side-files are forbidden: they are never attached to the tree
//! and never classified.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Classification of a file by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Icon,
    Javascript,
    Style,
    Media,
    Document,
    Archive,
    Installer,
    Other,
}

const KIND_EXTENSIONS: &[(AssetKind, &[&str])] = &[
    (AssetKind::Image, &["jpg", "jpeg", "png", "gif"]),
    (AssetKind::Icon, &["ico"]),
    (AssetKind::Javascript, &["js"]),
    (AssetKind::Style, &["css"]),
    (AssetKind::Media, &["mp3", "mp4", "ogg", "ogv"]),
    (AssetKind::Document, &["pdf", "doc", "xls", "odt", "ods", "csv"]),
    (AssetKind::Archive, &["zip", "rar", "gz", "tgz", "bz"]),
    (AssetKind::Installer, &["deb", "rpm", "apk", "dmg", "exe", "msi"]),
    (AssetKind::Other, &["xcf", "svg"]),
];

/// Extensions of text files parsed as content boxes instead of attached as assets.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// The file whose presence turns a directory into a page.
pub const PAGE_DESCRIPTOR: &str = "page.md";

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Icon => "icon",
            AssetKind::Javascript => "javascript",
            AssetKind::Style => "style",
            AssetKind::Media => "media",
            AssetKind::Document => "document",
            AssetKind::Archive => "archive",
            AssetKind::Installer => "installer",
            AssetKind::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileClass {
    /// Dotfiles and `catalog.*` side-files.
    Forbidden,
    /// Markdown/text content read as a [`ContentBox`](crate::content::ContentBox).
    Content,
    /// A known asset type, with the filename stem (final extension stripped).
    Asset { kind: AssetKind, stem: String },
    /// Unknown extension; ignored by discovery.
    Unknown,
}

/// True for names that must never be attached or classified.
pub fn is_forbidden(filename: &str) -> bool {
    filename.starts_with('.') || filename.starts_with("catalog.")
}

/// Lowercased final extension, if any.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// Filename with only its final extension stripped (`a.min.js` → `a.min`).
pub fn stem(filename: &str) -> String {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => filename[..pos].to_string(),
        _ => filename.to_string(),
    }
}

/// Classify a filename by extension.
pub fn classify(filename: &str) -> FileClass {
    if is_forbidden(filename) {
        return FileClass::Forbidden;
    }
    let Some(ext) = extension(filename) else {
        return FileClass::Unknown;
    };
    if CONTENT_EXTENSIONS.contains(&ext.as_str()) {
        return FileClass::Content;
    }
    KIND_EXTENSIONS
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(kind, _)| FileClass::Asset {
            kind: *kind,
            stem: stem(filename),
        })
        .unwrap_or(FileClass::Unknown)
}

/// Convert a name with spaces, dashes or dots into a lowercase identifier.
pub fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect()
}

/// Key under which a content file is exposed to templates: the part of the
/// filename before its first dot (`intro.fr.md` → `intro`).
pub fn content_key(filename: &str) -> String {
    filename.split('.').next().unwrap_or(filename).to_string()
}
