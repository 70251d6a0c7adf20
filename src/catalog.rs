//! Index of the static-assets tree.
//!
//! The static root is copied verbatim to `<output>/static`; this module only
//! records what templates can reach in it. Each of the `css/`, `js/`, `img/`
//! and `icon/` subdirectories becomes one name → file mapping, exposed to
//! templates as `css`, `js`, `img` and `icon`:
//!
//! ```text
//! static/css/Main-Style.css   →  css.main_style  →  static/css/Main-Style.css
//! static/js/jquery.min.js     →  js.jquery_min   →  static/js/jquery.min.js
//! static/img/logos/acme.png   →  img.acme        →  static/img/logos/acme.png
//! ```
//!
//! Names are the file stem run through [`naming::normalize`]. When two files
//! in one section normalize to the same name the later one (in sorted path
//! order) wins and a [`BuildWarning::NameCollision`] is recorded.

use crate::asset::StaticFile;
use crate::naming::{self, AssetKind, FileClass};
use crate::types::BuildWarning;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// The indexed subdirectories, in template-name order.
pub const SECTIONS: [&str; 4] = ["css", "js", "img", "icon"];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot scan {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Name → file mappings of one static root.
#[derive(Debug, Clone, Default)]
pub struct PathCatalog {
    sections: BTreeMap<String, BTreeMap<String, StaticFile>>,
    pub warnings: Vec<BuildWarning>,
}

impl PathCatalog {
    /// Index the sections of `static_root`. Missing sections are empty.
    pub fn scan(static_root: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for section in SECTIONS {
            let dir = static_root.join(section);
            let mut entries = BTreeMap::new();
            if dir.is_dir() {
                for entry in WalkDir::new(&dir).sort_by_file_name() {
                    let entry = entry.map_err(|source| CatalogError::Walk {
                        path: dir.clone(),
                        source,
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let filename = entry.file_name().to_string_lossy().to_string();
                    let kind = match naming::classify(&filename) {
                        FileClass::Forbidden => continue,
                        FileClass::Asset { kind, .. } => kind,
                        FileClass::Content | FileClass::Unknown => AssetKind::Other,
                    };
                    let rel = entry
                        .path()
                        .strip_prefix(static_root)
                        .unwrap_or(entry.path())
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    let name = naming::normalize(&naming::stem(&filename));
                    let file = StaticFile::new(kind, filename, format!("static/{rel}"));
                    if let Some(previous) = entries.insert(name.clone(), file) {
                        let warning = BuildWarning::NameCollision {
                            name: format!("{section}.{name}"),
                            path: rel,
                        };
                        warn!(replaced = %previous.root_url, "{warning}");
                        catalog.warnings.push(warning);
                    }
                }
            }
            catalog.sections.insert(section.to_string(), entries);
        }
        Ok(catalog)
    }

    /// One section's mapping (`css`, `js`, `img`, `icon`).
    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, StaticFile>> {
        self.sections.get(section)
    }

    /// Build-root-relative URL of one entry.
    pub fn url(&self, section: &str, name: &str) -> Option<&str> {
        self.section(section)?
            .get(name)
            .map(|f| f.root_url.as_str())
    }

    /// Total number of indexed files.
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
