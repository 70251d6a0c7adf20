//! Shared types used across discovery, rendering, and reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured site language: `("en", "English")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Language {
    /// Short code used for directories and lookups (`en`, `fr`).
    pub code: String,
    /// Display name shown to visitors (`Français`).
    pub name: String,
}

impl Language {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// The page currently being rendered.
///
/// Every URL the builder emits is relative, so it depends on the depth of the
/// page that will contain it. This value is threaded explicitly through every
/// URL-resolution call instead of living in shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPage {
    /// Depth of the page below its language root (`en/home` → 1).
    pub level: usize,
    /// Language code of the page.
    pub language: String,
}

impl RenderPage {
    pub fn new(level: usize, language: impl Into<String>) -> Self {
        Self {
            level,
            language: language.into(),
        }
    }

    /// Prefix reaching the language root (`build/<lang>/`) from this page.
    pub fn to_language_root(&self) -> String {
        "../".repeat(self.level)
    }

    /// Prefix reaching the build root (`build/`) from this page.
    ///
    /// Pages live at `build/<lang>/<path>/index.html`, one level deeper than
    /// their nesting level because of the language directory.
    pub fn to_build_root(&self) -> String {
        "../".repeat(self.level + 1)
    }
}

/// One rendered output page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub language: String,
    /// Identifier in the language's page set.
    pub key: String,
    pub title: Option<String>,
    /// Output file below the build root, `/`-separated.
    pub path: String,
}

/// A recoverable problem found during a build.
///
/// Each warning is logged when it happens and collected into the build
/// report; none of them stops the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// A page has no counterpart with the same identifier in another language.
    MissingTranslation { page: String, language: String },
    /// A page's template was not declared or not found; the default was used.
    MissingTemplate { page: String, template: String },
    /// A rendered page printed undefined values as the empty-slot sentinel.
    UndefinedPlaceholder { page: String, count: usize },
    /// A page child without an `id`, sorted last.
    MissingId { path: String },
    /// Two pages of one language share an identifier; the later one wins.
    DuplicateId { id: String, language: String },
    /// Two files normalized to the same name; the later one wins.
    NameCollision { name: String, path: String },
    /// A page failed to render and was skipped.
    PageRenderFailed { page: String, reason: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::MissingTranslation { page, language } => {
                write!(f, "missing '{language}' translation for page '{page}'")
            }
            BuildWarning::MissingTemplate { page, template } => {
                write!(f, "page '{page}' uses default template '{template}'")
            }
            BuildWarning::UndefinedPlaceholder { page, count } => {
                write!(f, "page '{page}' has {count} empty slot(s)")
            }
            BuildWarning::MissingId { path } => write!(f, "item without id: {path}"),
            BuildWarning::DuplicateId { id, language } => {
                write!(f, "duplicate page id '{id}' in '{language}'")
            }
            BuildWarning::NameCollision { name, path } => {
                write!(f, "name '{name}' collides, {path} wins")
            }
            BuildWarning::PageRenderFailed { page, reason } => {
                write!(f, "page '{page}' skipped: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_page_prefixes_follow_level() {
        let root_child = RenderPage::new(1, "en");
        assert_eq!(root_child.to_language_root(), "../");
        assert_eq!(root_child.to_build_root(), "../../");

        let deep = RenderPage::new(3, "fr");
        assert_eq!(deep.to_language_root().matches("../").count(), 3);
        assert_eq!(deep.to_build_root().matches("../").count(), 4);
    }

    #[test]
    fn warnings_display_name_the_page() {
        let w = BuildWarning::MissingTranslation {
            page: "about".into(),
            language: "fr".into(),
        };
        assert!(w.to_string().contains("about"));
        assert!(w.to_string().contains("fr"));
    }
}
