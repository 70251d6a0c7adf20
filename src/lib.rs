//! # Polysite
//!
//! A static site builder for multilingual sites. Each language has its own
//! content tree of directories and Markdown files; pages are rendered through
//! user templates into a relocatable output tree where every link is relative.
//!
//! # Architecture: One Build, Five Steps
//!
//! ```text
//! 1. Config     site.toml            →  ProjectConfig, template environment
//! 2. Static     resources/static/    →  build/static/ + PathCatalog
//! 3. Discover   resources/<lang>/    →  ContentTree, menu tree, PageSet
//! 4. Render     template + context   →  pass 1 → pass 2 → build/<lang>/…/index.html
//! 5. Sitemap    rendered pages       →  build/sitemap.xml
//! ```
//!
//! Discovery of a language finishes before any of its pages render; pages
//! then render in parallel. Nothing is cached between builds: each run
//! rebuilds the whole output tree.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`generate`] | Orchestrates the build and writes output |
//! | [`tree`] | Per-language content tree: discovery, id ordering, URLs, page sets |
//! | [`content`] | Content files: `key: value` header + Markdown body |
//! | [`asset`] | Images, attached files, galleries and thumbnails |
//! | [`metadata`] | `catalog.<lang>` caption side-files |
//! | [`catalog`] | Name → URL index of the static tree |
//! | [`render`] | Template environment, filters and the views templates see |
//! | [`sitemap`] | `sitemap.xml` |
//! | [`config`] | `site.toml` loading and validation |
//! | [`naming`] | Name normalization and file classification |
//! | [`types`] | Shared types (`Language`, `RenderPage`, `BuildWarning`) |
//! | [`imaging`] | Pure-Rust image decoding, re-encoding and thumbnails |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Relative URLs From the Rendering Page
//!
//! Every URL is computed against the page being rendered, passed explicitly
//! as a [`types::RenderPage`]. A link to `about/team` printed on `en/home`
//! reads `../about/team/index.html`; the same link on `en/about/team` reads
//! `../../about/team/index.html`. The output tree can be served from any
//! path or opened from disk.
//!
//! ## Two Render Passes
//!
//! Markdown is converted to HTML before templates run, so directives written
//! inside content (a thumbnail, a link to another page) are still template
//! source after pass 1. Pass 2 renders pass 1's output again with the same
//! context. For pages without embedded directives the passes agree.
//!
//! ## Visible Empty Slots
//!
//! A template that prints something undefined gets
//! `SLOT EMPTY - PLEASE FILL IN` in the page and a warning in the build
//! report, never a silent blank.
//!
//! ## Header Values Are Data
//!
//! `!` and `#` header values are evaluated by a small literal parser
//! (numbers, booleans, quoted strings, arithmetic); content files never run
//! code.

pub mod asset;
pub mod catalog;
pub mod config;
pub mod content;
pub mod generate;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod render;
pub mod sitemap;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
