//! CLI output formatting for the build.
//!
//! # Information-First Display
//!
//! Pages are listed by their identity (language, id, title) with the output
//! path as secondary context after `→`.
//! Every language is discovered before any page renders, so the per-language
//! counts come first and page lines follow in the order they are written. Paths of skipped work show up only
//! in the warnings block.
//!
//! # Output Format
//!
//! ```text
//! Static: 12 files
//! en: 3 pages
//! fr: 2 pages
//!     home Home → en/home/index.html
//!     about About → en/about/index.html
//!     team (untitled) → en/about/team/index.html
//!     home Accueil → fr/home/index.html
//!     about À propos → fr/about/index.html
//! Sitemap: 5 URLs
//!
//! Warnings
//!     missing 'fr' translation for page 'team'
//!
//! Generated 5 pages (en 3, fr 2), 4 images, 2 thumbnails
//! Site written to build
//! ```
//!
//! # Architecture
//!
//! Each `format_*` function returns `Vec<String>` and does no I/O; the
//! `print_*` wrappers write those lines to stdout.

use crate::generate::{BuildEvent, BuildReport};
use crate::types::PageRecord;
use std::collections::BTreeMap;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `home Home → en/home/index.html`; untitled pages say so.
fn page_line(record: &PageRecord) -> String {
    let title = match record.title.as_deref() {
        Some(t) if !t.trim().is_empty() => t,
        _ => "(untitled)",
    };
    format!("{} {} \u{2192} {}", record.key, title, record.path)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Lines for one progress event.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::StaticCopied { files } => {
            vec![format!("Static: {}", plural(*files, "file", "files"))]
        }
        BuildEvent::LanguageDiscovered { language, pages } => {
            vec![format!("{language}: {}", plural(*pages, "page", "pages"))]
        }
        BuildEvent::PageWritten(record) => vec![format!("{}{}", indent(1), page_line(record))],
        BuildEvent::SitemapWritten { urls } => {
            vec![format!("Sitemap: {}", plural(*urls, "URL", "URLs"))]
        }
    }
}

/// Closing summary: warnings, then totals.
pub fn format_build_summary(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings".to_string());
        for warning in &report.warnings {
            lines.push(format!("{}{}", indent(1), warning));
        }
    }

    let mut per_language: BTreeMap<&str, usize> = BTreeMap::new();
    for page in &report.pages {
        *per_language.entry(page.language.as_str()).or_default() += 1;
    }
    let breakdown = per_language
        .iter()
        .map(|(lang, n)| format!("{lang} {n}"))
        .collect::<Vec<_>>()
        .join(", ");

    lines.push(String::new());
    let pages = plural(report.pages.len(), "page", "pages");
    let pages = if breakdown.is_empty() {
        pages
    } else {
        format!("{pages} ({breakdown})")
    };
    lines.push(format!(
        "Generated {pages}, {}, {}",
        plural(report.images, "image", "images"),
        plural(report.thumbnails, "thumbnail", "thumbnails"),
    ));
    lines.push(format!("Site written to {}", report.output.display()));
    lines
}

/// Print one progress event to stdout.
pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

/// Print the build summary to stdout.
pub fn print_build_summary(report: &BuildReport) {
    for line in format_build_summary(report) {
        println!("{}", line);
    }
}
