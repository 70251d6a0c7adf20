//! `sitemap.xml` listing every rendered page.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.org/en/home/index.html</loc>
//!     <lastmod>2026-10-19</lastmod>
//!   </url>
//! </urlset>
//! ```
//!
//! Every entry carries the build date as `lastmod`.

use crate::types::PageRecord;
use std::fs;
use std::path::Path;

/// Name of the sitemap below the build root.
pub const SITEMAP_FILE: &str = "sitemap.xml";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Today's date as sitemaps expect it (`YYYY-MM-DD`, local time).
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub struct Sitemap {
    urls: Vec<UrlEntry>,
}

struct UrlEntry {
    loc: String,
    lastmod: String,
}

impl Sitemap {
    /// One entry per page, in the given order. `base_url` has no trailing
    /// slash.
    pub fn from_pages(base_url: &str, pages: &[PageRecord], lastmod: &str) -> Self {
        let urls = pages
            .iter()
            .map(|page| UrlEntry {
                loc: format!("{base_url}/{}", page.path),
                lastmod: lastmod.to_string(),
            })
            .collect();
        Self { urls }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_xml(self) -> String {
        let mut xml = String::with_capacity(128 + self.urls.len() * 96);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
        xml.push('\n');
        for entry in self.urls {
            xml.push_str("  <url>\n");
            xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&entry.loc)));
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", entry.lastmod));
            xml.push_str("  </url>\n");
        }
        xml.push_str("</urlset>\n");
        xml
    }

    /// Write `sitemap.xml` into `output`.
    pub fn write(self, output: &Path) -> std::io::Result<()> {
        fs::create_dir_all(output)?;
        fs::write(output.join(SITEMAP_FILE), self.into_xml())
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
