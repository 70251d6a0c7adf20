//! Translated image captions from `catalog.<lang>` side-files.
//!
//! Each content directory may hold one catalog per language next to its
//! images. Two line formats are accepted and may be mixed:
//!
//! ## CSV form
//!
//! ```text
//! sunset:Sunset,A red sky over the bay,Taken from the pier;, at dusk
//! ```
//!
//! `name:title,alt,description`. A `;` escapes the next character, so
//! `;,` is a literal comma and `;;` a literal semicolon. Fields past the
//! third are folded back into the description.
//!
//! ## Per-field form
//!
//! ```text
//! sunset.title:Sunset
//! sunset.gallery:summer
//! ```
//!
//! `name.key:value` sets one field, including the one the CSV form has no
//! column for (`gallery`). A line is per-field only when the text after its
//! last dot is one of [`FIELDS`]; `my.photo:Title,Alt,Desc` is CSV for the
//! image `my.photo`.
//!
//! Image names are the filename without its final extension, lowercased.
//! A missing catalog is not an error: the images simply have no captions in
//! that language.

use crate::content::ContentError;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Fields of the CSV form, in column order.
pub const CSV_FIELDS: [&str; 3] = ["title", "alt", "description"];

/// Fields the per-field form may set.
pub const FIELDS: [&str; 4] = ["title", "alt", "description", "gallery"];

/// Field → value for one image in one language.
pub type Captions = BTreeMap<String, String>;

/// One parsed `catalog.<lang>` file: image name → captions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, Captions>,
}

impl Catalog {
    /// Parse catalog text. Lines without a `:` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut catalog = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((left, right)) = line.split_once(':') else {
                debug!(line, "skipping catalog line without ':'");
                continue;
            };
            let left = left.trim();
            match left.rsplit_once('.') {
                Some((name, key))
                    if !name.is_empty() && FIELDS.contains(&key.trim().to_lowercase().as_str()) =>
                {
                    catalog.set(name, key, right.trim());
                }
                _ => catalog.set_csv(left, right),
            }
        }
        catalog
    }

    fn set(&mut self, name: &str, key: &str, value: &str) {
        self.entries
            .entry(name.to_lowercase())
            .or_default()
            .insert(key.trim().to_lowercase(), value.to_string());
    }

    fn set_csv(&mut self, name: &str, csv: &str) {
        let mut fields = split_escaped(csv);
        if fields.len() > CSV_FIELDS.len() {
            let description = fields.split_off(CSV_FIELDS.len() - 1).join(",");
            fields.push(description);
        }
        for (key, value) in CSV_FIELDS.iter().zip(fields) {
            self.set(name, key, value.trim());
        }
    }

    /// Read `catalog.<lang>` from `dir`. A missing file yields an empty catalog.
    pub fn read(dir: &Path, lang: &str) -> Result<Self, ContentError> {
        let path = dir.join(format!("catalog.{lang}"));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ContentError::Read { path, source }),
        };
        let text = String::from_utf8(bytes).map_err(|_| ContentError::Encoding(path))?;
        Ok(Self::parse(&text))
    }

    /// Captions of one image, by image name.
    pub fn get(&self, name: &str) -> Option<&Captions> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalogs of one directory, by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryCatalogs {
    by_language: BTreeMap<String, Catalog>,
}

impl DirectoryCatalogs {
    /// Read the catalog of every language from `dir`.
    pub fn read(dir: &Path, languages: &[String]) -> Result<Self, ContentError> {
        let mut by_language = BTreeMap::new();
        for lang in languages {
            let catalog = Catalog::read(dir, lang)?;
            if !catalog.is_empty() {
                by_language.insert(lang.clone(), catalog);
            }
        }
        Ok(Self { by_language })
    }

    /// Per-language captions of one image.
    pub fn captions_for(&self, name: &str) -> BTreeMap<String, Captions> {
        self.by_language
            .iter()
            .filter_map(|(lang, catalog)| catalog.get(name).map(|c| (lang.clone(), c.clone())))
            .collect()
    }
}

/// Split on `,`; `;` escapes the following character.
fn split_escaped(text: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            ';' => {
                if let (Some(escaped), Some(field)) = (chars.next(), fields.last_mut()) {
                    field.push(escaped);
                }
            }
            ',' => fields.push(String::new()),
            _ => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}
