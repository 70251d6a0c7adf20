//! Project configuration module.
//!
//! Handles loading and validating `site.toml` from the project root. Unlike
//! content files, the configuration is mandatory: a project without a
//! readable `site.toml` fails before anything is written.
//!
//! ## Configuration Options
//!
//! ```toml
//! domain = "https://example.com"   # Base URL for sitemap entries
//! default_template = "main"        # Used when a page declares none
//!
//! [[languages]]                    # Ordered; the first is the primary language
//! code = "en"
//! name = "English"
//!
//! [[languages]]
//! code = "fr"
//! name = "Français"
//!
//! [i18n.en]                        # Per-language string table exposed as `i18n`
//! read_more = "Read more"
//!
//! [paths]                          # Relative to the project directory
//! content = "resources"
//! static = "resources/static"
//! templates = "templates"
//! output = "build"
//!
//! [services]                       # Feeds the built-in snippets (optional)
//! analytics_id = "UA-000000-1"
//!
//! [services.map]
//! lat = 41.65
//! lon = -0.88
//! zoom = 14
//! title = "Our office"
//!
//! [processing]
//! max_processes = 4                # Rendering threads (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file in the project root.
pub const CONFIG_FILE: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `site.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Site domain used for absolute sitemap URLs.
    pub domain: String,
    /// Template name (without `.html`) for pages that declare none.
    #[serde(default = "default_template")]
    pub default_template: String,
    /// Ordered list of site languages.
    pub languages: Vec<Language>,
    /// Translated strings keyed by language code.
    #[serde(default)]
    pub i18n: BTreeMap<String, BTreeMap<String, String>>,
    /// Project directory layout.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Third-party snippet settings.
    #[serde(default)]
    pub services: ServicesConfig,
    /// Parallel rendering settings.
    #[serde(default)]
    pub processing: ProcessingConfig,
}

fn default_template() -> String {
    "main".to_string()
}

impl ProjectConfig {
    /// Validate values that TOML typing cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Validation("domain must not be empty".into()));
        }
        if self.default_template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_template must not be empty".into(),
            ));
        }
        if self.languages.is_empty() {
            return Err(ConfigError::Validation(
                "at least one language must be configured".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for lang in &self.languages {
            if lang.code.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "language codes must not be empty".into(),
                ));
            }
            if !seen.insert(lang.code.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "language '{}' is configured twice",
                    lang.code
                )));
            }
        }
        Ok(())
    }

    /// Domain as an absolute base URL without a trailing slash.
    ///
    /// A scheme-less domain (`example.com`) is served over `https://`.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }

    /// Language codes in configured order.
    pub fn language_codes(&self) -> Vec<&str> {
        self.languages.iter().map(|l| l.code.as_str()).collect()
    }

    /// The i18n table for one language; empty when none is configured.
    pub fn strings_for(&self, code: &str) -> BTreeMap<String, String> {
        self.i18n.get(code).cloned().unwrap_or_default()
    }
}

/// Project directory layout, relative to the project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Holds one content root per language code.
    pub content: String,
    /// Static assets copied verbatim to `<output>/static`.
    #[serde(rename = "static")]
    pub static_dir: String,
    /// Template directory.
    pub templates: String,
    /// Build output directory.
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: "resources".to_string(),
            static_dir: "resources/static".to_string(),
            templates: "templates".to_string(),
            output: "build".to_string(),
        }
    }
}

/// Absolute project paths resolved from [`PathsConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub project: PathBuf,
    pub content: PathBuf,
    pub static_dir: PathBuf,
    pub templates: PathBuf,
    pub output: PathBuf,
}

impl ProjectPaths {
    pub fn resolve(project: &Path, paths: &PathsConfig) -> Self {
        Self {
            project: project.to_path_buf(),
            content: project.join(&paths.content),
            static_dir: project.join(&paths.static_dir),
            templates: project.join(&paths.templates),
            output: project.join(&paths.output),
        }
    }

    /// Content root of one language.
    pub fn language_root(&self, code: &str) -> PathBuf {
        self.content.join(code)
    }

    /// Where the static tree is mirrored.
    pub fn output_static(&self) -> PathBuf {
        self.output.join("static")
    }
}

/// Settings for the built-in third-party snippets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesConfig {
    /// Analytics account id; enables `builtins.google_analytics`.
    pub analytics_id: Option<String>,
    /// Map settings; enable `builtins.google_maps`.
    pub map: Option<MapConfig>,
}

/// A single map marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapConfig {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_map_zoom")]
    pub zoom: u32,
    #[serde(default)]
    pub title: String,
}

fn default_map_zoom() -> u32 {
    14
}

/// Parallel rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of rendering threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least one
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Parse and validate configuration text. `path` only labels errors.
pub fn parse_config(content: &str, path: &Path) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = toml::from_str(content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load `site.toml` from the project directory.
pub fn load_config(project: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = project.join(CONFIG_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_config(&content, &path)
}

/// Returns a fully-commented stock `site.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Polysite Configuration
# ======================
# Values shown below are the defaults where one exists.
# Unknown keys will cause an error.

# Base URL used for absolute links in sitemap.xml.
domain = "https://example.com"

# Template (templates/<name>.html) for pages that declare no `template:`.
default_template = "main"

# ---------------------------------------------------------------------------
# Languages, in order. Each code needs a content root: resources/<code>/
# ---------------------------------------------------------------------------
[[languages]]
code = "en"
name = "English"

[[languages]]
code = "fr"
name = "Français"

# ---------------------------------------------------------------------------
# Translated interface strings, exposed to templates as `i18n`.
# ---------------------------------------------------------------------------
[i18n.en]
read_more = "Read more"

[i18n.fr]
read_more = "Lire la suite"

# ---------------------------------------------------------------------------
# Directory layout, relative to the project directory.
# ---------------------------------------------------------------------------
[paths]
content = "resources"
static = "resources/static"
templates = "templates"
output = "build"

# ---------------------------------------------------------------------------
# Built-in snippets (builtins.google_analytics, builtins.google_maps).
# Leave out to disable.
# ---------------------------------------------------------------------------
[services]
# analytics_id = "UA-000000-1"

# [services.map]
# lat = 41.65
# lon = -0.88
# zoom = 14
# title = "Our office"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel rendering threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
