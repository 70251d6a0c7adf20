//! Site build: discovery, two-pass rendering, output.
//!
//! ## Steps
//!
//! Each step finishes before the next begins:
//!
//! 1. Load `site.toml`, set up the template environment and the built-in
//!    snippets.
//! 2. Replace `build/static` with a copy of the static tree and index it.
//! 3. Per language: discover the page tree (publishing images, copying
//!    attachments), discover the menu tree, flatten pages by id.
//! 4. Per language, pages in parallel: resolve counterparts in every
//!    language, pick the template, read sibling content boxes, render both
//!    passes, write `build/<lang>/<path>/index.html`.
//! 5. Write `build/sitemap.xml`.
//!
//! ## Output Structure
//!
//! ```text
//! build/
//! ├── sitemap.xml
//! ├── static/                    # copy of resources/static
//! │   └── img/                   # published content images
//! │       └── thumbnail/         # generated by the `thumbnail` filter
//! ├── en/
//! │   └── home/
//! │       ├── index.html
//! │       └── brochure.pdf       # attachment copied during discovery
//! └── fr/
//!     └── home/index.html
//! ```
//!
//! ## Failures
//!
//! Configuration, encoding and image errors abort the build with a
//! [`BuildError`]. Everything else is a [`BuildWarning`]: logged when it
//! happens and returned in the [`BuildReport`].

use crate::asset::{AssetError, AssetSink, Thumbnails};
use crate::catalog::{CatalogError, PathCatalog};
use crate::config::{self, ConfigError, ProjectConfig, ProjectPaths};
use crate::content::{ContentBox, ContentError};
use crate::imaging::{ImageBackend, RustBackend};
use crate::naming::{self, FileClass};
use crate::render::{self, PageInputs, Renderer, SLOT_EMPTY, Site};
use crate::sitemap::{self, Sitemap};
use crate::tree::{ContentTree, NodeId, PageSet, TreeError};
use crate::types::{BuildWarning, PageRecord};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, info_span, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("cannot copy static tree to {path}: {source}")]
    Static {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("page '{page}': {reason}")]
    Render { page: String, reason: String },
    #[error("built-in snippets: {0}")]
    Builtins(minijinja::Error),
    #[error("cannot start rendering threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Progress notifications, sent as the build advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StaticCopied { files: usize },
    LanguageDiscovered { language: String, pages: usize },
    PageWritten(PageRecord),
    SitemapWritten { urls: usize },
}

/// What a finished build produced.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub output: PathBuf,
    pub pages: Vec<PageRecord>,
    pub images: usize,
    pub thumbnails: usize,
    pub static_files: usize,
    pub warnings: Vec<BuildWarning>,
}

impl BuildReport {
    pub fn pages_in(&self, language: &str) -> usize {
        self.pages.iter().filter(|p| p.language == language).count()
    }
}

/// Build the project at `project` with the `image` crate backend.
pub fn build(project: &Path, events: Option<Sender<BuildEvent>>) -> Result<BuildReport, BuildError> {
    build_with_backend(project, Arc::new(RustBackend::new()), events)
}

/// Build with a caller-chosen image backend.
pub fn build_with_backend(
    project: &Path,
    backend: Arc<dyn ImageBackend>,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildReport, BuildError> {
    let config = config::load_config(project)?;
    let paths = ProjectPaths::resolve(project, &config.paths);
    let emit = |event: BuildEvent| {
        if let Some(tx) = &events {
            let _ = tx.send(event);
        }
    };
    let mut report = BuildReport {
        output: paths.output.clone(),
        ..Default::default()
    };

    // Environment
    let thumbnails = Arc::new(Thumbnails::new(Arc::clone(&backend), &paths.output));
    let renderer = Renderer::new(&paths.templates, Arc::clone(&thumbnails));
    let builtins = render::builtins(&config.services).map_err(BuildError::Builtins)?;

    // Static tree
    report.static_files = copy_static(&paths.static_dir, &paths.output_static())?;
    emit(BuildEvent::StaticCopied {
        files: report.static_files,
    });
    let catalog = PathCatalog::scan(&paths.static_dir)?;
    report.warnings.extend(catalog.warnings.iter().cloned());

    // Discovery
    let codes: Vec<String> = config.languages.iter().map(|l| l.code.clone()).collect();
    let mut sink = AssetSink::new(backend.as_ref(), &paths.output, codes.clone());
    let mut trees = BTreeMap::new();
    let mut menus = BTreeMap::new();
    let mut page_sets = BTreeMap::new();
    for code in &codes {
        let _span = info_span!("discover", lang = %code).entered();
        let root = paths.language_root(code);
        let tree = ContentTree::discover(&root, code, &mut sink)?;
        let menu = ContentTree::discover_menu(&root, code)?;
        let pages = tree.flatten();
        info!(pages = pages.len(), nodes = tree.len(), "discovered");
        report.warnings.extend(tree.warnings.iter().cloned());
        report.warnings.extend(pages.warnings.iter().cloned());
        emit(BuildEvent::LanguageDiscovered {
            language: code.clone(),
            pages: pages.len(),
        });
        trees.insert(code.clone(), Arc::new(tree));
        menus.insert(code.clone(), Arc::new(menu));
        page_sets.insert(code.clone(), pages);
    }
    report.images = sink.image_count();
    report.warnings.append(&mut sink.warnings);

    let site = Site {
        languages: config.languages.clone(),
        trees,
        menus,
        galleries: sink.galleries,
        catalog: Arc::new(catalog),
        i18n: codes
            .iter()
            .map(|c| (c.clone(), config.strings_for(c)))
            .collect(),
        builtins,
    };
    let job = RenderJob {
        config: &config,
        paths: &paths,
        site: &site,
        page_sets: &page_sets,
        renderer: &renderer,
    };

    // Rendering
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_threads(&config.processing))
        .build()?;
    for code in &codes {
        let Some(pages) = page_sets.get(code) else {
            continue;
        };
        let items: Vec<(&str, NodeId)> = pages.iter().collect();
        let outcomes: Vec<Result<PageOutcome, BuildError>> = pool.install(|| {
            items
                .par_iter()
                .map(|(key, id)| job.render(code, key, *id))
                .collect()
        });
        for outcome in outcomes {
            let outcome = outcome?;
            report.warnings.extend(outcome.warnings);
            if let Some(record) = outcome.record {
                emit(BuildEvent::PageWritten(record.clone()));
                report.pages.push(record);
            }
        }
    }
    report.thumbnails = thumbnails.count();

    // Sitemap
    let sitemap = Sitemap::from_pages(&config.base_url(), &report.pages, &sitemap::today());
    let urls = sitemap.len();
    sitemap.write(&paths.output).map_err(|source| BuildError::Write {
        path: paths.output.join(sitemap::SITEMAP_FILE),
        source,
    })?;
    emit(BuildEvent::SitemapWritten { urls });

    Ok(report)
}

/// Mirror `source` into `target`, removing whatever `target` held.
///
/// A missing static tree leaves an empty `target`.
fn copy_static(source: &Path, target: &Path) -> Result<usize, BuildError> {
    let static_err = |source| BuildError::Static {
        path: target.to_path_buf(),
        source,
    };
    if target.exists() {
        fs::remove_dir_all(target).map_err(static_err)?;
    }
    fs::create_dir_all(target).map_err(static_err)?;
    if !source.is_dir() {
        warn!(path = %source.display(), "static directory doesn't exist");
        return Ok(0);
    }

    let mut files = 0;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| static_err(e.into()))?;
        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(static_err)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(static_err)?;
            files += 1;
        }
    }
    Ok(files)
}

/// Content files next to a page, keyed by [`naming::content_key`].
///
/// Dotfiles and `catalog.*` never count. When two files share a key the
/// later one in name order wins.
pub fn sibling_boxes(dir: &Path) -> Result<BTreeMap<String, ContentBox>, BuildError> {
    let read_err = |source| ContentError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
        .map_err(read_err)?;
    entries.sort_by_key(|e| e.file_name());

    let mut boxes = BTreeMap::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.path().is_file() || naming::classify(&name) != FileClass::Content {
            continue;
        }
        boxes.insert(naming::content_key(&name), ContentBox::load(&entry.path())?);
    }
    Ok(boxes)
}

/// Shared, read-only state of the render step.
struct RenderJob<'a> {
    config: &'a ProjectConfig,
    paths: &'a ProjectPaths,
    site: &'a Site,
    page_sets: &'a BTreeMap<String, PageSet>,
    renderer: &'a Renderer,
}

/// Result of one page: its record unless it was skipped, and its warnings.
struct PageOutcome {
    record: Option<PageRecord>,
    warnings: Vec<BuildWarning>,
}

fn note(warnings: &mut Vec<BuildWarning>, warning: BuildWarning) {
    warn!("{warning}");
    warnings.push(warning);
}

impl RenderJob<'_> {
    fn render(&self, lang: &str, key: &str, id: NodeId) -> Result<PageOutcome, BuildError> {
        let _span = info_span!("page", lang = %lang, id = %key).entered();
        let mut warnings = Vec::new();
        let Some(tree) = self.site.trees.get(lang) else {
            return Ok(PageOutcome {
                record: None,
                warnings,
            });
        };
        let node = tree.node(id);

        let mut lang_pages = Vec::new();
        for other in &self.config.languages {
            match self.page_sets.get(&other.code).and_then(|set| set.get(key)) {
                Some(other_id) => lang_pages.push((other.code.clone(), other_id)),
                None => note(
                    &mut warnings,
                    BuildWarning::MissingTranslation {
                        page: key.to_string(),
                        language: other.code.clone(),
                    },
                ),
            }
        }

        let default = self.config.default_template.as_str();
        let template = match node.template() {
            Some(name) if self.renderer.has_template(name) => name,
            declared => {
                if let Some(name) = declared {
                    warn!(template = name, "template not found");
                }
                note(
                    &mut warnings,
                    BuildWarning::MissingTemplate {
                        page: key.to_string(),
                        template: default.to_string(),
                    },
                );
                default
            }
        };

        let ctx = render::page_context(
            self.site,
            PageInputs {
                language: lang,
                node: id,
                lang_pages: &lang_pages,
                boxes: sibling_boxes(&node.root)?,
            },
        );
        let html = match self.renderer.render_page(template, &ctx) {
            Ok(html) => html,
            Err(err) => {
                if let Some(cause) = render::fatal_cause(&err) {
                    return Err(BuildError::Render {
                        page: key.to_string(),
                        reason: cause.to_string(),
                    });
                }
                note(
                    &mut warnings,
                    BuildWarning::PageRenderFailed {
                        page: key.to_string(),
                        reason: err.to_string(),
                    },
                );
                return Ok(PageOutcome {
                    record: None,
                    warnings,
                });
            }
        };

        let count = html.matches(SLOT_EMPTY).count();
        if count > 0 {
            note(
                &mut warnings,
                BuildWarning::UndefinedPlaceholder {
                    page: key.to_string(),
                    count,
                },
            );
        }

        let rel = node.output_path();
        let path = self.paths.output.join(&rel);
        let write_err = |source| BuildError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&path, html).map_err(write_err)?;
        info!(path = %rel.display(), "written");

        Ok(PageOutcome {
            record: Some(PageRecord {
                language: lang.to_string(),
                key: key.to_string(),
                title: node.title().map(str::to_string),
                path: rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            }),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::{read_output, setup_project, write_file, write_page};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn build_mock(project: &Path) -> Result<BuildReport, BuildError> {
        build_with_backend(project, Arc::new(MockBackend::new()), None)
    }

    fn has_warning(report: &BuildReport, pred: impl Fn(&BuildWarning) -> bool) -> bool {
        report.warnings.iter().any(pred)
    }

    // =========================================================================
    // Output layout
    // =========================================================================

    #[test]
    fn pages_land_under_language_and_path() {
        let tmp = setup_project();
        let report = build_mock(tmp.path()).unwrap();

        assert_eq!(report.pages_in("en"), 1);
        assert_eq!(report.pages_in("fr"), 1);
        let en = read_output(tmp.path(), "en/home/index.html");
        let fr = read_output(tmp.path(), "fr/home/index.html");
        assert!(en.contains("<h1>Home</h1>"));
        assert!(en.contains("<em>the site</em>"));
        assert!(fr.contains("<h1>Accueil</h1>"));
        assert!(fr.contains(r#"<html lang="fr">"#));
    }

    #[test]
    fn static_tree_is_replaced() {
        let tmp = setup_project();
        write_file(tmp.path(), "build/static/stale.css", "old");

        let report = build_mock(tmp.path()).unwrap();

        assert_eq!(report.static_files, 1);
        assert!(!tmp.path().join("build/static/stale.css").exists());
        assert_eq!(read_output(tmp.path(), "static/css/main.css"), "body { margin: 0 }\n");
        let en = read_output(tmp.path(), "en/home/index.html");
        assert!(en.contains(r#"<link href="../../static/css/main.css" rel="stylesheet""#));
    }

    #[test]
    fn sitemap_lists_every_page() {
        let tmp = setup_project();
        build_mock(tmp.path()).unwrap();

        let xml = read_output(tmp.path(), "sitemap.xml");
        assert!(xml.contains("<loc>https://example.org/en/home/index.html</loc>"));
        assert!(xml.contains("<loc>https://example.org/fr/home/index.html</loc>"));
        assert!(xml.contains(&format!("<lastmod>{}</lastmod>", sitemap::today())));
    }

    #[test]
    fn nested_pages_link_relative_to_themselves() {
        let tmp = setup_project();
        write_page(tmp.path(), "resources/en/home/news", "id: news\ntitle: News\ntemplate: main\n");
        build_mock(tmp.path()).unwrap();

        let news = read_output(tmp.path(), "en/home/news/index.html");
        assert!(news.contains(r#"<a href="../../home/index.html">Home</a>"#));
        assert!(news.contains(r#"href="../../../static/css/main.css""#));
    }

    // =========================================================================
    // Languages
    // =========================================================================

    #[test]
    fn lang_pages_link_counterparts() {
        let tmp = setup_project();
        build_mock(tmp.path()).unwrap();

        let en = read_output(tmp.path(), "en/home/index.html");
        assert!(en.contains(r#"<a href="../../en/home/index.html">en</a>"#));
        assert!(en.contains(r#"<a href="../../fr/home/index.html">fr</a>"#));
    }

    #[test]
    fn missing_translation_is_omitted_with_warning() {
        let tmp = setup_project();
        write_page(tmp.path(), "resources/en/about", "id: about\ntitle: About\ntemplate: main\n");

        let report = build_mock(tmp.path()).unwrap();

        assert!(has_warning(&report, |w| matches!(
            w,
            BuildWarning::MissingTranslation { page, language } if page == "about" && language == "fr"
        )));
        let about = read_output(tmp.path(), "en/about/index.html");
        assert!(about.contains(">en</a>"));
        assert!(!about.contains(">fr</a>"));
    }

    #[test]
    fn missing_language_root_builds_nothing_for_it() {
        let tmp = setup_project();
        fs::remove_dir_all(tmp.path().join("resources/fr")).unwrap();

        let report = build_mock(tmp.path()).unwrap();
        assert_eq!(report.pages_in("fr"), 0);
        assert_eq!(report.pages_in("en"), 1);
    }

    // =========================================================================
    // Templates and rendering
    // =========================================================================

    #[test]
    fn unknown_template_falls_back_to_default() {
        let tmp = setup_project();
        write_page(tmp.path(), "resources/en/home", "id: home\ntitle: Home\ntemplate: fancy\n");

        let report = build_mock(tmp.path()).unwrap();

        assert!(has_warning(&report, |w| matches!(
            w,
            BuildWarning::MissingTemplate { page, template } if page == "home" && template == "main"
        )));
        assert!(read_output(tmp.path(), "en/home/index.html").contains("<h1>Home</h1>"));
    }

    #[test]
    fn declared_template_is_used() {
        let tmp = setup_project();
        write_file(tmp.path(), "templates/plain.html", "plain:{{ page.title }}");
        write_page(tmp.path(), "resources/en/home", "id: home\ntitle: Home\ntemplate: plain\n");

        build_mock(tmp.path()).unwrap();
        assert_eq!(read_output(tmp.path(), "en/home/index.html"), "plain:Home");
    }

    #[test]
    fn sibling_boxes_and_embedded_directives() {
        let tmp = setup_project();
        write_file(tmp.path(), "templates/main.html", "{{ intro }}|{{ boxes.page.title }}");
        write_file(
            tmp.path(),
            "resources/en/home/intro.md",
            "title: Intro\n\nWelcome to **{{ page.title }}**.",
        );

        build_mock(tmp.path()).unwrap();

        let en = read_output(tmp.path(), "en/home/index.html");
        assert_eq!(en, "<p>Welcome to <strong>Home</strong>.</p>\n|Home");
    }

    #[test]
    fn undefined_values_are_reported() {
        let tmp = setup_project();
        write_file(tmp.path(), "templates/main.html", "{{ sidebar }}");

        let report = build_mock(tmp.path()).unwrap();

        assert_eq!(read_output(tmp.path(), "en/home/index.html"), SLOT_EMPTY);
        assert!(has_warning(&report, |w| matches!(
            w,
            BuildWarning::UndefinedPlaceholder { count: 1, .. }
        )));
    }

    #[test]
    fn template_error_skips_only_that_page() {
        let tmp = setup_project();
        write_file(tmp.path(), "templates/broken.html", "{% if %}");
        write_page(tmp.path(), "resources/fr/home", "id: home\ntitle: Accueil\ntemplate: broken\n");

        let report = build_mock(tmp.path()).unwrap();

        assert_eq!(report.pages_in("en"), 1);
        assert_eq!(report.pages_in("fr"), 0);
        assert!(has_warning(&report, |w| matches!(
            w,
            BuildWarning::PageRenderFailed { page, .. } if page == "home"
        )));
        assert!(!tmp.path().join("build/fr/home/index.html").exists());
    }

    // =========================================================================
    // Images
    // =========================================================================

    #[test]
    fn thumbnails_generated_once_per_source() {
        let tmp = setup_project();
        write_file(
            tmp.path(),
            "templates/main.html",
            "{{ page.dawn|thumbnail(40, 30) }}{{ page.dawn|thumbnail(40, 30) }}",
        );
        write_file(tmp.path(), "resources/en/home/dawn.jpg", "fake");
        write_file(tmp.path(), "resources/fr/home/dawn.jpg", "fake");
        let backend = Arc::new(MockBackend::new());

        let report = build_with_backend(tmp.path(), backend.clone(), None).unwrap();

        // same flat name from two languages: published under one name,
        // thumbnailed once per source
        assert_eq!(report.images, 1);
        assert_eq!(report.thumbnails, 2);
        assert_eq!(backend.thumbnails().len(), 2);
        assert!(has_warning(&report, |w| matches!(w, BuildWarning::NameCollision { .. })));
        let en = read_output(tmp.path(), "en/home/index.html");
        assert!(en.starts_with(r#"<img src="../../static/img/thumbnail/dawn-40x30-"#));
    }

    #[test]
    fn zero_thumbnail_size_skips_only_that_page() {
        let tmp = setup_project();
        write_file(
            tmp.path(),
            "templates/main.html",
            "{% if page.dawn %}{{ page.dawn|thumbnail(0, 30) }}{% endif %}<h1>{{ page.title }}</h1>",
        );
        write_file(tmp.path(), "resources/en/home/dawn.jpg", "fake");
        let backend = Arc::new(MockBackend::new());

        let report = build_with_backend(tmp.path(), backend.clone(), None).unwrap();

        assert_eq!(report.pages_in("en"), 0);
        assert_eq!(report.pages_in("fr"), 1);
        assert!(has_warning(&report, |w| matches!(
            w,
            BuildWarning::PageRenderFailed { page, reason } if page == "home" && reason.contains("0x30")
        )));
        assert!(backend.thumbnails().is_empty());
    }

    #[test]
    fn corrupt_image_fails_the_build() {
        let tmp = setup_project();
        write_file(tmp.path(), "resources/en/home/broken.png", "nope");

        let result = build_with_backend(tmp.path(), Arc::new(MockBackend::failing()), None);

        let err = result.unwrap_err();
        assert!(matches!(err, BuildError::Tree(TreeError::Asset(_))));
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn bad_encoding_fails_the_build() {
        let tmp = setup_project();
        write_file(tmp.path(), "resources/en/home/intro.md", b"caf\xe9".as_slice());

        let err = build_mock(tmp.path()).unwrap_err();
        assert!(matches!(err, BuildError::Content(ContentError::Encoding(_))));
    }

    // =========================================================================
    // Configuration and events
    // =========================================================================

    #[test]
    fn missing_config_fails_before_output() {
        let tmp = setup_project();
        fs::remove_file(tmp.path().join("site.toml")).unwrap();

        let err = build_mock(tmp.path()).unwrap_err();
        assert!(matches!(err, BuildError::Config(ConfigError::Read { .. })));
        assert!(!tmp.path().join("build").exists());
    }

    #[test]
    fn events_follow_build_steps() {
        let tmp = setup_project();
        let (tx, rx) = mpsc::channel();

        build_with_backend(tmp.path(), Arc::new(MockBackend::new()), Some(tx)).unwrap();
        let events: Vec<BuildEvent> = rx.iter().collect();

        assert_eq!(events[0], BuildEvent::StaticCopied { files: 1 });
        assert!(matches!(&events[1], BuildEvent::LanguageDiscovered { language, pages: 1 } if language == "en"));
        assert!(matches!(events.last(), Some(BuildEvent::SitemapWritten { urls: 2 })));
        let written = events
            .iter()
            .filter(|e| matches!(e, BuildEvent::PageWritten(_)))
            .count();
        assert_eq!(written, 2);
    }

    #[test]
    fn sibling_boxes_skip_non_content_files() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "page.md", "id: x\n");
        write_file(tmp.path(), "intro.fr.md", "Bonjour");
        write_file(tmp.path(), "notes.txt", "Notes");
        write_file(tmp.path(), "catalog.en", "a:b");
        write_file(tmp.path(), ".hidden.md", "no");
        write_file(tmp.path(), "logo.png", "img");

        let boxes = sibling_boxes(tmp.path()).unwrap();
        let keys: Vec<&str> = boxes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["intro", "notes", "page"]);
    }
}
