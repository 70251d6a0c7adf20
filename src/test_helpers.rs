//! Shared test utilities.
//!
//! Provides file writers for building content trees inside a temp directory
//! and a small two-language project fixture.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_project();
//! write_page(tmp.path(), "resources/en/about", "id: about\ntitle: About\n");
//!
//! let report = build_with_backend(tmp.path(), Arc::new(MockBackend::new()), None).unwrap();
//! assert_eq!(read_output(tmp.path(), "en/about/index.html"), "...");
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Writers
// =========================================================================

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
}

/// Write a page descriptor: `root/rel/page.md`. `rel` may be empty.
pub fn write_page(root: &Path, rel: &str, text: &str) {
    let rel = if rel.is_empty() {
        "page.md".to_string()
    } else {
        format!("{rel}/page.md")
    };
    write_file(root, &rel, text);
}

// =========================================================================
// Project fixture
// =========================================================================

pub const FIXTURE_CONFIG: &str = r#"
domain = "example.org"
default_template = "main"

[[languages]]
code = "en"
name = "English"

[[languages]]
code = "fr"
name = "Français"

[i18n.en]
read_more = "Read more"

[i18n.fr]
read_more = "Lire la suite"

[processing]
max_processes = 2
"#;

pub const FIXTURE_TEMPLATE: &str = r#"<html lang="{{ current_language }}">
<head>{{ css.main }}</head>
<body>
<nav>{% for item in menu %}<a href="{{ item }}">{{ item.title }}</a>{% endfor %}</nav>
<ul class="languages">{% for code, other in lang_pages|items %}<li><a href="{{ other.lang_url }}">{{ code }}</a></li>{% endfor %}</ul>
<h1>{{ page.title }}</h1>
{{ page.box }}
</body>
</html>
"#;

/// A two-language project in a temp directory:
///
/// ```text
/// site.toml                     en + fr, default template `main`
/// templates/main.html
/// resources/static/css/main.css
/// resources/en/home/page.md     id home
/// resources/fr/home/page.md     id home
/// ```
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "site.toml", FIXTURE_CONFIG);
    write_file(root, "templates/main.html", FIXTURE_TEMPLATE);
    write_file(root, "resources/static/css/main.css", "body { margin: 0 }\n");
    write_page(
        root,
        "resources/en/home",
        "id: home\ntitle: Home\ntemplate: main\n\nWelcome to *the site*.\n",
    );
    write_page(
        root,
        "resources/fr/home",
        "id: home\ntitle: Accueil\ntemplate: main\n\nBienvenue sur *le site*.\n",
    );
    tmp
}

// =========================================================================
// Output
// =========================================================================

/// Read a file below the project's `build/` directory. Panics with the
/// list of produced files when it is missing.
pub fn read_output(project: &Path, rel: &str) -> String {
    let path = project.join("build").join(rel);
    fs::read_to_string(&path).unwrap_or_else(|e| {
        let produced: Vec<String> = walkdir::WalkDir::new(project.join("build"))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().display().to_string())
            .collect();
        panic!("cannot read {}: {e}. Produced: {produced:#?}", path.display())
    })
}
