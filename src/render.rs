//! Template environment and the values templates see.
//!
//! Pages are rendered twice with the same context: pass 1 renders the page
//! template from `templates/`, pass 2 renders pass 1's output as a template
//! again. Markdown bodies are converted before pass 1, so directives written
//! inside content (`{{ page.dawn|thumbnail(200, 150) }}`) only expand in
//! pass 2. For output without directives both passes are identical.
//!
//! ## Environment
//!
//! - Filesystem loader on the templates directory; `main` resolves to
//!   `main.html`.
//! - No auto-escaping: content is trusted HTML.
//! - Undefined values are chainable and print as [`SLOT_EMPTY`] with a
//!   warning, so a missing value is visible in the page instead of silently
//!   empty.
//! - Filters: `thumbnail(image, width, height, style="")` and
//!   `partial(object, template)` (alias `template`).
//!
//! ## Views
//!
//! Context values are thin [`Object`] views that carry the page being
//! rendered, so every URL they print is relative to that page:
//!
//! | View | prints as | attributes |
//! |---|---|---|
//! | [`NodeView`] | its URL | `url`, `lang_url`, `id`, `title`, `children`, `box`, header keys, named values |
//! | [`ImageView`] | `<img>` tag | `url`, `width`, `height`, caption fields, `get(class, id)` |
//! | [`StaticView`] | `<link>`/`<script>`/URL | `url`, `filename`, `kind` |
//! | [`BoxView`] | body HTML | `html`, `markdown`, header keys |

use crate::asset::{AssetError, Galleries, ImageAsset, StaticFile, Thumbnails};
use crate::catalog::{PathCatalog, SECTIONS};
use crate::config::ServicesConfig;
use crate::content::{ContentBox, HeaderValue};
use crate::naming;
use crate::tree::{ContentTree, NodeId, NodeValue};
use crate::types::{Language, RenderPage};
use minijinja::value::{Enumerator, Object, Value, from_args};
use minijinja::{
    AutoEscape, Environment, Error, ErrorKind, State, UndefinedBehavior, context,
    escape_formatter, path_loader,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Printed in place of an undefined value.
pub const SLOT_EMPTY: &str = "SLOT EMPTY - PLEASE FILL IN";

/// Context names owned by the builder; sibling boxes never shadow them.
pub const RESERVED: [&str; 13] = [
    "page",
    "menu",
    "lang_pages",
    "languages",
    "current_language",
    "gallery",
    "css",
    "js",
    "img",
    "icon",
    "i18n",
    "builtins",
    "boxes",
];

/// `main` → `main.html`; names with an extension are kept.
pub fn template_file(name: &str) -> String {
    let name = name.trim();
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}.html")
    }
}

/// The image or IO failure behind a render error, if any.
///
/// Such failures mean the source tree is broken and stop the build; every
/// other render error only costs the page.
pub fn fatal_cause(err: &Error) -> Option<&AssetError> {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(asset) = cause.downcast_ref::<AssetError>() {
            return Some(asset);
        }
        source = cause.source();
    }
    None
}

// ============================================================================
// Environment
// ============================================================================

/// The shared template environment of one build.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new(templates: &Path, thumbnails: Arc<Thumbnails>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates));
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_formatter(|out, state, value| {
            if value.is_undefined() {
                warn!(template = state.name(), "undefined value printed as empty slot");
                out.write_str(SLOT_EMPTY)?;
                Ok(())
            } else {
                escape_formatter(out, state, value)
            }
        });
        env.add_filter(
            "thumbnail",
            move |value: Value, width: u32, height: u32, style: Option<String>| {
                thumbnail_filter(&thumbnails, value, width, height, style)
            },
        );
        env.add_filter("partial", partial_filter);
        env.add_filter("template", partial_filter);
        register_string_filters(&mut env);
        Self { env }
    }

    /// Whether `name` resolves to a loadable template.
    ///
    /// A template that exists but fails to parse counts as present so the
    /// syntax error surfaces when the page renders.
    pub fn has_template(&self, name: &str) -> bool {
        match self.env.get_template(&template_file(name)) {
            Ok(_) => true,
            Err(e) => e.kind() != ErrorKind::TemplateNotFound,
        }
    }

    /// Pass 1 only.
    pub fn render_template(&self, name: &str, ctx: &Value) -> Result<String, Error> {
        self.env.get_template(&template_file(name))?.render(ctx)
    }

    /// Render `text` itself as a template.
    pub fn render_text(&self, text: &str, ctx: &Value) -> Result<String, Error> {
        self.env.render_str(text, ctx)
    }

    /// Both passes.
    pub fn render_page(&self, name: &str, ctx: &Value) -> Result<String, Error> {
        let first = self.render_template(name, ctx)?;
        self.render_text(&first, ctx)
    }
}

fn thumbnail_filter(
    thumbnails: &Thumbnails,
    value: Value,
    width: u32,
    height: u32,
    style: Option<String>,
) -> Result<String, Error> {
    let view = value.downcast_object_ref::<ImageView>().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("thumbnail expects an image, got {:?}", value.kind()),
        )
    })?;
    if width == 0 || height == 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("thumbnail size must be non-zero, got {width}x{height}"),
        ));
    }
    thumbnails
        .img_tag(&view.image, &view.page, width, height, style.as_deref())
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot create thumbnail of {}", view.image.filename),
            )
            .with_source(e)
        })
}

/// String filters that hand undefined input back unchanged, so the
/// formatter still sees it and prints the empty slot.
fn register_string_filters(env: &mut Environment<'static>) {
    env.add_filter("upper", |v: Value| map_defined(v, |s| s.to_uppercase()));
    env.add_filter("lower", |v: Value| map_defined(v, |s| s.to_lowercase()));
    env.add_filter("capitalize", |v: Value| map_defined(v, capitalize));
    env.add_filter("title", |v: Value| map_defined(v, title_case));
    env.add_filter("trim", |v: Value, chars: Option<String>| {
        map_defined(v, |s| match &chars {
            Some(chars) => s.trim_matches(|c: char| chars.contains(c)).to_string(),
            None => s.trim().to_string(),
        })
    });
    env.add_filter("replace", |v: Value, from: String, to: String| {
        map_defined(v, |s| s.replace(&from, &to))
    });
    env.add_filter("safe", |v: Value| {
        if v.is_undefined() {
            v
        } else {
            Value::from_safe_string(v.to_string())
        }
    });
}

fn map_defined(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    if value.is_undefined() {
        return value;
    }
    match value.as_str() {
        Some(s) => Value::from(f(s)),
        None => Value::from(f(&value.to_string())),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        word_start = !c.is_alphanumeric();
    }
    out
}

fn partial_filter(state: &State, value: Value, name: String) -> Result<String, Error> {
    let template = state.env().get_template(&template_file(&name))?;
    template.render(context! {
        page => state.lookup("page"),
        object => value,
    })
}

/// `builtins.google_analytics` and `builtins.google_maps`.
///
/// Services that are not configured render as empty strings.
pub fn builtins(services: &ServicesConfig) -> Result<BTreeMap<String, String>, Error> {
    let env = Environment::new();
    let mut out = BTreeMap::new();

    let analytics = match &services.analytics_id {
        Some(id) => env.render_str(ANALYTICS_SNIPPET, context! { analytics_id => id })?,
        None => {
            info!("no analytics_id configured, builtins.google_analytics is empty");
            String::new()
        }
    };
    out.insert("google_analytics".to_string(), analytics);

    let map = match &services.map {
        Some(map) => env.render_str(
            MAPS_SNIPPET,
            context! { lat => map.lat, lon => map.lon, zoom => map.zoom, title => map.title },
        )?,
        None => {
            info!("no [services.map] configured, builtins.google_maps is empty");
            String::new()
        }
    };
    out.insert("google_maps".to_string(), map);
    Ok(out)
}

const ANALYTICS_SNIPPET: &str = r#"<script async src="https://www.googletagmanager.com/gtag/js?id={{ analytics_id }}"></script>
<script>
  window.dataLayer = window.dataLayer || [];
  function gtag(){dataLayer.push(arguments);}
  gtag('js', new Date());
  gtag('config', '{{ analytics_id }}');
</script>"#;

const MAPS_SNIPPET: &str = r#"<script src="https://maps.googleapis.com/maps/api/js"></script>
<script>
  function initialize() {
    var position = new google.maps.LatLng({{ lat }}, {{ lon }});
    var map = new google.maps.Map(document.getElementById('map_canvas'), {
      zoom: {{ zoom }},
      center: position,
      mapTypeId: google.maps.MapTypeId.ROADMAP
    });
    new google.maps.Marker({ position: position, map: map, title: '{{ title }}' });
  }
</script>"#;

// ============================================================================
// Site data and page context
// ============================================================================

/// Everything discovery produced, shared by all page renders.
pub struct Site {
    pub languages: Vec<Language>,
    pub trees: BTreeMap<String, Arc<ContentTree>>,
    pub menus: BTreeMap<String, Arc<ContentTree>>,
    pub galleries: Galleries,
    pub catalog: Arc<PathCatalog>,
    pub i18n: BTreeMap<String, BTreeMap<String, String>>,
    pub builtins: BTreeMap<String, String>,
}

/// The per-page inputs of [`page_context`].
pub struct PageInputs<'a> {
    pub language: &'a str,
    pub node: NodeId,
    /// Counterpart page per language, this one included.
    pub lang_pages: &'a [(String, NodeId)],
    /// Sibling content files by key.
    pub boxes: BTreeMap<String, ContentBox>,
}

/// Assemble the template context of one page.
pub fn page_context(site: &Site, inputs: PageInputs<'_>) -> Value {
    let lang = inputs.language;
    let Some(tree) = site.trees.get(lang) else {
        return Value::UNDEFINED;
    };
    let page = RenderPage::new(tree.node(inputs.node).level, lang);
    let mut ctx: BTreeMap<String, Value> = BTreeMap::new();

    let boxes: BTreeMap<String, Value> = inputs
        .boxes
        .into_iter()
        .map(|(key, content)| (key, BoxView::value(content)))
        .collect();
    for (key, value) in &boxes {
        if !RESERVED.contains(&key.as_str()) {
            ctx.insert(key.clone(), value.clone());
        }
    }
    ctx.insert("boxes".into(), Value::from(boxes));

    ctx.insert("page".into(), NodeView::value(tree, inputs.node, &page));

    let menu: Vec<Value> = site
        .menus
        .get(lang)
        .map(|menu| {
            menu.root()
                .children
                .iter()
                .map(|&id| NodeView::value(menu, id, &page))
                .collect()
        })
        .unwrap_or_default();
    ctx.insert("menu".into(), Value::from(menu));

    let lang_pages: BTreeMap<String, Value> = inputs
        .lang_pages
        .iter()
        .filter_map(|(code, id)| {
            let other = site.trees.get(code)?;
            Some((code.clone(), NodeView::value(other, *id, &page)))
        })
        .collect();
    ctx.insert("lang_pages".into(), Value::from(lang_pages));

    let languages: Vec<Value> = site
        .languages
        .iter()
        .map(|l| {
            Value::from(BTreeMap::from([
                ("code".to_string(), Value::from(l.code.clone())),
                ("name".to_string(), Value::from(l.name.clone())),
                ("current".to_string(), Value::from(l.code == lang)),
            ]))
        })
        .collect();
    ctx.insert("languages".into(), Value::from(languages));
    ctx.insert("current_language".into(), Value::from(lang));

    let gallery: BTreeMap<String, Value> = site
        .galleries
        .for_language(lang)
        .into_iter()
        .map(|(name, images)| {
            let views: Vec<Value> = images
                .into_iter()
                .map(|image| ImageView::value(image, &page))
                .collect();
            (name, Value::from(views))
        })
        .collect();
    ctx.insert("gallery".into(), Value::from(gallery));

    for section in SECTIONS {
        ctx.insert(
            section.into(),
            Value::from_object(CatalogView {
                catalog: Arc::clone(&site.catalog),
                section,
                page: page.clone(),
            }),
        );
    }

    let strings = site.i18n.get(lang).cloned().unwrap_or_default();
    ctx.insert("i18n".into(), Value::from(strings));
    ctx.insert("builtins".into(), Value::from(site.builtins.clone()));

    Value::from(ctx)
}

// ============================================================================
// Views
// ============================================================================

fn header_value(value: HeaderValue) -> Value {
    match value {
        HeaderValue::Int(n) => Value::from(n),
        HeaderValue::Float(x) => Value::from(x),
        HeaderValue::Bool(b) => Value::from(b),
        HeaderValue::Text(s) => Value::from(s),
    }
}

fn keys_value(keys: impl IntoIterator<Item = String>) -> Enumerator {
    Enumerator::Values(keys.into_iter().map(Value::from).collect())
}

/// A content node seen from the page being rendered.
#[derive(Debug)]
pub struct NodeView {
    tree: Arc<ContentTree>,
    id: NodeId,
    page: RenderPage,
}

const NODE_FIELDS: [&str; 11] = [
    "url", "lang_url", "id", "title", "template", "level", "kind", "slug", "language", "children",
    "box",
];

impl NodeView {
    pub fn value(tree: &Arc<ContentTree>, id: NodeId, page: &RenderPage) -> Value {
        Value::from_object(Self {
            tree: Arc::clone(tree),
            id,
            page: page.clone(),
        })
    }

    fn named(&self, value: &NodeValue) -> Value {
        match value {
            NodeValue::Node(id) => Self::value(&self.tree, *id, &self.page),
            NodeValue::Image(image) => ImageView::value(Arc::clone(image), &self.page),
            NodeValue::File(file) => StaticView::value(file.clone(), &self.page),
        }
    }
}

impl Object for NodeView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        let node = self.tree.node(self.id);
        let value = match key {
            "url" => Value::from(node.url(&self.page)),
            "lang_url" => Value::from(node.lang_url(&self.page)),
            "level" => Value::from(node.level),
            "kind" => Value::from(node.kind.as_str()),
            "slug" => Value::from(node.slug()),
            "language" | "lang" => Value::from(node.language.clone()),
            "children" => Value::from(
                node.children
                    .iter()
                    .map(|&c| Self::value(&self.tree, c, &self.page))
                    .collect::<Vec<_>>(),
            ),
            "parent" => Self::value(&self.tree, node.parent?, &self.page),
            "box" => BoxView::value(node.descriptor.clone()?),
            _ => match node.attribute(key) {
                Some(attr) => header_value(attr),
                None => self.named(node.values.get(&naming::normalize(key))?),
            },
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let node = self.tree.node(self.id);
        let header = node
            .descriptor
            .as_ref()
            .map(|d| d.header.keys())
            .unwrap_or_default();
        keys_value(
            NODE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .chain(header)
                .chain(node.values.keys().cloned()),
        )
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tree.node(self.id).url(&self.page))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        _args: &[Value],
    ) -> Result<Value, Error> {
        let node = self.tree.node(self.id);
        match method {
            "url" => Ok(Value::from(node.url(&self.page))),
            "lang_url" => Ok(Value::from(node.lang_url(&self.page))),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// An image seen from the page being rendered.
#[derive(Debug)]
pub struct ImageView {
    image: Arc<ImageAsset>,
    page: RenderPage,
}

impl ImageView {
    pub fn value(image: Arc<ImageAsset>, page: &RenderPage) -> Value {
        Value::from_object(Self {
            image,
            page: page.clone(),
        })
    }
}

impl Object for ImageView {
    /// Unknown keys read as caption fields, which are empty when missing.
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        let image = &self.image;
        Some(match key {
            "url" => Value::from(image.resolve_url(&self.page)),
            "filename" => Value::from(image.filename.clone()),
            "name" => Value::from(image.name.clone()),
            "width" => Value::from(image.dimensions.width),
            "height" => Value::from(image.dimensions.height),
            field => Value::from(image.caption(field, &self.page.language)),
        })
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let fields = ["url", "filename", "name", "width", "height"]
            .into_iter()
            .chain(self.image.caption_fields(&self.page.language))
            .map(str::to_string)
            .collect::<Vec<_>>();
        keys_value(fields)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.image.img_tag(&self.page, None, None))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "get" => {
                let (class, id): (Option<String>, Option<String>) = from_args(args)?;
                let class = class.filter(|c| !c.is_empty());
                let id = id.filter(|i| !i.is_empty());
                Ok(Value::from(self.image.img_tag(
                    &self.page,
                    class.as_deref(),
                    id.as_deref(),
                )))
            }
            "url" => Ok(Value::from(self.image.resolve_url(&self.page))),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// A non-image file seen from the page being rendered.
#[derive(Debug)]
pub struct StaticView {
    file: StaticFile,
    page: RenderPage,
}

impl StaticView {
    pub fn value(file: StaticFile, page: &RenderPage) -> Value {
        Value::from_object(Self {
            file,
            page: page.clone(),
        })
    }
}

impl Object for StaticView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "url" => Some(Value::from(self.file.url(&self.page))),
            "filename" => Some(Value::from(self.file.filename.clone())),
            "kind" => Some(Value::from(self.file.kind.as_str())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["url", "filename", "kind"])
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file.render(&self.page))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        _args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "url" => Ok(Value::from(self.file.url(&self.page))),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// One section (`css`, `js`, `img`, `icon`) of the static catalog.
#[derive(Debug)]
struct CatalogView {
    catalog: Arc<PathCatalog>,
    section: &'static str,
    page: RenderPage,
}

impl Object for CatalogView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let file = self.catalog.section(self.section)?.get(key.as_str()?)?;
        Some(StaticView::value(file.clone(), &self.page))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let keys = self
            .catalog
            .section(self.section)
            .map(|s| s.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        keys_value(keys)
    }
}

/// A content box: prints its HTML body.
#[derive(Debug)]
pub struct BoxView {
    content: ContentBox,
}

impl BoxView {
    pub fn value(content: ContentBox) -> Value {
        Value::from_object(Self { content })
    }
}

impl Object for BoxView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        match key {
            "html" => Some(Value::from(self.content.html.clone())),
            "markdown" => Some(Value::from(self.content.markdown.clone())),
            _ => self.content.header.get(key).map(header_value),
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        keys_value(
            ["html".to_string(), "markdown".to_string()]
                .into_iter()
                .chain(self.content.header.keys()),
        )
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetSink;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::ImageBackend;
    use crate::test_helpers::{write_file, write_page};
    use tempfile::TempDir;

    /// A one-language site rooted at `<tmp>/en`, rendered with templates from
    /// `<tmp>/templates`.
    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            write_page(tmp.path(), "en/home", "id: home\ntitle: Home\n\nWelcome *home*.");
            write_file(tmp.path(), "en/home/dawn.jpg", "fake");
            write_file(tmp.path(), "en/home/catalog.en", "dawn:Dawn,Sunrise,\n");
            write_page(tmp.path(), "en/about", "id: about\ntitle: About\n");
            write_file(tmp.path(), "static/css/main.css", "body {}");
            Self { tmp }
        }

        fn template(&self, name: &str, body: &str) -> &Self {
            write_file(self.tmp.path(), &format!("templates/{name}"), body);
            self
        }

        fn site(&self, backend: &dyn ImageBackend) -> Site {
            let langs = vec!["en".to_string()];
            let mut sink = AssetSink::new(backend, &self.tmp.path().join("build"), langs);
            let root = self.tmp.path().join("en");
            let tree = Arc::new(ContentTree::discover(&root, "en", &mut sink).unwrap());
            let menu = Arc::new(ContentTree::discover_menu(&root, "en").unwrap());
            Site {
                languages: vec![Language::new("en", "English")],
                trees: BTreeMap::from([("en".to_string(), tree)]),
                menus: BTreeMap::from([("en".to_string(), menu)]),
                galleries: sink.galleries.clone(),
                catalog: Arc::new(PathCatalog::scan(&self.tmp.path().join("static")).unwrap()),
                i18n: BTreeMap::from([(
                    "en".to_string(),
                    BTreeMap::from([("hello".to_string(), "Hello".to_string())]),
                )]),
                builtins: BTreeMap::new(),
            }
        }

        fn renderer(&self, backend: Arc<dyn ImageBackend>) -> Renderer {
            let thumbs = Arc::new(Thumbnails::new(backend, &self.tmp.path().join("build")));
            Renderer::new(&self.tmp.path().join("templates"), thumbs)
        }
    }

    fn home_context(site: &Site, boxes: BTreeMap<String, ContentBox>) -> Value {
        let pages = site.trees["en"].flatten();
        let home = pages.get("home").unwrap();
        page_context(
            site,
            PageInputs {
                language: "en",
                node: home,
                lang_pages: &[("en".to_string(), home)],
                boxes,
            },
        )
    }

    fn render(fixture: &Fixture, template: &str, boxes: BTreeMap<String, ContentBox>) -> String {
        fixture.template("main.html", template);
        let backend = Arc::new(MockBackend::new());
        let site = fixture.site(backend.as_ref());
        let renderer = fixture.renderer(backend);
        renderer
            .render_page("main", &home_context(&site, boxes))
            .unwrap()
    }

    fn content(name: &str, text: &str) -> BTreeMap<String, ContentBox> {
        BTreeMap::from([(
            naming::content_key(name),
            ContentBox::parse(Path::new(name), text),
        )])
    }

    // =========================================================================
    // Two passes
    // =========================================================================

    #[test]
    fn passes_agree_without_embedded_directives() {
        let fixture = Fixture::new();
        fixture.template("main.html", "<h1>{{ page.title }}</h1>\n{{ page.box }}\n");
        let backend = Arc::new(MockBackend::new());
        let site = fixture.site(backend.as_ref());
        let renderer = fixture.renderer(backend);
        let ctx = home_context(&site, BTreeMap::new());

        let first = renderer.render_template("main", &ctx).unwrap();
        let second = renderer.render_text(&first, &ctx).unwrap();

        assert_eq!(first, second);
        assert!(first.contains("<h1>Home</h1>"));
        assert!(first.contains("<em>home</em>"));
    }

    #[test]
    fn directives_inside_markdown_expand_in_second_pass() {
        let fixture = Fixture::new();
        let boxes = content("intro.md", "title: Intro\n\nSee **{{ page.title }}** at {{ page.url }}.");

        let html = render(&fixture, "{{ intro }}", boxes);

        assert!(html.contains("<strong>Home</strong>"));
        assert!(html.contains("../home/index.html"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn thumbnail_inside_markdown() {
        let fixture = Fixture::new();
        let boxes = content("intro.md", "\n{{ page.dawn|thumbnail(120, 80, \"round\") }}");

        let html = render(&fixture, "{{ intro }}", boxes);

        assert!(html.contains(r#"<img class="round" src="../../static/img/thumbnail/dawn-120x80-"#));
        assert!(html.contains(r#"title="Dawn""#));
    }

    // =========================================================================
    // Undefined values
    // =========================================================================

    #[test]
    fn undefined_prints_sentinel() {
        let fixture = Fixture::new();
        let html = render(&fixture, "[{{ page.nope }}] [{{ nothing.at.all }}]", BTreeMap::new());
        assert_eq!(html.matches(SLOT_EMPTY).count(), 2);
    }

    #[test]
    fn undefined_survives_string_filters() {
        let fixture = Fixture::new();
        let html = render(
            &fixture,
            "[{{ nothing|upper }}][{{ page.nope|trim }}][{{ page.nope|replace('a', 'b')|title }}]",
            BTreeMap::new(),
        );
        assert_eq!(html.matches(SLOT_EMPTY).count(), 3, "{html}");
    }

    #[test]
    fn string_filters_still_transform_values() {
        let fixture = Fixture::new();
        let html = render(
            &fixture,
            "{{ 'morning light'|title }}|{{ '  x '|trim }}|{{ 'ab'|upper }}|{{ 'éTÉ'|capitalize }}|{{ '--a--'|trim('-') }}|{{ 'a-b'|replace('-', '+') }}",
            BTreeMap::new(),
        );
        assert_eq!(html, "Morning Light|x|AB|Été|a|a+b");
    }

    #[test]
    fn undefined_in_conditions_is_falsy() {
        let fixture = Fixture::new();
        let html = render(&fixture, "{% if page.nope %}x{% else %}y{% endif %}", BTreeMap::new());
        assert_eq!(html, "y");
    }

    // =========================================================================
    // Views
    // =========================================================================

    #[test]
    fn node_prints_its_url() {
        let fixture = Fixture::new();
        let html = render(&fixture, "{{ page }}|{{ page.url() }}|{{ page.lang_url }}", BTreeMap::new());
        assert_eq!(html, "../home/index.html|../home/index.html|../../en/home/index.html");
    }

    #[test]
    fn menu_lists_root_children_in_id_order() {
        let fixture = Fixture::new();
        let html = render(
            &fixture,
            "{% for item in menu %}{{ item.title }}={{ item }};{% endfor %}",
            BTreeMap::new(),
        );
        assert_eq!(html, "About=../about/index.html;Home=../home/index.html;");
    }

    #[test]
    fn image_views_print_tags_in_page_language() {
        let fixture = Fixture::new();
        let html = render(
            &fixture,
            "{{ page.dawn }}|{{ page.dawn.get('wide', 'hero') }}|{{ page.dawn.alt }}|{{ page.dawn.missing }}|",
            BTreeMap::new(),
        );
        assert!(html.starts_with(r#"<img src="../../static/img/dawn.jpg" title="Dawn" alt="Sunrise">|"#));
        assert!(html.contains(r#"<img class="wide" id="hero" src="../../static/img/dawn.jpg""#));
        assert!(html.ends_with("|Sunrise||"));
    }

    #[test]
    fn static_catalog_sections() {
        let fixture = Fixture::new();
        let html = render(&fixture, "{{ css.main }} {{ css.main.url }}", BTreeMap::new());
        assert_eq!(
            html,
            r#"<link href="../../static/css/main.css" rel="stylesheet" type="text/css"> ../../static/css/main.css"#
        );
    }

    #[test]
    fn boxes_are_top_level_unless_reserved() {
        let fixture = Fixture::new();
        let mut boxes = content("sidebar.md", "Side");
        boxes.extend(content("menu.md", "Shadowed"));

        let html = render(
            &fixture,
            "{{ sidebar }}|{{ boxes.menu }}|{{ menu|length }}",
            boxes,
        );
        assert_eq!(html, "<p>Side</p>\n|<p>Shadowed</p>\n|2");
    }

    #[test]
    fn context_exposes_language_data() {
        let fixture = Fixture::new();
        let html = render(
            &fixture,
            "{{ current_language }} {{ i18n.hello }} {{ languages[0].name }} {{ lang_pages.en.title }}",
            BTreeMap::new(),
        );
        assert_eq!(html, "en Hello English Home");
    }

    // =========================================================================
    // Filters
    // =========================================================================

    #[test]
    fn partial_renders_with_page_and_object() {
        let fixture = Fixture::new();
        fixture.template("card.html", "[{{ object.title }} from {{ page.id }}]");
        let html = render(
            &fixture,
            "{% for p in menu %}{{ p|partial('card') }}{% endfor %}{{ page|template('card.html') }}",
            BTreeMap::new(),
        );
        assert_eq!(html, "[About from home][Home from home][Home from home]");
    }

    #[test]
    fn thumbnail_rejects_non_images() {
        let fixture = Fixture::new();
        fixture.template("main.html", "{{ page|thumbnail(10, 10) }}");
        let backend = Arc::new(MockBackend::new());
        let site = fixture.site(backend.as_ref());
        let renderer = fixture.renderer(backend);

        let err = renderer
            .render_page("main", &home_context(&site, BTreeMap::new()))
            .unwrap_err();
        assert!(fatal_cause(&err).is_none());
    }

    #[test]
    fn thumbnail_decode_failure_is_fatal() {
        let fixture = Fixture::new();
        fixture.template("main.html", "{{ page.dawn|thumbnail(10, 10) }}");
        let site = fixture.site(&MockBackend::new());
        let renderer = fixture.renderer(Arc::new(MockBackend::failing()));

        let err = renderer
            .render_page("main", &home_context(&site, BTreeMap::new()))
            .unwrap_err();
        let cause = fatal_cause(&err).expect("asset error in chain");
        assert!(cause.to_string().contains("dawn.jpg"));
    }

    // =========================================================================
    // Templates and builtins
    // =========================================================================

    #[test]
    fn has_template_checks_loader() {
        let fixture = Fixture::new();
        fixture.template("main.html", "x");
        let renderer = fixture.renderer(Arc::new(MockBackend::new()));
        assert!(renderer.has_template("main"));
        assert!(renderer.has_template("main.html"));
        assert!(!renderer.has_template("missing"));
    }

    #[test]
    fn builtins_render_configured_services() {
        let services = ServicesConfig {
            analytics_id: Some("G-TEST".into()),
            map: Some(crate::config::MapConfig {
                lat: 41.5,
                lon: -0.5,
                zoom: 12,
                title: "Office".into(),
            }),
        };
        let out = builtins(&services).unwrap();
        assert!(out["google_analytics"].contains("G-TEST"));
        assert!(out["google_maps"].contains("LatLng(41.5, -0.5)"));
        assert!(out["google_maps"].contains("zoom: 12"));
    }

    #[test]
    fn builtins_empty_without_services() {
        let out = builtins(&ServicesConfig::default()).unwrap();
        assert_eq!(out["google_analytics"], "");
        assert_eq!(out["google_maps"], "");
    }
}
