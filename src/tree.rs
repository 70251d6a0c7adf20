//! The content tree of one language.
//!
//! Discovery mirrors `resources/<lang>/` into an arena of [`ContentNode`]s.
//! Every directory becomes a node; a directory holding `page.md` is a
//! [`NodeKind::Page`] whose descriptor header is kept on the node. Files
//! become named values of the node that contains them:
//!
//! ```text
//! resources/en/                 root (Directory, level 0)
//! ├── home/                     Page "home", level 1, url home/index.html
//! │   ├── page.md               descriptor: id, title, template, ...
//! │   ├── intro.md              sibling content box (read at render time)
//! │   ├── dawn.jpg              value `dawn`  → ImageAsset
//! │   └── Price-List.pdf        value `price_list` → StaticFile
//! └── about/                    Page "about", level 1
//!     └── team/                 Page, level 2, url about/team/index.html
//! ```
//!
//! ## Ordering
//!
//! Children are kept sorted by their `id` header as plain string comparison.
//! A child without an `id` gets [`SortKey::Missing`], which sorts after every
//! id; under a page parent it is also reported as [`BuildWarning::MissingId`].
//! Insertion is stable: a child whose key equals existing keys goes after
//! them. Directory entries are visited in name order, so the final order
//! does not depend on how the filesystem lists them.
//!
//! ## Two traversals
//!
//! The page traversal runs with an [`AssetSink`]: images are decoded and
//! published, other files copied, galleries filled. The menu traversal runs
//! without one and only builds directory and page nodes.

use crate::asset::{AssetError, AssetSink, ImageAsset, StaticFile};
use crate::content::{ContentBox, ContentError, HeaderValue};
use crate::metadata::DirectoryCatalogs;
use crate::naming::{self, AssetKind, FileClass, PAGE_DESCRIPTOR};
use crate::types::{BuildWarning, RenderPage};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("cannot list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Index of a node in its [`ContentTree`].
pub type NodeId = usize;

/// What a directory turned out to be. Decided once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Page,
    Directory,
    /// Hidden directories; never attached or descended into.
    Forbidden,
}

impl NodeKind {
    /// Classify a directory by its name and contents.
    pub fn of_dir(path: &Path) -> Self {
        let hidden = path
            .file_name()
            .map(|n| naming::is_forbidden(&n.to_string_lossy()))
            .unwrap_or(false);
        if hidden {
            NodeKind::Forbidden
        } else if path.join(PAGE_DESCRIPTOR).is_file() {
            NodeKind::Page
        } else {
            NodeKind::Directory
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Page => "page",
            NodeKind::Directory => "dir",
            NodeKind::Forbidden => "forbidden",
        }
    }
}

/// Sort key of a child. `Missing` orders after every `Id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Id(String),
    Missing,
}

/// A named value attached to a node.
#[derive(Debug, Clone)]
pub enum NodeValue {
    Node(NodeId),
    Image(Arc<ImageAsset>),
    File(StaticFile),
}

/// One directory of the content tree.
#[derive(Debug, Clone)]
pub struct ContentNode {
    /// Source directory.
    pub root: PathBuf,
    pub language: String,
    /// Depth below the language root.
    pub level: usize,
    pub kind: NodeKind,
    /// `/`-separated path below the language root; empty for the root.
    pub relative_url: String,
    pub parent: Option<NodeId>,
    /// Child directories, sorted by [`SortKey`].
    pub children: Vec<NodeId>,
    sort_keys: Vec<SortKey>,
    /// Named values by normalized name.
    pub values: BTreeMap<String, NodeValue>,
    /// Parsed `page.md` of a page node.
    pub descriptor: Option<ContentBox>,
}

impl ContentNode {
    pub fn id(&self) -> Option<&str> {
        self.descriptor.as_ref()?.header.id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.descriptor.as_ref()?.header.title.as_deref()
    }

    pub fn template(&self) -> Option<&str> {
        self.descriptor
            .as_ref()?
            .header
            .template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// A descriptor attribute by (normalized) name.
    pub fn attribute(&self, key: &str) -> Option<HeaderValue> {
        self.descriptor.as_ref()?.header.get(key)
    }

    /// Last path segment (`team` for `about/team`).
    pub fn slug(&self) -> &str {
        self.relative_url.rsplit('/').next().unwrap_or("")
    }

    /// Key in the language's [`PageSet`]: the id, or the path without one.
    pub fn page_key(&self) -> String {
        self.id()
            .map(str::to_string)
            .unwrap_or_else(|| self.relative_url.clone())
    }

    /// Link to this node from `page`.
    ///
    /// The number of `../` comes from the page being rendered, not from this
    /// node, so every link on one output file is relative to that file.
    pub fn url(&self, page: &RenderPage) -> String {
        let up = page.to_language_root();
        match (self.kind, self.relative_url.is_empty()) {
            (NodeKind::Page, true) => format!("{up}index.html"),
            (NodeKind::Page, false) => format!("{up}{}/index.html", self.relative_url),
            (_, true) => up,
            (_, false) => format!("{up}{}/", self.relative_url),
        }
    }

    /// Link to this node's page from a page of any language.
    pub fn lang_url(&self, page: &RenderPage) -> String {
        let up = page.to_build_root();
        if self.relative_url.is_empty() {
            format!("{up}{}/index.html", self.language)
        } else {
            format!("{up}{}/{}/index.html", self.language, self.relative_url)
        }
    }

    /// Output file below the build root: `<lang>/<relative>/index.html`.
    pub fn output_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.language);
        for segment in self.relative_url.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path.join("index.html")
    }
}

/// Arena holding every node of one language.
#[derive(Debug, Clone)]
pub struct ContentTree {
    pub language: String,
    nodes: Vec<ContentNode>,
    pub warnings: Vec<BuildWarning>,
    /// Menu trees repeat the page tree's diagnostics; they are not reported.
    quiet: bool,
}

impl ContentTree {
    /// Root node id.
    pub const ROOT: NodeId = 0;

    fn empty(root: &Path, language: &str, quiet: bool) -> Self {
        let root_node = ContentNode {
            root: root.to_path_buf(),
            language: language.to_string(),
            level: 0,
            kind: NodeKind::Directory,
            relative_url: String::new(),
            parent: None,
            children: Vec::new(),
            sort_keys: Vec::new(),
            values: BTreeMap::new(),
            descriptor: None,
        };
        Self {
            language: language.to_string(),
            nodes: vec![root_node],
            warnings: Vec::new(),
            quiet,
        }
    }

    /// Build the page tree of `root`, publishing assets through `sink`.
    ///
    /// A missing root logs a warning and yields a tree with no children.
    pub fn discover(root: &Path, language: &str, sink: &mut AssetSink) -> Result<Self, TreeError> {
        Self::build(root, language, Some(sink))
    }

    /// Build the menu tree of `root`: directories and pages only.
    pub fn discover_menu(root: &Path, language: &str) -> Result<Self, TreeError> {
        Self::build(root, language, None)
    }

    fn build(root: &Path, language: &str, sink: Option<&mut AssetSink>) -> Result<Self, TreeError> {
        let mut tree = Self::empty(root, language, sink.is_none());
        if !root.is_dir() {
            if !tree.quiet {
                warn!(path = %root.display(), "content root doesn't exist");
            }
            return Ok(tree);
        }
        let descriptor = root.join(PAGE_DESCRIPTOR);
        if descriptor.is_file() {
            tree.nodes[Self::ROOT].kind = NodeKind::Page;
            tree.nodes[Self::ROOT].descriptor = Some(ContentBox::load(&descriptor)?);
        }
        tree.discover_node(Self::ROOT, sink)?;
        Ok(tree)
    }

    fn warn(&mut self, warning: BuildWarning) {
        if self.quiet {
            debug!("{warning}");
        } else {
            warn!("{warning}");
            self.warnings.push(warning);
        }
    }

    fn discover_node(&mut self, id: NodeId, mut sink: Option<&mut AssetSink>) -> Result<(), TreeError> {
        let dir = self.nodes[id].root.clone();
        let mut entries = fs::read_dir(&dir)
            .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
            .map_err(|source| TreeError::ReadDir {
                path: dir.clone(),
                source,
            })?;
        entries.sort_by_key(|e| e.file_name());

        let has_images = entries.iter().any(|e| {
            matches!(
                naming::classify(&e.file_name().to_string_lossy()),
                FileClass::Asset {
                    kind: AssetKind::Image,
                    ..
                }
            )
        });
        let catalogs = match sink.as_deref() {
            Some(sink) if has_images => DirectoryCatalogs::read(&dir, sink.languages())?,
            _ => DirectoryCatalogs::default(),
        };

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                let kind = NodeKind::of_dir(&path);
                if kind == NodeKind::Forbidden {
                    debug!(path = %path.display(), "skipping hidden directory");
                    continue;
                }
                let child = self.new_node(id, &path, &name, kind)?;
                self.discover_node(child, sink.as_deref_mut())?;
                self.add_child(id, &name, child);
                continue;
            }
            let Some(sink) = sink.as_deref_mut() else {
                continue;
            };
            let (stem, value) = match naming::classify(&name) {
                FileClass::Asset {
                    kind: AssetKind::Image,
                    stem,
                } => {
                    let image = sink.load_image(&name, &path, &catalogs)?;
                    (stem, NodeValue::Image(image))
                }
                FileClass::Asset { kind, stem } => {
                    let node = &self.nodes[id];
                    let file = sink.attach_file(kind, &path, &node.language, &node.relative_url)?;
                    (stem, NodeValue::File(file))
                }
                FileClass::Forbidden | FileClass::Content | FileClass::Unknown => continue,
            };
            self.add_value(id, &stem, value, &path);
        }
        Ok(())
    }

    fn new_node(&mut self, parent: NodeId, path: &Path, name: &str, kind: NodeKind) -> Result<NodeId, TreeError> {
        let parent_node = &self.nodes[parent];
        let relative_url = if parent_node.relative_url.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_node.relative_url, name)
        };
        let descriptor = match kind {
            NodeKind::Page => Some(ContentBox::load(&path.join(PAGE_DESCRIPTOR))?),
            _ => None,
        };
        let node = ContentNode {
            root: path.to_path_buf(),
            language: parent_node.language.clone(),
            level: parent_node.level + 1,
            kind,
            relative_url,
            parent: Some(parent),
            children: Vec::new(),
            sort_keys: Vec::new(),
            values: BTreeMap::new(),
            descriptor,
        };
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn add_value(&mut self, id: NodeId, name: &str, value: NodeValue, path: &Path) {
        let key = naming::normalize(name);
        if self.nodes[id].values.insert(key.clone(), value).is_some() {
            self.warn(BuildWarning::NameCollision {
                name: key,
                path: path.display().to_string(),
            });
        }
    }

    /// Attach `child` under `parent`: by name as a value, and in sorted
    /// position among the children.
    pub fn add_child(&mut self, parent: NodeId, name: &str, child: NodeId) {
        let child_path = self.nodes[child].root.clone();
        self.add_value(parent, name, NodeValue::Node(child), &child_path);
        self.nodes[child].parent = Some(parent);

        let key = match self.nodes[child].id() {
            Some(id) => SortKey::Id(id.to_string()),
            None => {
                if self.nodes[parent].kind == NodeKind::Page {
                    self.warn(BuildWarning::MissingId {
                        path: child_path.display().to_string(),
                    });
                }
                SortKey::Missing
            }
        };
        let node = &mut self.nodes[parent];
        let pos = node.sort_keys.partition_point(|k| k <= &key);
        node.sort_keys.insert(pos, key);
        node.children.insert(pos, child);
    }

    pub fn node(&self, id: NodeId) -> &ContentNode {
        &self.nodes[id]
    }

    pub fn root(&self) -> &ContentNode {
        &self.nodes[Self::ROOT]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    /// Every node below `id`, depth first in child order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// Collect the pages of this tree by id. The root is never a member.
    pub fn flatten(&self) -> PageSet {
        let mut set = PageSet {
            language: self.language.clone(),
            pages: BTreeMap::new(),
            warnings: Vec::new(),
        };
        for id in self.descendants(Self::ROOT) {
            let node = &self.nodes[id];
            if node.kind != NodeKind::Page {
                continue;
            }
            if set.pages.insert(node.page_key(), id).is_some() {
                let warning = BuildWarning::DuplicateId {
                    id: node.page_key(),
                    language: self.language.clone(),
                };
                warn!("{warning}");
                set.warnings.push(warning);
            }
        }
        set
    }
}

/// Pages of one language by identifier.
#[derive(Debug, Clone, Default)]
pub struct PageSet {
    pub language: String,
    pages: BTreeMap<String, NodeId>,
    pub warnings: Vec<BuildWarning>,
}

impl PageSet {
    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.pages.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pages.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.pages.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
