//! # site_map: normalized destination hierarchy built from source file paths
//!
//! A [`SiteMap`] turns a flat list of `/`-separated source paths into the tree of
//! pages that will be created at the destination. Nodes live in an arena owned by
//! the map and refer to each other by [`NodeId`]; the parent link is a plain index
//! used for lookups only.
//!
//! ## Construction
//! Paths are sorted before the tree is built. The sort fixes sibling order at the
//! destination and decides which file represents a directory that has no index
//! file, so it must happen before any node is created.
//!
//! ## Normalization
//! Runs once, in this order:
//! 1. **Collapse**: while the root has a single child that is a pure grouping node
//!    (no file, no extension in its name), that child is replaced by its children.
//! 2. **Promotion** (post-order): a grouping node takes over its `index.<ext>` child,
//!    or failing that its first child backed by a real document. The promoted child
//!    disappears and its own children are spliced in its place.
//! 3. **Root index**: a root without a file absorbs the index file that sits at the
//!    root's (possibly collapsed) directory. The root keeps its empty id.
//!
//! Grouping nodes without any eligible child survive normalization unchanged.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Path separator for source paths and node ids.
pub const SEPARATOR: char = '/';

/// Name shown for the root in [`SiteMap::preview_json`].
pub const ROOT_PREVIEW_LABEL: &str = "Destination parent page";

const INDEX_STEM: &str = "index.";

/// Handle to a node inside a [`SiteMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One node of the destination hierarchy.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Path-derived identifier, unique within the map. Empty for the root.
    pub id: String,
    /// Final path segment.
    pub name: String,
    /// Source file backing this node, empty for a pure grouping node.
    pub filepath: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl TreeNode {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            filepath: String::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_grouping(&self) -> bool {
        self.filepath.is_empty()
    }
}

/// Serialized form of a node. Parent links are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMapNode {
    pub id: String,
    pub name: String,
    pub filepath: String,
    #[serde(default)]
    pub children: Vec<SiteMapNode>,
}

/// Serialized form of a whole map: `{ "root": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSiteMap {
    pub root: SiteMapNode,
}

#[derive(Debug, thiserror::Error)]
pub enum SiteMapError {
    #[error("failed to (de)serialize site map")]
    Json(#[from] serde_json::Error),
    #[error("serialized site map root must have an empty id, found `{0}`")]
    RootId(String),
}

#[derive(Debug, Clone)]
pub struct SiteMap {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl Default for SiteMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteMap {
    /// A map holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new(String::new(), String::new())],
            root: NodeId(0),
        }
    }

    /// Sorts `paths`, builds the tree and normalizes it.
    pub fn build_from_file_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<String> = paths.into_iter().map(|p| p.as_ref().to_owned()).collect();
        sorted.sort();

        let mut map = SiteMap::new();
        let mut by_id: HashMap<String, NodeId> = HashMap::new();
        for path in &sorted {
            map.insert_path(path, &mut by_id);
        }
        debug!(paths = sorted.len(), nodes = map.nodes.len(), "Built raw site map");

        map.normalize();
        map
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    /// Children of `id`, in stored order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &TreeNode)> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .map(move |child| (*child, &self.nodes[child.0]))
    }

    /// Looks a node up by its path-derived id.
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.walk(self.root).find(|n| self.nodes[n.0].id == id)
    }

    /// Number of reachable nodes, root included.
    pub fn len(&self) -> usize {
        self.walk(self.root).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.nodes[self.root.0].has_children() && self.nodes[self.root.0].is_grouping()
    }

    /// Pre-order walk starting at `from`.
    pub fn walk(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![from];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
            Some(next)
        })
    }

    fn push_node(&mut self, mut node: TreeNode, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn insert_path(&mut self, path: &str, by_id: &mut HashMap<String, NodeId>) {
        let segments: Vec<&str> = path.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        let mut current = self.root;
        let mut prefix = String::new();

        for (depth, segment) in segments.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push(SEPARATOR);
            }
            prefix.push_str(segment);

            let next = match by_id.get(&prefix) {
                Some(existing) => *existing,
                None => {
                    let created =
                        self.push_node(TreeNode::new(prefix.clone(), (*segment).to_owned()), current);
                    by_id.insert(prefix.clone(), created);
                    created
                }
            };
            if depth + 1 == segments.len() {
                self.nodes[next.0].filepath = path.to_owned();
            }
            current = next;
        }
    }

    /// Applies collapse, promotion and root-index rules once.
    pub fn normalize(&mut self) {
        let prefix = self.collapse_root();

        let top_level = self.nodes[self.root.0].children.clone();
        for child in top_level {
            self.promote_post_order(child);
        }

        if self.nodes[self.root.0].is_grouping() {
            let root = self.root;
            let index = self.nodes[root.0]
                .children
                .iter()
                .copied()
                .find(|c| is_index_of(&self.nodes[c.0].filepath, &prefix));
            if let Some(index) = index {
                debug!(filepath = %self.nodes[index.0].filepath, "Promoting index file to root");
                self.adopt(root, index, false);
            }
        }

        self.compact();
    }

    /// Returns the id of the last collapsed directory, or empty if none was.
    fn collapse_root(&mut self) -> String {
        let mut prefix = String::new();
        loop {
            let only = match self.nodes[self.root.0].children.as_slice() {
                [only] => *only,
                _ => break,
            };
            let child = &self.nodes[only.0];
            if !child.is_grouping() || has_extension(&child.name) {
                break;
            }
            debug!(collapsed = %child.id, "Collapsing wrapper directory into root");
            prefix = child.id.clone();

            let grandchildren = std::mem::take(&mut self.nodes[only.0].children);
            for grandchild in &grandchildren {
                self.nodes[grandchild.0].parent = Some(self.root);
            }
            self.nodes[only.0].parent = None;
            self.nodes[self.root.0].children = grandchildren;
        }
        prefix
    }

    fn promote_post_order(&mut self, node: NodeId) {
        let children = self.nodes[node.0].children.clone();
        for child in children {
            self.promote_post_order(child);
        }
        if !self.nodes[node.0].is_grouping() {
            return;
        }

        let dir = self.nodes[node.0].id.clone();
        let children = &self.nodes[node.0].children;
        let candidate = children
            .iter()
            .copied()
            .find(|c| is_index_of(&self.nodes[c.0].filepath, &dir))
            .or_else(|| {
                children
                    .iter()
                    .copied()
                    .find(|c| is_document_path(&self.nodes[c.0].filepath))
            });

        match candidate {
            Some(child) => {
                debug!(node = %dir, promoted = %self.nodes[child.0].filepath, "Promoting child document");
                self.adopt(node, child, true);
            }
            None => debug!(node = %dir, "No eligible document, keeping grouping node"),
        }
    }

    /// Moves `child`'s identity into `node` and splices its children in its place.
    fn adopt(&mut self, node: NodeId, child: NodeId, take_id: bool) {
        let grandchildren = std::mem::take(&mut self.nodes[child.0].children);
        for grandchild in &grandchildren {
            self.nodes[grandchild.0].parent = Some(node);
        }
        if let Some(pos) = self.nodes[node.0].children.iter().position(|c| *c == child) {
            self.nodes[node.0].children.splice(pos..=pos, grandchildren);
        }

        let filepath = self.nodes[child.0].filepath.clone();
        self.nodes[node.0].filepath = filepath;
        if take_id {
            let id = self.nodes[child.0].id.clone();
            self.nodes[node.0].id = id;
        }
        self.nodes[child.0].parent = None;
    }

    /// Drops arena slots that are no longer reachable from the root.
    fn compact(&mut self) {
        *self = Self::from_snapshot(&self.snapshot());
    }

    /// Owned, parent-free copy of the tree.
    pub fn snapshot(&self) -> SerializedSiteMap {
        SerializedSiteMap {
            root: self.snapshot_node(self.root),
        }
    }

    fn snapshot_node(&self, id: NodeId) -> SiteMapNode {
        let node = &self.nodes[id.0];
        SiteMapNode {
            id: node.id.clone(),
            name: node.name.clone(),
            filepath: node.filepath.clone(),
            children: node.children.iter().map(|c| self.snapshot_node(*c)).collect(),
        }
    }

    /// Rebuilds the arena, restoring parent links.
    pub fn from_snapshot(snapshot: &SerializedSiteMap) -> Self {
        let mut map = SiteMap {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        map.load_node(&snapshot.root, None);
        map
    }

    fn load_node(&mut self, source: &SiteMapNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            id: source.id.clone(),
            name: source.name.clone(),
            filepath: source.filepath.clone(),
            children: Vec::with_capacity(source.children.len()),
            parent,
        });
        for child in &source.children {
            let child_id = self.load_node(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn to_json(&self) -> Result<String, SiteMapError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self, SiteMapError> {
        let snapshot: SerializedSiteMap = serde_json::from_str(json)?;
        if !snapshot.root.id.is_empty() {
            return Err(SiteMapError::RootId(snapshot.root.id));
        }
        Ok(Self::from_snapshot(&snapshot))
    }

    /// Indented plain-text tree, one `├─ <id> (<name>)` line per non-root node.
    pub fn render_text_tree(&self) -> String {
        let mut out = String::new();
        self.render_children(self.root, "", &mut out);
        out
    }

    fn render_children(&self, id: NodeId, prefix: &str, out: &mut String) {
        let children = &self.nodes[id.0].children;
        for (i, child) in children.iter().enumerate() {
            let node = &self.nodes[child.0];
            let _ = writeln!(out, "{prefix}├─ {} ({})", node.id, node.name);
            let continuation = if i + 1 == children.len() { "    " } else { "│   " };
            self.render_children(*child, &format!("{prefix}{continuation}"), out);
        }
    }

    /// `{ name, id, children }` tree with the root labelled [`ROOT_PREVIEW_LABEL`].
    pub fn preview_json(&self) -> Value {
        let mut value = self.preview_node(self.root);
        value["name"] = Value::String(ROOT_PREVIEW_LABEL.to_owned());
        value
    }

    fn preview_node(&self, id: NodeId) -> Value {
        let node = &self.nodes[id.0];
        let children: Vec<Value> = node.children.iter().map(|c| self.preview_node(*c)).collect();
        json!({
            "name": node.name,
            "id": node.id,
            "children": children,
        })
    }
}

fn has_extension(name: &str) -> bool {
    name.rfind('.').is_some_and(|dot| dot > 0 && dot + 1 < name.len())
}

/// True when `filepath` is `<dir>/index.<ext>` (or `index.<ext>` for an empty `dir`).
fn is_index_of(filepath: &str, dir: &str) -> bool {
    let rest = if dir.is_empty() {
        Some(filepath)
    } else {
        filepath
            .strip_prefix(dir)
            .and_then(|r| r.strip_prefix(SEPARATOR))
    };
    rest.and_then(|r| r.strip_prefix(INDEX_STEM))
        .is_some_and(|ext| !ext.is_empty() && !ext.contains(SEPARATOR))
}

fn is_document_path(filepath: &str) -> bool {
    !filepath.is_empty() && !filepath.ends_with(SEPARATOR)
}
