//! The semantic tree: a [`Document`] owning its [`Node`]s and
//! [`Attribute`]s in two arenas.
//!
//! Entities refer to each other by arena index. A node lists its entries
//! (attributes and child nodes, interleaved in source order); every entity
//! records its parent index for upward traversal. Ownership only flows
//! downwards through the arenas.

use std::collections::HashMap;
use std::fmt;

use crate::multimap::OrderedMultiMap;
use crate::value::{Operator, Value};

/// Per-document identity, assigned when the entity is created.
pub type EntityId = u32;

/// Index of a node in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

/// Index of an attribute in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeRef(usize);

/// One entry of a node: either a scalar or a nested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Node(NodeRef),
    Attribute(AttributeRef),
}

/// Operator and value of a non-bare attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub op: Operator,
    pub value: Value,
}

/// A scalar entry: `key = value`, `key > value`, or a bare `key`.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub id: EntityId,
    pub key: String,
    /// `None` for a bare statement.
    pub operand: Option<Operand>,
    pub source: String,
    parent: NodeRef,
}

impl Attribute {
    pub fn parent(&self) -> NodeRef {
        self.parent
    }

    pub fn is_statement(&self) -> bool {
        self.operand.is_none()
    }

    pub fn is_query(&self) -> bool {
        self.operand.as_ref().is_some_and(|o| o.op.is_comparison())
    }

    /// Same key, operator and value. Provenance is not content.
    pub fn same_content(&self, other: &Attribute) -> bool {
        self.key == other.key && self.operand == other.operand
    }
}

/// A keyed block.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: EntityId,
    pub key: String,
    pub source: String,
    entries: Vec<Entry>,
    parent: Option<NodeRef>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    /// Attributes and child nodes in source order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn attributes(&self) -> impl Iterator<Item = AttributeRef> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Attribute(a) => Some(*a),
            Entry::Node(_) => None,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Node(n) => Some(*n),
            Entry::Attribute(_) => None,
        })
    }

    /// More than one attribute or child. Single-entry wrappers are not
    /// branch points.
    pub fn is_branch_point(&self) -> bool {
        self.entries.len() > 1
    }
}

/// Structural type of an entry, as shown to whoever arbitrates a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Block,
    Scalar(Operator),
    Statement,
}

impl EntryType {
    /// Blocks, scalars and statements are different structures; the
    /// operator of a scalar is not part of its structure.
    pub fn same_structure(self, other: EntryType) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Block => f.write_str("={"),
            EntryType::Scalar(op) => f.write_str(op.as_str()),
            EntryType::Statement => f.write_str("statement"),
        }
    }
}

/// Replace every whitespace character of a provenance label with `_`.
pub fn sanitize_source(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Root of one parsed file. The document is itself a node (the root of
/// the node arena) and the authority that hands out entity ids.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    attributes: Vec<Attribute>,
    next_id: EntityId,
    /// Branch-point successor of every reachable entry, filled by
    /// [`Document::prune`]. `None` until pruned or after a splice.
    successors: Option<HashMap<Entry, EntityId>>,
}

impl Document {
    pub const ROOT: NodeRef = NodeRef(0);

    pub fn new(name: &str, source: &str) -> Self {
        let root = Node {
            id: 0,
            key: name.to_string(),
            source: sanitize_source(source),
            entries: Vec::new(),
            parent: None,
        };
        Document {
            nodes: vec![root],
            attributes: Vec::new(),
            next_id: 1,
            successors: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.nodes[0].key
    }

    pub fn source(&self) -> &str {
        &self.nodes[0].source
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn id(&self) -> EntityId {
        self.nodes[0].id
    }

    /// Top-level entries in source order.
    pub fn entries(&self) -> &[Entry] {
        &self.nodes[0].entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node.0]
    }

    pub fn attribute(&self, attribute: AttributeRef) -> &Attribute {
        &self.attributes[attribute.0]
    }

    // ── Construction ─────────────────────────────────────────────────

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_node(&mut self, parent: NodeRef, key: &str, source: &str) -> NodeRef {
        let id = self.allocate_id();
        self.nodes.push(Node {
            id,
            key: key.to_string(),
            source: sanitize_source(source),
            entries: Vec::new(),
            parent: Some(parent),
        });
        NodeRef(self.nodes.len() - 1)
    }

    fn create_attribute(
        &mut self,
        parent: NodeRef,
        key: &str,
        operand: Option<Operand>,
        source: &str,
    ) -> AttributeRef {
        let id = self.allocate_id();
        self.attributes.push(Attribute {
            id,
            key: key.to_string(),
            operand,
            source: sanitize_source(source),
            parent,
        });
        AttributeRef(self.attributes.len() - 1)
    }

    /// Append a new block under `parent`.
    pub fn add_node(&mut self, parent: NodeRef, key: &str, source: &str) -> NodeRef {
        let node = self.create_node(parent, key, source);
        self.nodes[parent.0].entries.push(Entry::Node(node));
        self.successors = None;
        node
    }

    /// Append a new scalar (or bare statement when `operand` is `None`) under `parent`.
    pub fn add_attribute(
        &mut self,
        parent: NodeRef,
        key: &str,
        operand: Option<Operand>,
        source: &str,
    ) -> AttributeRef {
        let attribute = self.create_attribute(parent, key, operand, source);
        self.nodes[parent.0].entries.push(Entry::Attribute(attribute));
        self.successors = None;
        attribute
    }

    // ── Entry accessors ──────────────────────────────────────────────

    pub fn entity_id(&self, entry: Entry) -> EntityId {
        match entry {
            Entry::Node(n) => self.node(n).id,
            Entry::Attribute(a) => self.attribute(a).id,
        }
    }

    pub fn key_of(&self, entry: Entry) -> &str {
        match entry {
            Entry::Node(n) => &self.node(n).key,
            Entry::Attribute(a) => &self.attribute(a).key,
        }
    }

    pub fn source_of(&self, entry: Entry) -> &str {
        match entry {
            Entry::Node(n) => &self.node(n).source,
            Entry::Attribute(a) => &self.attribute(a).source,
        }
    }

    pub fn parent_of(&self, entry: Entry) -> Option<NodeRef> {
        match entry {
            Entry::Node(n) => self.node(n).parent,
            Entry::Attribute(a) => Some(self.attribute(a).parent),
        }
    }

    pub fn entry_type(&self, entry: Entry) -> EntryType {
        match entry {
            Entry::Node(_) => EntryType::Block,
            Entry::Attribute(a) => match &self.attribute(a).operand {
                Some(operand) => EntryType::Scalar(operand.op),
                None => EntryType::Statement,
            },
        }
    }

    /// Overwrite the provenance of one entity.
    pub fn set_source(&mut self, entry: Entry, source: &str) {
        let source = sanitize_source(source);
        match entry {
            Entry::Node(n) => self.nodes[n.0].source = source,
            Entry::Attribute(a) => self.attributes[a.0].source = source,
        }
    }

    /// Look an entity up by id among the entries reachable from the root.
    pub fn find(&self, id: EntityId) -> Option<Entry> {
        self.walk().into_iter().find(|e| self.entity_id(*e) == id)
    }

    /// Every entry reachable from the root, depth first, in source order.
    pub fn walk(&self) -> Vec<Entry> {
        let mut out = Vec::new();
        self.walk_into(Self::ROOT, &mut out);
        out
    }

    fn walk_into(&self, node: NodeRef, out: &mut Vec<Entry>) {
        for entry in self.node(node).entries() {
            out.push(*entry);
            if let Entry::Node(child) = entry {
                self.walk_into(*child, out);
            }
        }
    }

    /// Every attribute in the subtree below `node`, in source order.
    pub fn leaves(&self, node: NodeRef) -> Vec<AttributeRef> {
        let mut entries = Vec::new();
        self.walk_into(node, &mut entries);
        entries
            .into_iter()
            .filter_map(|e| match e {
                Entry::Attribute(a) => Some(a),
                Entry::Node(_) => None,
            })
            .collect()
    }

    /// Keys of the nodes enclosing `entry`, outermost first. The document
    /// itself is not part of the path.
    pub fn branch_path(&self, entry: Entry) -> Vec<&str> {
        let mut path = Vec::new();
        let mut parent = self.parent_of(entry);
        while let Some(node) = parent {
            if node == Self::ROOT {
                break;
            }
            path.push(self.node(node).key.as_str());
            parent = self.node(node).parent;
        }
        path.reverse();
        path
    }

    /// The direct child of the document that contains `entry`.
    pub fn top_level_entry(&self, entry: Entry) -> Entry {
        let mut current = entry;
        while let Some(parent) = self.parent_of(current) {
            if parent == Self::ROOT {
                break;
            }
            current = Entry::Node(parent);
        }
        current
    }

    /// Group the top-level entries by key, keeping duplicates in order.
    pub fn top_level_by_key(&self) -> OrderedMultiMap<String, Entry> {
        self.entries()
            .iter()
            .map(|e| (self.key_of(*e).to_string(), *e))
            .collect()
    }

    // ── Branch points ────────────────────────────────────────────────

    /// Id of the nearest enclosing branch point of `entry`.
    ///
    /// A node that is itself a branch point is its own successor. The climb
    /// stops at the top-level entry when no branch point is met before it.
    pub fn branch_point_successor(&self, entry: Entry) -> EntityId {
        if let Some(id) = self.successors.as_ref().and_then(|s| s.get(&entry)) {
            return *id;
        }
        self.climb(entry)
    }

    fn climb(&self, entry: Entry) -> EntityId {
        let mut current = entry;
        loop {
            if let Entry::Node(node) = current {
                if self.node(node).is_branch_point() {
                    return self.node(node).id;
                }
            }
            match self.parent_of(current) {
                Some(parent) if parent != Self::ROOT => current = Entry::Node(parent),
                _ => return self.entity_id(current),
            }
        }
    }

    /// Collapse single-entry wrapper chains once: every reachable entry is
    /// mapped straight to its branch-point successor.
    pub fn prune(&mut self) {
        let successors = self
            .walk()
            .into_iter()
            .map(|entry| (entry, self.climb(entry)))
            .collect();
        self.successors = Some(successors);
    }

    pub fn is_pruned(&self) -> bool {
        self.successors.is_some()
    }

    // ── Comparison ───────────────────────────────────────────────────

    /// Compare two subtrees by key, operator, value and entry order.
    /// Provenance and ids are ignored.
    pub fn subtree_eq(&self, entry: Entry, other: &Document, other_entry: Entry) -> bool {
        match (entry, other_entry) {
            (Entry::Attribute(a), Entry::Attribute(b)) => {
                self.attribute(a).same_content(other.attribute(b))
            }
            (Entry::Node(a), Entry::Node(b)) => {
                let (a, b) = (self.node(a), other.node(b));
                a.key == b.key
                    && a.entries.len() == b.entries.len()
                    && a.entries
                        .iter()
                        .zip(&b.entries)
                        .all(|(x, y)| self.subtree_eq(*x, other, *y))
            }
            _ => false,
        }
    }

    /// Same top-level content, entry for entry.
    pub fn content_eq(&self, other: &Document) -> bool {
        self.entries().len() == other.entries().len()
            && self
                .entries()
                .iter()
                .zip(other.entries())
                .all(|(a, b)| self.subtree_eq(*a, other, *b))
    }

    // ── Splicing ─────────────────────────────────────────────────────

    /// Deep-copy `entry` from another document. The copy gets fresh ids
    /// from this document and `parent` as its parent, but is not yet
    /// listed among the parent's entries.
    fn copy_entry(&mut self, parent: NodeRef, from: &Document, entry: Entry) -> Entry {
        match entry {
            Entry::Attribute(a) => {
                let attribute = from.attribute(a);
                Entry::Attribute(self.create_attribute(
                    parent,
                    &attribute.key,
                    attribute.operand.clone(),
                    &attribute.source,
                ))
            }
            Entry::Node(n) => {
                let node = from.node(n);
                let copy = self.create_node(parent, &node.key, &node.source);
                for child in node.entries() {
                    let child_copy = self.copy_entry(copy, from, *child);
                    self.nodes[copy.0].entries.push(child_copy);
                }
                Entry::Node(copy)
            }
        }
    }

    /// Append a deep copy of another document's entry under `parent`.
    pub fn graft(&mut self, parent: NodeRef, from: &Document, entry: Entry) -> Entry {
        let copy = self.copy_entry(parent, from, entry);
        self.nodes[parent.0].entries.push(copy);
        self.successors = None;
        copy
    }

    /// Overwrite every top-level entry under `key` with copies of
    /// `replacement` (entries of `from`). The copies take the place of the
    /// first removed entry, or go to the end when `key` was absent.
    /// Returns how many entries were removed.
    ///
    /// Removed entries are unlinked, not freed: the arenas keep them until
    /// the document is dropped.
    pub fn replace_top_level(&mut self, key: &str, from: &Document, replacement: &[Entry]) -> usize {
        let old = self.nodes[0].entries.clone();
        let first = old.iter().position(|e| self.key_of(*e) == key);
        let mut kept: Vec<Entry> = old
            .iter()
            .copied()
            .filter(|e| self.key_of(*e) != key)
            .collect();
        let removed = old.len() - kept.len();

        let copies: Vec<Entry> = replacement
            .iter()
            .map(|e| self.copy_entry(Self::ROOT, from, *e))
            .collect();
        let at = first.unwrap_or(kept.len());
        kept.splice(at..at, copies);

        self.nodes[0].entries = kept;
        self.successors = None;
        removed
    }
}
