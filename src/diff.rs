//! Structural comparison of two documents.
//!
//! Top-level attributes are matched by key. Root-level blocks are matched
//! by key too, and their leaves compared by key and branch path. Every
//! difference is filed under the branch-point successor of the entity it
//! touches, so a conflict can be highlighted as a readable span.

use serde::Serialize;

use crate::multimap::OrderedMultiMap;
use crate::tree::{AttributeRef, Document, EntityId, Entry, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceKind {
    /// Only in the candidate.
    Addition,
    /// Only in the original.
    Deletion,
    /// In both, with different content.
    Change,
}

/// One side of a difference.
#[derive(Debug, Clone, Serialize)]
pub struct Side {
    #[serde(skip)]
    pub entry: Entry,
    pub id: EntityId,
    pub branch_point: EntityId,
    /// Keys of the enclosing blocks, outermost first.
    pub path: Vec<String>,
    pub source: String,
    /// Operator and value of a scalar, e.g. `= 2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Side {
    fn of(doc: &Document, entry: Entry) -> Self {
        let value = match entry {
            Entry::Attribute(a) => doc
                .attribute(a)
                .operand
                .as_ref()
                .map(|operand| format!("{} {}", operand.op, operand.value)),
            Entry::Node(_) => None,
        };
        Side {
            entry,
            id: doc.entity_id(entry),
            branch_point: doc.branch_point_successor(entry),
            path: doc.branch_path(entry).into_iter().map(str::to_string).collect(),
            source: doc.source_of(entry).to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Difference {
    pub kind: DifferenceKind,
    pub key: String,
    /// Key of the top-level entry the difference lives under.
    pub root_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Side>,
}

/// Every difference found, plus per-tree maps from branch-point id to the
/// indices of the differences localized there.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffRecord {
    differences: Vec<Difference>,
    original_changes: OrderedMultiMap<EntityId, usize>,
    candidate_changes: OrderedMultiMap<EntityId, usize>,
}

impl DiffRecord {
    pub fn differences(&self) -> &[Difference] {
        &self.differences
    }

    pub fn original_changes(&self) -> &OrderedMultiMap<EntityId, usize> {
        &self.original_changes
    }

    pub fn candidate_changes(&self) -> &OrderedMultiMap<EntityId, usize> {
        &self.candidate_changes
    }

    /// Distinct branch points touched, summed over both trees. Zero means
    /// nothing needs arbitration.
    ///
    /// A top-level attribute is its own branch point, since the climb stops
    /// below the document: changing two of them counts four, one per
    /// attribute per tree.
    pub fn conflict_count(&self) -> usize {
        self.original_changes.key_count() + self.candidate_changes.key_count()
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    /// Top-level keys with at least one difference, in discovery order.
    pub fn conflicting_root_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for difference in &self.differences {
            if !keys.contains(&difference.root_key.as_str()) {
                keys.push(&difference.root_key);
            }
        }
        keys
    }

    pub fn count(&self, kind: DifferenceKind) -> usize {
        self.differences.iter().filter(|d| d.kind == kind).count()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{} addition(s), {} deletion(s), {} change(s) across {} branch point(s)",
            self.count(DifferenceKind::Addition),
            self.count(DifferenceKind::Deletion),
            self.count(DifferenceKind::Change),
            self.conflict_count()
        )
    }

    /// Record a difference and file it under the branch point of each side
    /// present: deletions in the original map, additions in the candidate
    /// map, changes in both.
    fn push_keyed(
        &mut self,
        kind: DifferenceKind,
        key: &str,
        root_key: &str,
        original: Option<Side>,
        candidate: Option<Side>,
    ) {
        let index = self.differences.len();
        if let Some(side) = &original {
            self.original_changes.insert(side.branch_point, index);
        }
        if let Some(side) = &candidate {
            self.candidate_changes.insert(side.branch_point, index);
        }
        self.differences.push(Difference {
            kind,
            key: key.to_string(),
            root_key: root_key.to_string(),
            original,
            candidate,
        });
    }
}

struct Differ<'a> {
    original: &'a Document,
    candidate: &'a Document,
    record: DiffRecord,
}

/// Compare an original document against a candidate.
pub fn compare(original: &Document, candidate: &Document) -> DiffRecord {
    let mut differ = Differ {
        original,
        candidate,
        record: DiffRecord::default(),
    };
    differ.top_level_attributes();
    differ.root_level_nodes();
    tracing::debug!(
        "compared '{}' with '{}': {}",
        original.name(),
        candidate.name(),
        differ.record.summary()
    );
    differ.record
}

/// Top-level entries of one kind, grouped by key in source order.
fn top_level<T>(doc: &Document, select: impl Fn(Entry) -> Option<T>) -> OrderedMultiMap<String, T> {
    doc.entries()
        .iter()
        .filter_map(|e| select(*e).map(|item| (doc.key_of(*e).to_string(), item)))
        .collect()
}

fn as_attribute(entry: Entry) -> Option<AttributeRef> {
    match entry {
        Entry::Attribute(a) => Some(a),
        Entry::Node(_) => None,
    }
}

fn as_node(entry: Entry) -> Option<NodeRef> {
    match entry {
        Entry::Node(n) => Some(n),
        Entry::Attribute(_) => None,
    }
}

impl<'a> Differ<'a> {
    fn addition(&mut self, root_key: &str, entry: Entry) {
        let side = Side::of(self.candidate, entry);
        self.record.push_keyed(DifferenceKind::Addition, self.candidate.key_of(entry), root_key, None, Some(side));
    }

    fn deletion(&mut self, root_key: &str, entry: Entry) {
        let side = Side::of(self.original, entry);
        self.record.push_keyed(DifferenceKind::Deletion, self.original.key_of(entry), root_key, Some(side), None);
    }

    fn change(&mut self, root_key: &str, original: Entry, candidate: Entry) {
        let sides = (Side::of(self.original, original), Side::of(self.candidate, candidate));
        self.record.push_keyed(
            DifferenceKind::Change,
            self.original.key_of(original),
            root_key,
            Some(sides.0),
            Some(sides.1),
        );
    }

    /// Top-level scalars, paired by key. Repeated keys pair positionally:
    /// the n-th occurrence in the original with the n-th in the candidate.
    fn top_level_attributes(&mut self) {
        let original = top_level(self.original, as_attribute);
        let candidate = top_level(self.candidate, as_attribute);

        for (key, left) in original.iter() {
            let right = candidate.get(key);
            for (i, a) in left.iter().enumerate() {
                match right.get(i) {
                    Some(b) => {
                        if !self.original.attribute(*a).same_content(self.candidate.attribute(*b)) {
                            self.change(key, Entry::Attribute(*a), Entry::Attribute(*b));
                        }
                    }
                    None => self.deletion(key, Entry::Attribute(*a)),
                }
            }
            for b in right.iter().skip(left.len()) {
                self.addition(key, Entry::Attribute(*b));
            }
        }
        for (key, right) in candidate.iter() {
            if original.contains_key(key) {
                continue;
            }
            for b in right {
                self.addition(key, Entry::Attribute(*b));
            }
        }
    }

    /// Root-level blocks, paired by key (positionally for repeats). An
    /// unpartnered block is a whole-block addition or deletion.
    fn root_level_nodes(&mut self) {
        let original = top_level(self.original, as_node);
        let candidate = top_level(self.candidate, as_node);

        for (key, left) in original.iter() {
            let right = candidate.get(key);
            for (i, a) in left.iter().enumerate() {
                match right.get(i) {
                    Some(b) => self.compare_leaves(key, *a, *b),
                    None => self.deletion(key, Entry::Node(*a)),
                }
            }
            for b in right.iter().skip(left.len()) {
                self.addition(key, Entry::Node(*b));
            }
        }
        for (key, right) in candidate.iter() {
            if original.contains_key(key) {
                continue;
            }
            for b in right {
                self.addition(key, Entry::Node(*b));
            }
        }
    }

    /// Match the leaves of two paired root-level blocks.
    ///
    /// A leaf first looks for a same-key leaf at the same branch path; a
    /// match is a change only if the content differs. Failing that, a
    /// single same-key leaf anywhere else is taken as a move and reported
    /// as one change. No candidate, or several, is a deletion. Candidate
    /// leaves left over are additions.
    fn compare_leaves(&mut self, root_key: &str, original: NodeRef, candidate: NodeRef) {
        let left = self.original.leaves(original);
        let right = self.candidate.leaves(candidate);
        let before = self.record.differences.len();

        let mut left_match: Vec<Option<usize>> = vec![None; left.len()];
        let mut right_taken = vec![false; right.len()];

        // Exact branch-path matches first, so a later exact match is never
        // taken by an earlier fuzzy one.
        for (i, a) in left.iter().enumerate() {
            let key = &self.original.attribute(*a).key;
            let path = self.original.branch_path(Entry::Attribute(*a));
            let found = right.iter().enumerate().position(|(j, b)| {
                !right_taken[j]
                    && self.candidate.attribute(*b).key == *key
                    && self.candidate.branch_path(Entry::Attribute(*b)) == path
            });
            if let Some(j) = found {
                right_taken[j] = true;
                left_match[i] = Some(j);
                if !self.original.attribute(*a).same_content(self.candidate.attribute(right[j])) {
                    self.change(root_key, Entry::Attribute(*a), Entry::Attribute(right[j]));
                }
            }
        }

        for (i, a) in left.iter().enumerate() {
            if left_match[i].is_some() {
                continue;
            }
            let key = &self.original.attribute(*a).key;
            let fuzzy: Vec<usize> = right
                .iter()
                .enumerate()
                .filter(|(j, b)| !right_taken[*j] && self.candidate.attribute(**b).key == *key)
                .map(|(j, _)| j)
                .collect();
            match fuzzy.as_slice() {
                [j] => {
                    right_taken[*j] = true;
                    self.change(root_key, Entry::Attribute(*a), Entry::Attribute(right[*j]));
                }
                _ => self.deletion(root_key, Entry::Attribute(*a)),
            }
        }

        for (j, b) in right.iter().enumerate() {
            if !right_taken[j] {
                self.addition(root_key, Entry::Attribute(*b));
            }
        }

        // Blocks without leaves (e.g. a new empty block) escape the leaf
        // pass; catch them at the root-level pair.
        if self.record.differences.len() == before
            && !self.original.subtree_eq(Entry::Node(original), self.candidate, Entry::Node(candidate))
        {
            self.change(root_key, Entry::Node(original), Entry::Node(candidate));
        }
    }
}
