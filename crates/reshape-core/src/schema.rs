//! Field schemas and path flattening
//!
//! A template describes its fields as a tree. Mapping rules address fields by
//! path instead: `.` descends into an object, `[]` into an array's items.
//!
//! ```text
//! customer            Object
//! ├── name            String     → customer.name      String
//! └── orders          Array      → customer.orders[].sku  String
//!     └── sku         String       customer.orders[].qty  Integer
//!     └── qty         Integer
//! ```
//!
//! Persisted schemas are flat records with parent pointers; [`FieldArena`]
//! rebuilds trees from them without trusting that the records are acyclic.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

/// Kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Text
    String,
    /// Whole number
    Integer,
    /// Floating point number
    Decimal,
    /// true/false
    Boolean,
    /// Date and time
    DateTime,
    /// Nested object
    Object,
    /// Array of items
    Array,
}

impl FieldKind {
    /// Returns true for kinds that hold a single value
    pub fn is_scalar(self) -> bool {
        !matches!(self, FieldKind::Object | FieldKind::Array)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One field of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    /// Persistence id, present only for stored fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Field name
    pub name: String,

    /// Field kind
    pub kind: FieldKind,

    /// Element kind, only for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_kind: Option<FieldKind>,

    /// Members, only for objects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldNode>,

    /// Item shape, only for arrays of objects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_items: Vec<FieldNode>,
}

impl FieldNode {
    /// A scalar field
    pub fn scalar(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            item_kind: None,
            children: Vec::new(),
            children_items: Vec::new(),
        }
    }

    /// An object field with the given members
    pub fn object(name: impl Into<String>, children: Vec<FieldNode>) -> Self {
        Self {
            children,
            ..Self::scalar(name, FieldKind::Object)
        }
    }

    /// An array of scalars (or of opaque objects)
    pub fn array(name: impl Into<String>, item_kind: FieldKind) -> Self {
        Self {
            item_kind: Some(item_kind),
            ..Self::scalar(name, FieldKind::Array)
        }
    }

    /// An array whose items are objects with the given members
    pub fn array_of_objects(name: impl Into<String>, children_items: Vec<FieldNode>) -> Self {
        Self {
            item_kind: Some(FieldKind::Object),
            children_items,
            ..Self::scalar(name, FieldKind::Array)
        }
    }

    /// Set the persistence id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// A `(path, kind)` pair produced by flattening
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlatField {
    /// Dotted/bracket path, e.g. `items[].sku`
    pub path: String,
    /// Kind at that path
    pub kind: FieldKind,
}

impl FlatField {
    /// Create a flat field
    pub fn new(path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Flatten one field (and its descendants) under `prefix`
pub fn flatten(node: &FieldNode, prefix: &str) -> Vec<FlatField> {
    let mut out = Vec::new();
    let mut ancestors = Vec::new();
    flatten_into(node, prefix, &mut ancestors, &mut out);
    out
}

/// Flatten a template's top-level fields
pub fn flatten_fields(fields: &[FieldNode]) -> Vec<FlatField> {
    let mut out = Vec::new();
    let mut ancestors = Vec::new();
    for field in fields {
        flatten_into(field, "", &mut ancestors, &mut out);
    }
    out
}

fn flatten_into(
    node: &FieldNode,
    prefix: &str,
    ancestors: &mut Vec<i64>,
    out: &mut Vec<FlatField>,
) {
    let path = join(prefix, &node.name);

    // A node that reappears below itself is recorded as a leaf.
    let repeated = node.id.is_some_and(|id| ancestors.contains(&id));

    match node.kind {
        FieldKind::Object if !repeated && !node.children.is_empty() => {
            ancestors.extend(node.id);
            for child in &node.children {
                flatten_into(child, &path, ancestors, out);
            }
            if node.id.is_some() {
                ancestors.pop();
            }
        }
        FieldKind::Array
            if !repeated
                && node.item_kind == Some(FieldKind::Object)
                && !node.children_items.is_empty() =>
        {
            let items = format!("{}[]", path);
            ancestors.extend(node.id);
            for child in &node.children_items {
                flatten_into(child, &items, ancestors, out);
            }
            if node.id.is_some() {
                ancestors.pop();
            }
        }
        FieldKind::Array => out.push(FlatField::new(
            format!("{}[]", path),
            node.item_kind.unwrap_or(FieldKind::String),
        )),
        kind => out.push(FlatField::new(path, kind)),
    }
}

/// One step of a path: a name, and whether it descends into array items
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment<'a> {
    name: &'a str,
    array: bool,
}

fn segments(path: &str) -> Result<Vec<Segment<'_>>> {
    path.split('.')
        .map(|part| {
            let (name, array) = match part.strip_suffix("[]") {
                Some(name) => (name, true),
                None => (part, false),
            };
            if name.is_empty() || name.contains(['[', ']']) {
                return Err(Error::InvalidPath {
                    path: path.to_string(),
                    message: format!("bad segment '{}'", part),
                });
            }
            Ok(Segment { name, array })
        })
        .collect()
}

/// Rebuild a field tree from flattened entries
///
/// Siblings keep the order in which they first appear. Inverse of
/// [`flatten_fields`] for trees without duplicate sibling names.
pub fn unflatten(entries: &[FlatField]) -> Result<Vec<FieldNode>> {
    let mut roots = Vec::new();
    for entry in entries {
        let segments = segments(&entry.path)?;
        insert_path(&mut roots, &segments, entry)?;
    }
    Ok(roots)
}

fn insert_path(siblings: &mut Vec<FieldNode>, segments: &[Segment<'_>], entry: &FlatField) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(());
    };

    if rest.is_empty() {
        if siblings.iter().any(|n| n.name == segment.name) {
            return Err(Error::InvalidPath {
                path: entry.path.clone(),
                message: format!("'{}' is declared twice", segment.name),
            });
        }
        let node = if segment.array {
            FieldNode::array(segment.name, entry.kind)
        } else {
            FieldNode::scalar(segment.name, entry.kind)
        };
        siblings.push(node);
        return Ok(());
    }

    let index = match siblings.iter().position(|n| n.name == segment.name) {
        Some(index) => index,
        None => {
            let container = if segment.array {
                FieldNode::array_of_objects(segment.name, Vec::new())
            } else {
                FieldNode::object(segment.name, Vec::new())
            };
            siblings.push(container);
            siblings.len() - 1
        }
    };

    let container = &mut siblings[index];
    let children = match (segment.array, container.kind) {
        (false, FieldKind::Object) => &mut container.children,
        (true, FieldKind::Array) if container.item_kind == Some(FieldKind::Object) => {
            &mut container.children_items
        }
        _ => {
            return Err(Error::InvalidPath {
                path: entry.path.clone(),
                message: format!("'{}' is used both as a leaf and a container", segment.name),
            });
        }
    };
    insert_path(children, rest, entry)
}

/// Flat, persisted form of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    /// Record id
    pub id: i64,
    /// Parent record, `None` for top-level fields
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Field name
    pub name: String,
    /// Field kind
    pub kind: FieldKind,
    /// Element kind, only for arrays
    #[serde(default)]
    pub item_kind: Option<FieldKind>,
    /// True when this record describes an array item's member
    #[serde(default)]
    pub is_item: bool,
}

/// Arena of field records indexed by id, with a separate parent→children index
#[derive(Debug, Default)]
pub struct FieldArena {
    nodes: HashMap<i64, FieldRecord>,
    children: HashMap<i64, Vec<i64>>,
    roots: Vec<i64>,
}

impl FieldArena {
    /// Index a set of records. Later records with a duplicate id are ignored.
    pub fn from_records(records: impl IntoIterator<Item = FieldRecord>) -> Self {
        let mut arena = Self::default();
        for record in records {
            if arena.nodes.contains_key(&record.id) {
                tracing::warn!(id = record.id, name = %record.name, "duplicate field record ignored");
                continue;
            }
            match record.parent_id {
                Some(parent) => arena.children.entry(parent).or_default().push(record.id),
                None => arena.roots.push(record.id),
            }
            arena.nodes.insert(record.id, record);
        }
        arena
    }

    /// Number of records in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no records
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build the field trees rooted at top-level records
    ///
    /// Each id is expanded at most once; a repeated id becomes a leaf.
    pub fn build(&self) -> Vec<FieldNode> {
        let mut visited = HashSet::new();
        self.roots
            .iter()
            .filter_map(|id| self.build_node(*id, &mut visited))
            .collect()
    }

    fn build_node(&self, id: i64, visited: &mut HashSet<i64>) -> Option<FieldNode> {
        let record = self.nodes.get(&id)?;
        let mut node = FieldNode {
            id: Some(record.id),
            name: record.name.clone(),
            kind: record.kind,
            item_kind: match record.kind {
                FieldKind::Array => Some(record.item_kind.unwrap_or(FieldKind::String)),
                _ => None,
            },
            children: Vec::new(),
            children_items: Vec::new(),
        };

        if !visited.insert(id) {
            tracing::warn!(id, name = %record.name, "field record revisited; treating as leaf");
            return Some(node);
        }

        let child_ids = self.children.get(&id).map(Vec::as_slice).unwrap_or_default();
        for child_id in child_ids {
            let Some(child_record) = self.nodes.get(child_id) else {
                continue;
            };
            let is_item_member = node.kind == FieldKind::Array
                && node.item_kind == Some(FieldKind::Object)
                && child_record.is_item;
            let is_member = node.kind == FieldKind::Object && !child_record.is_item;
            if !is_item_member && !is_member {
                continue;
            }
            if let Some(child) = self.build_node(*child_id, visited) {
                if is_item_member {
                    node.children_items.push(child);
                } else {
                    node.children.push(child);
                }
            }
        }
        Some(node)
    }
}
