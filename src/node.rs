//! Generic document tree.
//!
//! Raw YAML is ingested into this fixed variant right at the boundary; nothing
//! downstream ever touches `serde_yaml::Value`. Every node remembers the file
//! it came from so that, after imports are spliced together, diagnostics can
//! still point at the right document.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::StructuralError;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: NodeValue,
    pub source: Arc<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(String),
    String(String),
}

/// Ordered mapping. Keys may repeat after import splicing; consumers decide
/// whether a repeat is a conflict.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Node,
}

/// Position of a node inside the (merged) tree, e.g. `interfaces[2].response.404`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<Segment>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

// ————————————————————————————————————————————————————————————————————————————
// NODE
// ————————————————————————————————————————————————————————————————————————————

impl Node {
    pub fn new(value: NodeValue, source: Arc<PathBuf>) -> Self {
        Self { value, source }
    }

    /// Parse YAML text and ingest it.
    pub fn from_yaml_str(src: &str, source: impl Into<PathBuf>) -> Result<Node, StructuralError> {
        let source = Arc::new(source.into());
        let value = serde_yaml::from_str::<serde_yaml::Value>(src).map_err(|error| {
            StructuralError::Parse {
                path: source.to_path_buf(),
                importer: None,
                source: error,
            }
        })?;
        Node::from_yaml(value, &source, &TreePath::root())
    }

    pub fn from_yaml(
        value: serde_yaml::Value,
        source: &Arc<PathBuf>,
        path: &TreePath,
    ) -> Result<Node, StructuralError> {
        use serde_yaml::Value;
        let value = match value {
            Value::Null => NodeValue::Scalar(Scalar::Null),
            Value::Bool(b) => NodeValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => NodeValue::Scalar(Scalar::Number(n.to_string())),
            Value::String(s) => NodeValue::Scalar(Scalar::String(s)),
            Value::Sequence(items) => {
                let items = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Node::from_yaml(item, source, &path.index(i)))
                    .collect::<Result<Vec<_>, _>>()?;
                NodeValue::Sequence(items)
            }
            Value::Mapping(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(StructuralError::InvalidShape {
                                file: source.to_path_buf(),
                                path: path.clone(),
                                message: format!(
                                    "mapping keys must be scalars, found {}",
                                    yaml_kind(&other)
                                ),
                            });
                        }
                    };
                    let value = Node::from_yaml(v, source, &path.key(&key))?;
                    entries.push(Entry { key, value });
                }
                NodeValue::Mapping(Mapping { entries })
            }
            Value::Tagged(tagged) => return Node::from_yaml(tagged.value, source, path),
        };
        Ok(Node { value, source: source.clone() })
    }

    pub fn file(&self) -> &Path {
        self.source.as_path()
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match &self.value {
            NodeValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.value {
            NodeValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// String scalars only; numbers and booleans are not type names.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, NodeValue::Scalar(Scalar::Null))
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.value {
            NodeValue::Scalar(Scalar::Null) => "null",
            NodeValue::Scalar(Scalar::Bool(_)) => "boolean",
            NodeValue::Scalar(Scalar::Number(_)) => "number",
            NodeValue::Scalar(Scalar::String(_)) => "string",
            NodeValue::Sequence(_) => "sequence",
            NodeValue::Mapping(_) => "mapping",
        }
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
        _ => "a scalar",
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MAPPING
// ————————————————————————————————————————————————————————————————————————————

impl Mapping {
    /// First entry under `key`.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TREE PATH
// ————————————————————————————————————————————————————————————————————————————

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.to_string()));
        Self(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(ix) => write!(f, "[{ix}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for TreePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ------------------------------- Tests ------------------------------------ //
