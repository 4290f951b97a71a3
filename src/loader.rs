//! Document loading and `_import` resolution.
//!
//! An `_import` key inside a mapping is replaced, in place, by the entries of
//! the referenced file(s); a sequence item consisting solely of `_import` is
//! replaced by the imported sequence's items. Import paths are always
//! relative to the root document's directory. Repeated keys are kept in
//! first-seen order and left for the semantic passes to diagnose.
//!
//! Sibling imports (one `_import` list) may be loaded in parallel; results
//! are merged in declaration order, never completion order.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::diagnostics::{Code, Diagnostics, Location};
use crate::error::{ImportSite, StructuralError};
use crate::node::{Entry, Mapping, Node, NodeValue, Scalar, TreePath};
use crate::validate::ValidateOptions;

pub const IMPORT_KEY: &str = "_import";

/// The merged tree after import resolution.
#[derive(Debug, Clone)]
pub struct Document {
    pub root: Node,
    /// Every file read, root first, in merge order.
    pub files: Vec<PathBuf>,
    /// Conflicts found while coalescing top-level sections.
    pub diagnostics: Diagnostics,
}

impl Document {
    /// Build from an already merged root; checks the top-level shape and
    /// coalesces repeated sections.
    pub fn from_root(root: Node, files: Vec<PathBuf>) -> Result<Document, StructuralError> {
        let Some(map) = root.as_mapping() else {
            return Err(StructuralError::InvalidShape {
                file: root.file().to_path_buf(),
                path: TreePath::root(),
                message: format!("document root must be a mapping, found {}", root.kind_name()),
            });
        };
        let mut diagnostics = Diagnostics::new();
        let mut entries: Vec<Entry> = Vec::new();
        for entry in &map.entries {
            let value = match entry.key.as_str() {
                "types" => check_types_shape(&entry.value)?,
                "interfaces" => normalize_interfaces(&entry.value)?,
                _ => entry.value.clone(),
            };
            match entries.iter_mut().find(|e| e.key == entry.key) {
                None => entries.push(Entry { key: entry.key.clone(), value }),
                Some(existing) => {
                    if !coalesce(&mut existing.value, value.clone()) {
                        diagnostics.error(
                            Code::DuplicateDeclaration,
                            format!("section `{}` is declared more than once", entry.key),
                            Location::new(value.file(), TreePath::root().key(&entry.key)),
                        );
                    }
                }
            }
        }
        let root = Node::new(NodeValue::Mapping(Mapping { entries }), root.source.clone());
        Ok(Document { root, files, diagnostics })
    }

    pub fn section(&self, name: &str) -> Option<&Node> {
        self.root.as_mapping().and_then(|m| m.get(name))
    }

    pub fn types(&self) -> Option<&Node> {
        self.section("types")
    }

    /// Interface entries, already flattened into one sequence.
    pub fn interfaces(&self) -> &[Node] {
        self.section("interfaces").and_then(Node::as_sequence).unwrap_or(&[])
    }
}

fn check_types_shape(node: &Node) -> Result<Node, StructuralError> {
    if node.as_mapping().is_some() {
        return Ok(node.clone());
    }
    if node.is_null() {
        return Ok(Node::new(NodeValue::Mapping(Mapping::default()), node.source.clone()));
    }
    Err(StructuralError::InvalidShape {
        file: node.file().to_path_buf(),
        path: TreePath::root().key("types"),
        message: format!("`types` must be a mapping, found {}", node.kind_name()),
    })
}

/// `interfaces` is a sequence, or a mapping holding a `declarations` sequence.
fn normalize_interfaces(node: &Node) -> Result<Node, StructuralError> {
    let path = TreePath::root().key("interfaces");
    let shape_error = |message: String| StructuralError::InvalidShape {
        file: node.file().to_path_buf(),
        path: path.clone(),
        message,
    };
    match &node.value {
        NodeValue::Sequence(_) => Ok(node.clone()),
        NodeValue::Mapping(map) => {
            let mut items = Vec::new();
            for (key, value) in map.iter() {
                if key != "declarations" {
                    return Err(shape_error(format!("unexpected key `{key}` in `interfaces`")));
                }
                match value.as_sequence() {
                    Some(seq) => items.extend(seq.iter().cloned()),
                    None => {
                        return Err(shape_error(format!(
                            "`declarations` must be a sequence, found {}",
                            value.kind_name()
                        )));
                    }
                }
            }
            Ok(Node::new(NodeValue::Sequence(items), node.source.clone()))
        }
        _ if node.is_null() => Ok(Node::new(NodeValue::Sequence(Vec::new()), node.source.clone())),
        _ => Err(shape_error(format!(
            "`interfaces` must be a sequence, found {}",
            node.kind_name()
        ))),
    }
}

/// Sections of the same kind merge and an empty one merges with anything;
/// any other pairing is a conflict.
fn coalesce(existing: &mut Node, incoming: Node) -> bool {
    if incoming.is_null() {
        return true;
    }
    if existing.is_null() {
        *existing = incoming;
        return true;
    }
    match (&mut existing.value, incoming.value) {
        (NodeValue::Mapping(a), NodeValue::Mapping(b)) => {
            a.entries.extend(b.entries);
            true
        }
        (NodeValue::Sequence(a), NodeValue::Sequence(b)) => {
            a.extend(b);
            true
        }
        _ => false,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LOADING
// ————————————————————————————————————————————————————————————————————————————

pub fn load(root: impl AsRef<Path>) -> Result<Document, StructuralError> {
    load_with(root, &ValidateOptions::default())
}

pub fn load_with(root: impl AsRef<Path>, options: &ValidateOptions) -> Result<Document, StructuralError> {
    let root = root.as_ref();
    let root_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
    let loader = Loader { root_dir, parallel: options.parallel_imports };
    let loaded = loader.load_file(root, &[], None)?;
    tracing::debug!(files = loaded.files.len(), root = %root.display(), "document loaded");
    Document::from_root(loaded.node, loaded.files)
}

struct Loader {
    root_dir: PathBuf,
    parallel: bool,
}

struct Loaded {
    node: Node,
    files: Vec<PathBuf>,
}

impl Loader {
    fn load_file(
        &self,
        path: &Path,
        stack: &[PathBuf],
        importer: Option<ImportSite>,
    ) -> Result<Loaded, StructuralError> {
        let io_error = |source| StructuralError::Io {
            path: path.to_path_buf(),
            importer: importer.clone(),
            source,
        };
        let identity = std::fs::canonicalize(path).map_err(io_error)?;
        if stack.contains(&identity) {
            let mut chain = stack.to_vec();
            chain.push(identity);
            return Err(StructuralError::ImportCycle { chain });
        }
        let text = std::fs::read_to_string(path).map_err(io_error)?;
        let source = Arc::new(path.to_path_buf());
        let value = serde_yaml::from_str::<serde_yaml::Value>(&text).map_err(|source| {
            StructuralError::Parse {
                path: path.to_path_buf(),
                importer: importer.clone(),
                source,
            }
        })?;
        let node = Node::from_yaml(value, &source, &TreePath::root())?;
        tracing::trace!(file = %path.display(), "parsed document");

        let mut stack = stack.to_vec();
        stack.push(identity);
        let mut files = vec![path.to_path_buf()];
        let node = self.expand(node, &TreePath::root(), &stack, &mut files)?;
        Ok(Loaded { node, files })
    }

    fn expand(
        &self,
        node: Node,
        path: &TreePath,
        stack: &[PathBuf],
        files: &mut Vec<PathBuf>,
    ) -> Result<Node, StructuralError> {
        let source = node.source;
        let value = match node.value {
            NodeValue::Scalar(s) => NodeValue::Scalar(s),
            NodeValue::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let item_path = path.index(i);
                    let import_only = item
                        .as_mapping()
                        .is_some_and(|m| m.len() == 1 && m.contains_key(IMPORT_KEY));
                    if !import_only {
                        out.push(self.expand(item, &item_path, stack, files)?);
                        continue;
                    }
                    let Some(directive) = item.as_mapping().and_then(|m| m.get(IMPORT_KEY)) else {
                        continue;
                    };
                    for imported in self.imports(directive, &item_path.key(IMPORT_KEY), stack, files)? {
                        match imported.value {
                            NodeValue::Scalar(Scalar::Null) => {}
                            NodeValue::Sequence(items) => out.extend(items),
                            _ => out.push(imported),
                        }
                    }
                }
                NodeValue::Sequence(out)
            }
            NodeValue::Mapping(map) => {
                let mut entries = Vec::with_capacity(map.entries.len());
                let mut spliced_items: Vec<Node> = Vec::new();
                for Entry { key, value } in map.entries {
                    if key != IMPORT_KEY {
                        let value = self.expand(value, &path.key(&key), stack, files)?;
                        entries.push(Entry { key, value });
                        continue;
                    }
                    let site = path.key(IMPORT_KEY);
                    for imported in self.imports(&value, &site, stack, files)? {
                        match imported.value {
                            NodeValue::Scalar(Scalar::Null) => {}
                            NodeValue::Mapping(m) => entries.extend(m.entries),
                            NodeValue::Sequence(items) => spliced_items.extend(items),
                            NodeValue::Scalar(_) => {
                                return Err(StructuralError::InvalidImport {
                                    file: source.to_path_buf(),
                                    path: site,
                                    message: format!(
                                        "`{}` must contain a mapping or a sequence",
                                        imported.source.display()
                                    ),
                                });
                            }
                        }
                    }
                }
                if !spliced_items.is_empty() {
                    if !entries.is_empty() {
                        return Err(StructuralError::InvalidImport {
                            file: source.to_path_buf(),
                            path: path.key(IMPORT_KEY),
                            message: "a sequence import cannot be merged into a mapping with other keys".into(),
                        });
                    }
                    NodeValue::Sequence(spliced_items)
                } else {
                    NodeValue::Mapping(Mapping { entries })
                }
            }
        };
        Ok(Node { value, source })
    }

    /// Load every target of one `_import` directive, in declaration order.
    fn imports(
        &self,
        directive: &Node,
        site: &TreePath,
        stack: &[PathBuf],
        files: &mut Vec<PathBuf>,
    ) -> Result<Vec<Node>, StructuralError> {
        let invalid = |message: String| StructuralError::InvalidImport {
            file: directive.file().to_path_buf(),
            path: site.clone(),
            message,
        };
        let targets: Vec<&str> = match &directive.value {
            NodeValue::Sequence(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| invalid(format!("import paths must be strings, found {}", item.kind_name())))
                })
                .collect::<Result<_, _>>()?,
            _ => match directive.as_str() {
                Some(target) => vec![target],
                None => return Err(invalid(format!("expected a path or a list of paths, found {}", directive.kind_name()))),
            },
        };

        let importer = ImportSite { file: directive.file().to_path_buf(), path: site.clone() };
        let load_one = |target: &&str| {
            let path = self.root_dir.join(target);
            tracing::debug!(import = %path.display(), from = %importer, "resolving import");
            self.load_file(&path, stack, Some(importer.clone()))
        };
        let results: Vec<Result<Loaded, StructuralError>> = if self.parallel && targets.len() > 1 {
            targets.par_iter().map(load_one).collect()
        } else {
            targets.iter().map(load_one).collect()
        };

        let mut nodes = Vec::with_capacity(results.len());
        for result in results {
            let loaded = result?;
            files.extend(loaded.files);
            nodes.push(loaded.node);
        }
        Ok(nodes)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn keys(node: &Node) -> Vec<String> {
        node.as_mapping().unwrap().keys().map(str::to_string).collect()
    }

    #[test]
    fn mapping_import_splices_entries_in_place() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "types:\n  a: {x: int}\n  _import: [more.yaml, extra.yaml]\n  z: {x: int}\n");
        write(temp.path(), "more.yaml", "b: {x: int}\n");
        write(temp.path(), "extra.yaml", "c: {x: int}\n");
        let doc = load(temp.path().join("main.yaml")).unwrap();
        assert_eq!(keys(doc.types().unwrap()), vec!["a", "b", "c", "z"]);
        assert_eq!(doc.files.len(), 3);
        let b = doc.types().unwrap().as_mapping().unwrap().get("b").unwrap();
        assert!(b.file().ends_with("more.yaml"));
    }

    #[test]
    fn nested_imports_resolve_relative_to_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        write(temp.path(), "main.yaml", "types:\n  _import: sub/first.yaml\n");
        // relative to the root directory, not to sub/
        write(&temp.path().join("sub"), "first.yaml", "a: {x: int}\n_import: sub/second.yaml\n");
        write(&temp.path().join("sub"), "second.yaml", "b: {x: int}\n");
        let doc = load(temp.path().join("main.yaml")).unwrap();
        assert_eq!(keys(doc.types().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn sequence_imports_are_spliced() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "interfaces:\n  - {path: a, method: get}\n  - _import: more.yaml\n  - {path: c, method: get}\n");
        write(temp.path(), "more.yaml", "- {path: b1, method: get}\n- {path: b2, method: get}\n");
        let doc = load(temp.path().join("main.yaml")).unwrap();
        let paths: Vec<_> = doc
            .interfaces()
            .iter()
            .map(|n| n.as_mapping().unwrap().get("path").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(paths, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn interfaces_mapping_with_declarations() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "interfaces:\n  _import: api.yaml\n");
        write(temp.path(), "api.yaml", "declarations:\n  - {path: a, method: get}\n");
        let doc = load(temp.path().join("main.yaml")).unwrap();
        assert_eq!(doc.interfaces().len(), 1);
    }

    #[test]
    fn root_level_sections_coalesce() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "_import: [a.yaml, b.yaml]\nhosts: {prod: x}\n");
        write(temp.path(), "a.yaml", "types:\n  a: {x: int}\ninterfaces:\n  - {path: a, method: get}\n");
        write(temp.path(), "b.yaml", "types:\n  b: {x: int}\ninterfaces:\n  - {path: b, method: get}\nhosts: oops\n");
        for parallel_imports in [true, false] {
            let doc = load_with(temp.path().join("main.yaml"), &ValidateOptions { parallel_imports }).unwrap();
            assert_eq!(keys(doc.types().unwrap()), vec!["a", "b"]);
            assert_eq!(doc.interfaces().len(), 2);
            assert_eq!(doc.diagnostics.with_code(Code::DuplicateDeclaration).count(), 1);
        }
    }

    #[test]
    fn empty_sections_and_files_merge_as_nothing() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "types:\n_import: [more.yaml, blank.yaml]\ninterfaces:\n  - _import: blank.yaml\n");
        write(temp.path(), "more.yaml", "types:\n  user: {id: int}\nhosts:\n");
        write(temp.path(), "blank.yaml", "~\n");
        let doc = load(temp.path().join("main.yaml")).unwrap();
        assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
        assert_eq!(keys(doc.types().unwrap()), vec!["user"]);
        assert!(doc.interfaces().is_empty());
        assert_eq!(doc.files.len(), 4);
    }

    #[test]
    fn import_cycle_names_full_chain() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.yaml", "types:\n  _import: b.yaml\n");
        write(temp.path(), "b.yaml", "_import: a.yaml\n");
        let err = load(temp.path().join("a.yaml")).unwrap_err();
        let StructuralError::ImportCycle { chain } = err else {
            panic!("expected a cycle, got {err}");
        };
        assert_eq!(chain.len(), 3);
        assert!(chain[0].ends_with("a.yaml"));
        assert!(chain[1].ends_with("b.yaml"));
        assert!(chain[2].ends_with("a.yaml"));
    }

    #[test]
    fn missing_import_reports_importing_location() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.yaml", "types:\n  _import: [ok.yaml, nope.yaml]\n");
        write(temp.path(), "ok.yaml", "a: {x: int}\n");
        let err = load(temp.path().join("main.yaml")).unwrap_err();
        let StructuralError::Io { path, importer, .. } = err else {
            panic!("expected an io error");
        };
        assert!(path.ends_with("nope.yaml"));
        let importer = importer.unwrap();
        assert!(importer.file.ends_with("main.yaml"));
        assert_eq!(importer.path.to_string(), "types._import");
    }

    #[test]
    fn malformed_shapes_are_structural() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "list.yaml", "- a\n- b\n");
        write(temp.path(), "types.yaml", "types: [a, b]\n");
        write(temp.path(), "bad_import.yaml", "types:\n  _import: {a: b}\n");
        write(temp.path(), "scalar.yaml", "just text\n");
        write(temp.path(), "scalar_import.yaml", "types:\n  _import: scalar.yaml\n");
        assert!(matches!(load(temp.path().join("list.yaml")), Err(StructuralError::InvalidShape { .. })));
        assert!(matches!(load(temp.path().join("types.yaml")), Err(StructuralError::InvalidShape { .. })));
        assert!(matches!(load(temp.path().join("bad_import.yaml")), Err(StructuralError::InvalidImport { .. })));
        assert!(matches!(load(temp.path().join("scalar_import.yaml")), Err(StructuralError::InvalidImport { .. })));
    }
}
