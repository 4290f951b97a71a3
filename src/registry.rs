//! Type registry.
//!
//! Declarations live in a name-keyed arena; references are resolved by
//! lookup, never by inlining, so reference cycles between named types need no
//! special handling.
//!
//! Two phases:
//! 1. [`Registry::collect`] parses every declaration's fields without looking
//!    at references.
//! 2. [`Registry::resolve`] walks every expression and reports the names
//!    that are neither built-in nor declared.
use indexmap::{IndexMap, IndexSet};

use crate::diagnostics::{Code, Diagnostics, Location};
use crate::node::{Node, TreePath};
use crate::type_expr::{self, FieldSpec, Reference, TypeExpr};

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub fields: IndexMap<String, FieldSpec>,
    pub location: Location,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    decls: IndexMap<String, TypeDecl>,
    /// Duplicates and unusable names: diagnosed, never looked up, still resolved.
    shadowed: Vec<TypeDecl>,
    unresolved: IndexSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: collect declarations from the `types` section.
    pub fn collect(types: Option<&Node>, diags: &mut Diagnostics) -> Self {
        let mut registry = Self::new();
        let Some(types) = types.filter(|t| !t.is_null()) else {
            return registry;
        };
        let section = TreePath::root().key("types");
        let Some(map) = types.as_mapping() else {
            diags.error(
                Code::InvalidTypeDeclaration,
                format!("`types` must be a mapping, found {}", types.kind_name()),
                Location::new(types.file(), section),
            );
            return registry;
        };
        for (name, value) in map.iter() {
            let path = section.key(name);
            let location = Location::new(value.file(), path.clone());
            let reserved = type_expr::builtin(name).is_some();
            let referable = type_expr::is_identifier(name);
            if reserved {
                diags.error(
                    Code::ReservedTypeName,
                    format!("`{name}` is a built-in type and cannot be redeclared"),
                    location.clone(),
                );
            } else if !referable {
                diags.error(
                    Code::InvalidTypeDeclaration,
                    format!("`{name}` is not a valid type name; use letters, digits and `_`"),
                    location.clone(),
                );
            }
            let fields = match value.as_mapping() {
                Some(fields) => {
                    if fields.is_empty() {
                        diags.error(
                            Code::InvalidTypeDeclaration,
                            format!("type `{name}` declares no fields"),
                            location.clone(),
                        );
                    }
                    type_expr::parse_fields(fields, &path, 0, diags)
                }
                None => {
                    diags.error(
                        Code::InvalidTypeDeclaration,
                        format!("type `{name}` must be a mapping of fields, found {}", value.kind_name()),
                        location.clone(),
                    );
                    IndexMap::new()
                }
            };
            let decl = TypeDecl { name: name.to_string(), fields, location };
            if reserved || !referable {
                registry.shadowed.push(decl);
            } else {
                registry.declare(decl, diags);
            }
        }
        tracing::debug!(types = registry.len(), "collected type declarations");
        registry
    }

    /// First declaration wins; later ones are diagnosed and shadowed.
    pub fn declare(&mut self, decl: TypeDecl, diags: &mut Diagnostics) {
        if let Some(first) = self.decls.get(&decl.name) {
            diags.error(
                Code::DuplicateDeclaration,
                format!(
                    "type `{}` is already declared at {}",
                    decl.name, first.location
                ),
                decl.location.clone(),
            );
            self.shadowed.push(decl);
            return;
        }
        self.decls.insert(decl.name.clone(), decl);
    }

    /// Phase 2: check every reference reachable from every declaration,
    /// shadowed ones included.
    pub fn resolve(&mut self, diags: &mut Diagnostics) {
        let mut unresolved = IndexSet::new();
        for decl in self.decls.values().chain(&self.shadowed) {
            for field in decl.fields.values() {
                self.check_expr(&field.expr, diags, &mut unresolved);
            }
        }
        if !unresolved.is_empty() {
            tracing::debug!(count = unresolved.len(), "unresolved type references");
        }
        self.unresolved.extend(unresolved);
    }

    /// Report every undeclared reference inside `expr`.
    pub fn check_expr(&self, expr: &TypeExpr, diags: &mut Diagnostics, unresolved: &mut IndexSet<String>) {
        for Reference { name, location } in expr.references() {
            if !self.decls.contains_key(name) {
                diags.error(
                    Code::UndeclaredType,
                    format!("type `{name}` is not declared"),
                    location.clone(),
                );
                unresolved.insert(name.clone());
            }
        }
    }

    /// Record names found unresolved outside of declarations (e.g. in interfaces).
    pub fn mark_unresolved(&mut self, names: IndexSet<String>) {
        self.unresolved.extend(names);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.decls.get(name)
    }

    /// Declarations that lost to an earlier one or carry an unusable name.
    pub fn shadowed(&self) -> &[TypeDecl] {
        &self.shadowed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        !self.unresolved.contains(name)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decls.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

// ------------------------------- Tests ------------------------------------ //
