//! One validation run: load, collect, resolve, validate interfaces and the
//! auxiliary sections. Every run owns a fresh registry and collector.
use std::path::{Path, PathBuf};

use crate::diagnostics::Diagnostic;
use crate::error::StructuralError;
use crate::interfaces::{self, InterfaceDecl};
use crate::loader::{self, Document};
use crate::registry::Registry;
use crate::sections::{self, Host, Versioning};

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Load the files of one `_import` list concurrently.
    pub parallel_imports: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { parallel_imports: true }
    }
}

/// Best-effort model; unresolved names stay as placeholders.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSpec {
    pub registry: Registry,
    pub interfaces: Vec<InterfaceDecl>,
    pub hosts: Vec<Host>,
    pub versioning: Option<Versioning>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub spec: ResolvedSpec,
    pub diagnostics: Vec<Diagnostic>,
}

impl Validation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

pub fn validate(root: impl AsRef<Path>) -> Result<Validation, StructuralError> {
    validate_with(root, &ValidateOptions::default())
}

pub fn validate_with(root: impl AsRef<Path>, options: &ValidateOptions) -> Result<Validation, StructuralError> {
    let document = loader::load_with(root, options)?;
    Ok(validate_document(document))
}

/// Semantic passes over an already merged document. Never fails.
pub fn validate_document(mut document: Document) -> Validation {
    let mut diags = std::mem::take(&mut document.diagnostics);

    sections::check_sections(&document.root, &mut diags);

    let mut registry = Registry::collect(document.types(), &mut diags);
    registry.resolve(&mut diags);

    let interfaces = interfaces::validate_interfaces(document.interfaces(), &mut registry, &mut diags);
    let hosts = sections::parse_hosts(document.section("hosts"), &mut diags);
    let versioning = sections::parse_versioning(document.section("versioning"), &mut diags);

    tracing::debug!(
        types = registry.len(),
        interfaces = interfaces.len(),
        diagnostics = diags.len(),
        errors = diags.has_errors(),
        "validation finished"
    );
    Validation {
        spec: ResolvedSpec {
            registry,
            interfaces,
            hosts,
            versioning,
            files: document.files,
        },
        diagnostics: diags.into_vec(),
    }
}
