//! Run-scoped diagnostic collection.
//!
//! Every semantic check appends here instead of returning `Err`, so a single
//! pass reports every problem it finds.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::node::TreePath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Code {
    UndeclaredType,
    InvalidOptional,
    NestingTooDeep,
    DuplicateDeclaration,
    DuplicateField,
    ReservedTypeName,
    InvalidTypeDeclaration,
    InvalidTypeSyntax,
    ContainerArity,
    UnexpectedTypeParameters,
    InvalidDictKey,
    MissingField,
    InvalidMethod,
    FieldNotAllowed,
    InvalidBodyType,
    BodyTypeWithoutBody,
    InvalidPayload,
    InvalidPath,
    DuplicatePathParameter,
    InvalidStatusKey,
    DuplicateStatusMatcher,
    InvalidResponse,
    InvalidInterface,
    UnknownField,
    UnknownSection,
    InvalidHost,
    InvalidVersioning,
    UnsupportedVersioningFormat,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::UndeclaredType => "undeclared-type",
            Code::InvalidOptional => "invalid-optional",
            Code::NestingTooDeep => "nesting-too-deep",
            Code::DuplicateDeclaration => "duplicate-declaration",
            Code::DuplicateField => "duplicate-field",
            Code::ReservedTypeName => "reserved-type-name",
            Code::InvalidTypeDeclaration => "invalid-type-declaration",
            Code::InvalidTypeSyntax => "invalid-type-syntax",
            Code::ContainerArity => "container-arity",
            Code::UnexpectedTypeParameters => "unexpected-type-parameters",
            Code::InvalidDictKey => "invalid-dict-key",
            Code::MissingField => "missing-field",
            Code::InvalidMethod => "invalid-method",
            Code::FieldNotAllowed => "field-not-allowed",
            Code::InvalidBodyType => "invalid-body-type",
            Code::BodyTypeWithoutBody => "body-type-without-body",
            Code::InvalidPayload => "invalid-payload",
            Code::InvalidPath => "invalid-path",
            Code::DuplicatePathParameter => "duplicate-path-parameter",
            Code::InvalidStatusKey => "invalid-status-key",
            Code::DuplicateStatusMatcher => "duplicate-status-matcher",
            Code::InvalidResponse => "invalid-response",
            Code::InvalidInterface => "invalid-interface",
            Code::UnknownField => "unknown-field",
            Code::UnknownSection => "unknown-section",
            Code::InvalidHost => "invalid-host",
            Code::InvalidVersioning => "invalid-versioning",
            Code::UnsupportedVersioningFormat => "unsupported-versioning-format",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File, position in the merged tree, and (for type strings) a byte offset
/// into the scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub path: TreePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Location {
    pub fn new(file: &Path, path: TreePath) -> Self {
        Self { file: file.to_path_buf(), path, offset: None }
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        Self { offset: Some(offset), ..self.clone() }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.path)?;
        if let Some(offset) = self.offset {
            write!(f, " (col {})", offset + 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(code: Code, message: impl Into<String>, location: Location) -> Self {
        Self { severity: Severity::Error, code, message: message.into(), location }
    }

    pub fn warning(code: Code, message: impl Into<String>, location: Location) -> Self {
        Self { severity: Severity::Warning, code, message: message.into(), location }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}]: {} --> {}", self.code, self.message, self.location)
    }
}

/// Append-only collector owned by one run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(code = %diagnostic.code, location = %diagnostic.location, "{}", diagnostic.message);
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, code: Code, message: impl Into<String>, location: Location) {
        self.push(Diagnostic::error(code, message, location));
    }

    pub fn warning(&mut self, code: Code, message: impl Into<String>, location: Location) {
        self.push(Diagnostic::warning(code, message, location));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn with_code(&self, code: Code) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(Path::new("main.yaml"), TreePath::root().key("types").key("user"))
    }

    #[test]
    fn collector_keeps_order_and_severity() {
        let mut diags = Diagnostics::new();
        diags.warning(Code::UnknownSection, "unknown section `foo`", loc());
        assert!(!diags.has_errors());
        diags.error(Code::UndeclaredType, "undeclared type `unicorn`", loc().with_offset(4));
        assert!(diags.has_errors());
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![Code::UnknownSection, Code::UndeclaredType]);
        assert_eq!(diags.with_code(Code::UndeclaredType).count(), 1);
    }

    #[test]
    fn display_includes_code_and_location() {
        let d = Diagnostic::error(Code::InvalidOptional, "bad `?`", loc().with_offset(9));
        assert_eq!(d.to_string(), "error[invalid-optional]: bad `?` --> main.yaml: types.user (col 10)");
    }

    #[test]
    fn serializes_with_kebab_case_codes() {
        let d = Diagnostic::warning(Code::BodyTypeWithoutBody, "x", loc());
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["code"], "body-type-without-body");
        assert_eq!(v["location"]["path"], "types.user");
        assert!(v["location"].get("offset").is_none());
    }
}
