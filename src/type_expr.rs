//! Field type expressions.
//!
//! Grammar: `expr := name ['?'] | name '[' expr (',' expr)? ']'`. The `?`
//! suffix is only meaningful as the outermost suffix of a field; anywhere
//! inside brackets it is reported and ignored. Inline mappings become
//! [`InlineObject`]s one level deeper than their container.
use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostics::{Code, Diagnostics, Location};
use crate::node::{Mapping, Node, NodeValue, TreePath};

/// Inline objects may nest this deep; declared types sit at depth 0.
pub const MAX_INLINE_DEPTH: usize = 3;

// ------------------------------ Catalog ---------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    Double,
    Bool,
    Str,
}

/// A primitive plus a semantic constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Timestamp,
    DateIso8601,
    Uuid,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Array,
    Dict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Primitive(PrimitiveKind),
    Format(FormatKind),
    Container(ContainerKind),
}

impl FormatKind {
    pub fn base(&self) -> PrimitiveKind {
        match self {
            FormatKind::Timestamp => PrimitiveKind::Double,
            FormatKind::DateIso8601 | FormatKind::Uuid | FormatKind::Url => PrimitiveKind::Str,
        }
    }
}

impl ContainerKind {
    pub fn arity(&self) -> usize {
        match self {
            ContainerKind::Array => 1,
            ContainerKind::Dict => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContainerKind::Array => "array",
            ContainerKind::Dict => "dict",
        }
    }
}

/// Immutable, shared by every run.
static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    use Builtin::*;
    HashMap::from([
        ("int", Primitive(PrimitiveKind::Int)),
        ("double", Primitive(PrimitiveKind::Double)),
        ("bool", Primitive(PrimitiveKind::Bool)),
        ("str", Primitive(PrimitiveKind::Str)),
        ("timestamp", Format(FormatKind::Timestamp)),
        ("date_iso8601", Format(FormatKind::DateIso8601)),
        ("uuid", Format(FormatKind::Uuid)),
        ("url", Format(FormatKind::Url)),
        ("array", Container(ContainerKind::Array)),
        ("dict", Container(ContainerKind::Dict)),
    ])
});

pub fn builtin(name: &str) -> Option<Builtin> {
    BUILTINS.get(name).copied()
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Whether `name` can appear as a reference inside a type string.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

// ------------------------------- Model ----------------------------------- //

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Primitive(PrimitiveKind),
    Format(FormatKind),
    Container { kind: ContainerKind, params: Vec<TypeExpr> },
    Reference(Reference),
    InlineObject(InlineObject),
    /// Placeholder for an expression that failed to parse; already diagnosed.
    Invalid,
}

/// A leaf naming a declared type; resolved by registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineObject {
    pub fields: IndexMap<String, FieldSpec>,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub expr: TypeExpr,
    pub optional: bool,
    pub location: Location,
}

impl TypeExpr {
    /// Every reference leaf, depth-first, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            TypeExpr::Reference(r) => out.push(r),
            TypeExpr::Container { params, .. } => {
                for p in params {
                    p.collect_references(out);
                }
            }
            TypeExpr::InlineObject(obj) => {
                for field in obj.fields.values() {
                    field.expr.collect_references(out);
                }
            }
            TypeExpr::Primitive(_) | TypeExpr::Format(_) | TypeExpr::Invalid => {}
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, TypeExpr::Primitive(_) | TypeExpr::Format(_))
    }
}

// ------------------------------ Parsing ---------------------------------- //

/// Result of parsing one type string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpr {
    pub expr: TypeExpr,
    pub optional: bool,
}

/// Parse a type string. `location` points at the scalar; diagnostics carry
/// byte offsets into it. When `allow_optional` is false a trailing `?` is
/// reported as well.
pub fn parse_type_str(
    src: &str,
    location: &Location,
    allow_optional: bool,
    diags: &mut Diagnostics,
) -> ParsedExpr {
    let mut parser = ExprParser { src, pos: 0, location, diags };
    parser.parse(allow_optional)
}

/// Parse a field value: a type string or an inline mapping. `depth` is the
/// nesting depth of the object that owns the field.
pub fn parse_field(node: &Node, path: &TreePath, depth: usize, diags: &mut Diagnostics) -> FieldSpec {
    let location = Location::new(node.file(), path.clone());
    match &node.value {
        NodeValue::Scalar(_) => match node.as_str() {
            Some(src) => {
                let parsed = parse_type_str(src, &location, true, diags);
                FieldSpec { expr: parsed.expr, optional: parsed.optional, location }
            }
            None => {
                diags.error(
                    Code::InvalidTypeSyntax,
                    format!("expected a type name or an inline object, found {}", node.kind_name()),
                    location.clone(),
                );
                FieldSpec { expr: TypeExpr::Invalid, optional: false, location }
            }
        },
        NodeValue::Mapping(map) => {
            let expr = parse_inline_object(map, node.file(), path, depth + 1, diags);
            FieldSpec { expr, optional: false, location }
        }
        NodeValue::Sequence(_) => {
            diags.error(
                Code::InvalidTypeSyntax,
                "expected a type name or an inline object, found sequence",
                location.clone(),
            );
            FieldSpec { expr: TypeExpr::Invalid, optional: false, location }
        }
    }
}

/// An inline mapping at `depth`; past [`MAX_INLINE_DEPTH`] it is rejected
/// without descending further.
pub fn parse_inline_object(
    map: &Mapping,
    file: &Path,
    path: &TreePath,
    depth: usize,
    diags: &mut Diagnostics,
) -> TypeExpr {
    if depth > MAX_INLINE_DEPTH {
        diags.error(
            Code::NestingTooDeep,
            format!("inline object nested {depth} levels deep; at most {MAX_INLINE_DEPTH} are allowed"),
            Location::new(file, path.clone()),
        );
        return TypeExpr::Invalid;
    }
    if map.is_empty() {
        diags.error(
            Code::InvalidTypeSyntax,
            "inline object declares no fields",
            Location::new(file, path.clone()),
        );
    }
    let fields = parse_fields(map, path, depth, diags);
    TypeExpr::InlineObject(InlineObject { fields, depth })
}

/// Fields of an object at `depth`. Repeated names keep the first declaration.
pub fn parse_fields(
    map: &Mapping,
    path: &TreePath,
    depth: usize,
    diags: &mut Diagnostics,
) -> IndexMap<String, FieldSpec> {
    let mut fields: IndexMap<String, FieldSpec> = IndexMap::new();
    for (name, value) in map.iter() {
        let field_path = path.key(name);
        if let Some(first) = fields.get(name) {
            diags.error(
                Code::DuplicateField,
                format!("field `{name}` is declared more than once (first at {})", first.location),
                Location::new(value.file(), field_path),
            );
            continue;
        }
        let spec = parse_field(value, &field_path, depth, diags);
        fields.insert(name.to_string(), spec);
    }
    fields
}

struct ExprParser<'s, 'd> {
    src: &'s str,
    pos: usize,
    location: &'s Location,
    diags: &'d mut Diagnostics,
}

impl<'s, 'd> ExprParser<'s, 'd> {
    fn parse(&mut self, allow_optional: bool) -> ParsedExpr {
        self.skip_ws();
        if self.at_end() {
            self.syntax_error(0, "empty type expression");
            return ParsedExpr { expr: TypeExpr::Invalid, optional: false };
        }
        let Some(expr) = self.expr() else {
            return ParsedExpr { expr: TypeExpr::Invalid, optional: false };
        };
        self.skip_ws();
        let mut optional = false;
        if self.peek() == Some('?') {
            if allow_optional {
                optional = true;
            } else {
                self.optional_error(self.pos, "`?` is only allowed on a field's type");
            }
            self.pos += 1;
            self.skip_ws();
        }
        if let Some(c) = self.peek() {
            self.syntax_error(self.pos, &format!("unexpected `{c}`"));
            return ParsedExpr { expr: TypeExpr::Invalid, optional };
        }
        ParsedExpr { expr, optional }
    }

    fn expr(&mut self) -> Option<TypeExpr> {
        self.skip_ws();
        let start = self.pos;
        let name = self.ident();
        if name.is_empty() {
            match self.peek() {
                Some(c) => self.syntax_error(start, &format!("expected a type name, found `{c}`")),
                None => self.syntax_error(start, "expected a type name"),
            }
            return None;
        }
        self.skip_ws();
        let params = if self.peek() == Some('[') {
            self.pos += 1;
            Some(self.params()?)
        } else {
            None
        };
        Some(self.build(name, start, params))
    }

    fn params(&mut self) -> Option<Vec<(usize, TypeExpr)>> {
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            let expr = self.expr()?;
            self.skip_ws();
            if self.peek() == Some('?') {
                self.optional_error(self.pos, "`?` is not allowed inside a container's type parameters");
                self.pos += 1;
                self.skip_ws();
            }
            params.push((start, expr));
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Some(params);
                }
                Some(c) => {
                    self.syntax_error(self.pos, &format!("expected `,` or `]`, found `{c}`"));
                    return None;
                }
                None => {
                    self.syntax_error(self.pos, "unclosed `[`");
                    return None;
                }
            }
        }
    }

    fn build(&mut self, name: &str, start: usize, params: Option<Vec<(usize, TypeExpr)>>) -> TypeExpr {
        match builtin(name) {
            Some(Builtin::Container(kind)) => {
                let params = params.unwrap_or_default();
                if !params.is_empty() && params.len() != kind.arity() {
                    self.diags.error(
                        Code::ContainerArity,
                        format!(
                            "`{}` takes {} type parameter(s), found {}",
                            kind.name(),
                            kind.arity(),
                            params.len()
                        ),
                        self.location.with_offset(start),
                    );
                }
                if kind == ContainerKind::Dict {
                    if let Some((key_at, key)) = params.first() {
                        if !key.is_scalar() && *key != TypeExpr::Invalid {
                            self.diags.error(
                                Code::InvalidDictKey,
                                "dict keys must be a primitive or format type",
                                self.location.with_offset(*key_at),
                            );
                        }
                    }
                }
                let params = params.into_iter().map(|(_, e)| e).collect();
                TypeExpr::Container { kind, params }
            }
            Some(scalar) => {
                if params.is_some() {
                    self.unexpected_params(name, start);
                }
                match scalar {
                    Builtin::Primitive(kind) => TypeExpr::Primitive(kind),
                    Builtin::Format(kind) => TypeExpr::Format(kind),
                    Builtin::Container(_) => TypeExpr::Invalid,
                }
            }
            None => {
                if params.is_some() {
                    self.unexpected_params(name, start);
                }
                TypeExpr::Reference(Reference {
                    name: name.to_string(),
                    location: self.location.with_offset(start),
                })
            }
        }
    }

    fn ident(&mut self) -> &'s str {
        let start = self.pos;
        for (i, c) in self.src[start..].char_indices() {
            let ok = c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit());
            if !ok {
                self.pos = start + i;
                return &self.src[start..self.pos];
            }
        }
        self.pos = self.src.len();
        &self.src[start..]
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn unexpected_params(&mut self, name: &str, start: usize) {
        self.diags.error(
            Code::UnexpectedTypeParameters,
            format!("`{name}` does not take type parameters"),
            self.location.with_offset(start),
        );
    }

    fn optional_error(&mut self, at: usize, message: &str) {
        self.diags.error(Code::InvalidOptional, message, self.location.with_offset(at));
    }

    fn syntax_error(&mut self, at: usize, message: &str) {
        self.diags.error(
            Code::InvalidTypeSyntax,
            format!("{message} in `{}`", self.src),
            self.location.with_offset(at),
        );
    }
}

// ------------------------------- Tests ------------------------------------ //
