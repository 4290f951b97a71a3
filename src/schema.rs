//! JSON Schema (2020-12) emission for declared types.
//!
//! Named types are never inlined: a reference becomes `{"$ref": "#/$defs/<name>"}`
//! and every reachable declaration is emitted once under `$defs`, so cyclic
//! type graphs produce finite documents. Unresolved references and invalid
//! placeholders emit `{}` and make the result an [`EmitterError::Incomplete`]
//! that still carries the partial document.
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::registry::Registry;
use crate::type_expr::{ContainerKind, FieldSpec, FormatKind, PrimitiveKind, TypeExpr};
use crate::validate::ResolvedSpec;

pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("type `{0}` is not declared")]
    UnknownType(String),
    #[error(
        "schema is incomplete: {} unresolved reference(s) [{}], {} invalid expression(s)",
        .unresolved.len(), .unresolved.join(", "), .invalid
    )]
    Incomplete {
        unresolved: Vec<String>,
        invalid: usize,
        /// The document as far as it could be emitted.
        partial: Value,
    },
}

impl EmitterError {
    pub fn partial(&self) -> Option<&Value> {
        match self {
            EmitterError::UnknownType(_) => None,
            EmitterError::Incomplete { partial, .. } => Some(partial),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

pub fn emit_schema(spec: &ResolvedSpec, name: &str) -> Result<Value, EmitterError> {
    emit_type(&spec.registry, name)
}

/// Standalone document for one declared type.
pub fn emit_type(registry: &Registry, name: &str) -> Result<Value, EmitterError> {
    let decl = registry
        .get(name)
        .ok_or_else(|| EmitterError::UnknownType(name.to_string()))?;
    let mut emitter = Emitter::new(registry, Some(name));
    let body = emitter.object(&decl.fields);

    let mut doc = Map::new();
    doc.insert("$schema".into(), Value::from(SCHEMA_DIALECT));
    doc.insert("title".into(), Value::from(name));
    if let Value::Object(body) = body {
        doc.extend(body);
    }
    emitter.finish(Value::Object(doc))
}

/// Schema for any expression, e.g. an interface payload or response.
pub fn emit_expr(registry: &Registry, expr: &TypeExpr) -> Result<Value, EmitterError> {
    let mut emitter = Emitter::new(registry, None);
    let value = emitter.expr(expr);
    emitter.finish(value)
}

/// Every declared type under `$defs`, in declaration order.
pub fn emit_all(registry: &Registry) -> Result<Value, EmitterError> {
    let mut emitter = Emitter::new(registry, None);
    for name in registry.names() {
        emitter.schedule(name);
    }
    emitter.finish(json!({ "$schema": SCHEMA_DIALECT }))
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

struct Emitter<'a> {
    registry: &'a Registry,
    /// Type whose document is being built; references to it become `#`.
    root: Option<&'a str>,
    /// `None` until the definition has been emitted.
    defs: IndexMap<String, Option<Value>>,
    unresolved: IndexSet<String>,
    invalid: usize,
}

impl<'a> Emitter<'a> {
    fn new(registry: &'a Registry, root: Option<&'a str>) -> Self {
        Self {
            registry,
            root,
            defs: IndexMap::new(),
            unresolved: IndexSet::new(),
            invalid: 0,
        }
    }

    fn schedule(&mut self, name: &str) {
        if !self.defs.contains_key(name) {
            self.defs.insert(name.to_string(), None);
        }
    }

    fn finish(mut self, mut doc: Value) -> Result<Value, EmitterError> {
        // Emitting a definition may schedule more; walk until the set is closed.
        let mut i = 0;
        while i < self.defs.len() {
            let Some((name, _)) = self.defs.get_index(i) else {
                break;
            };
            let name = name.clone();
            let schema = match self.registry.get(&name) {
                Some(decl) => self.object(&decl.fields),
                None => Value::Object(Map::new()),
            };
            self.defs.insert(name, Some(schema));
            i += 1;
        }

        if !self.defs.is_empty() {
            let defs: Map<String, Value> = self
                .defs
                .into_iter()
                .map(|(name, schema)| (name, schema.unwrap_or_else(|| json!({}))))
                .collect();
            if let Value::Object(map) = &mut doc {
                map.insert("$defs".into(), Value::Object(defs));
            }
        }

        if self.unresolved.is_empty() && self.invalid == 0 {
            return Ok(doc);
        }
        tracing::warn!(
            unresolved = self.unresolved.len(),
            invalid = self.invalid,
            "emitted an incomplete schema"
        );
        Err(EmitterError::Incomplete {
            unresolved: self.unresolved.into_iter().collect(),
            invalid: self.invalid,
            partial: doc,
        })
    }

    fn object(&mut self, fields: &IndexMap<String, FieldSpec>) -> Value {
        let props = fields
            .iter()
            .map(|(name, field)| (name.clone(), self.expr(&field.expr)))
            .collect::<Vec<_>>();
        let required = fields
            .iter()
            .filter(|(_, field)| !field.optional)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        obj_of(props, required)
    }

    fn expr(&mut self, expr: &TypeExpr) -> Value {
        match expr {
            TypeExpr::Primitive(kind) => json!({ "type": primitive_type(*kind) }),
            TypeExpr::Format(kind) => json!({
                "type": primitive_type(kind.base()),
                "format": format_name(*kind),
            }),
            TypeExpr::Container { kind: ContainerKind::Array, params } => match params.first() {
                Some(item) => json!({ "type": "array", "items": self.expr(item) }),
                None => json!({ "type": "array" }),
            },
            // Keys are always strings in the target format.
            TypeExpr::Container { kind: ContainerKind::Dict, params } => match params.get(1) {
                Some(value) => json!({ "type": "object", "additionalProperties": self.expr(value) }),
                None => json!({ "type": "object" }),
            },
            TypeExpr::Reference(reference) => {
                let name = reference.name.as_str();
                if !self.registry.contains(name) {
                    self.unresolved.insert(name.to_string());
                    return json!({});
                }
                if self.root == Some(name) {
                    return json!({ "$ref": "#" });
                }
                self.schedule(name);
                json!({ "$ref": format!("#/$defs/{name}") })
            }
            TypeExpr::InlineObject(obj) => self.object(&obj.fields),
            TypeExpr::Invalid => {
                self.invalid += 1;
                json!({})
            }
        }
    }
}

fn obj_of(props: Vec<(String, Value)>, required: Vec<String>) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), Value::from("object"));
    map.insert("properties".into(), Value::Object(props.into_iter().collect()));
    if !required.is_empty() {
        map.insert(
            "required".into(),
            Value::Array(required.into_iter().map(Value::from).collect()),
        );
    }
    Value::Object(map)
}

fn primitive_type(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Int => "integer",
        PrimitiveKind::Double => "number",
        PrimitiveKind::Bool => "boolean",
        PrimitiveKind::Str => "string",
    }
}

fn format_name(kind: FormatKind) -> &'static str {
    match kind {
        FormatKind::Uuid => "uuid",
        FormatKind::DateIso8601 => "date-time",
        FormatKind::Url => "uri",
        FormatKind::Timestamp => "timestamp",
    }
}

// ------------------------------- Tests ------------------------------------ //
