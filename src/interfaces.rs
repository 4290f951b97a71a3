//! Interface (endpoint) validation.
//!
//! Each entry carries a path template, a method, an optional request payload
//! and a response specification. Entries with a missing or unusable `path`
//! or `method` are diagnosed and left out of the resolved model; everything
//! else is kept best-effort.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostics::{Code, Diagnostics, Location};
use crate::node::{Mapping, Node, NodeValue, Scalar, TreePath};
use crate::registry::Registry;
use crate::type_expr::{self, TypeExpr};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusMatcher {
    Exact(u16),
    /// Leading digit 1–5, written `4xx`.
    Family(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    pub matcher: StatusMatcher,
    /// `None` when the status carries no body.
    pub schema: Option<TypeExpr>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseSpec {
    pub entries: Vec<ResponseEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    FormData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub path: PathTemplate,
    pub method: HttpMethod,
    pub query: Option<TypeExpr>,
    pub body: Option<TypeExpr>,
    pub body_type: Option<BodyType>,
    pub response: ResponseSpec,
    pub location: Location,
}

const KNOWN_FIELDS: &[&str] = &["path", "method", "query", "body", "body_type", "response"];

static EXACT_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-5][0-9]{2}$").unwrap());
static FAMILY_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([1-5])xx$").unwrap());

// ————————————————————————————————————————————————————————————————————————————
// MODEL HELPERS
// ————————————————————————————————————————————————————————————————————————————

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    pub fn allows_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }

    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            _ => Err(()),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PathTemplate {
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Param(name) => Some(name.as_str()),
            PathSegment::Literal(_) => None,
        })
    }

    /// Leading/trailing slashes are not significant.
    pub fn normalized(&self) -> String {
        self.raw.trim_matches('/').to_string()
    }
}

impl StatusMatcher {
    pub fn parse(key: &str) -> Option<StatusMatcher> {
        if EXACT_STATUS.is_match(key) {
            return key.parse().ok().map(StatusMatcher::Exact);
        }
        let caps = FAMILY_STATUS.captures(key)?;
        caps[1].parse().ok().map(StatusMatcher::Family)
    }

    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusMatcher::Exact(code) => *code == status,
            StatusMatcher::Family(digit) => status / 100 == u16::from(*digit),
        }
    }
}

impl fmt::Display for StatusMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMatcher::Exact(code) => write!(f, "{code}"),
            StatusMatcher::Family(digit) => write!(f, "{digit}xx"),
        }
    }
}

impl ResponseSpec {
    /// The entry for a concrete status. An exact matcher always outranks a
    /// family matcher, whatever the declaration order.
    pub fn resolve(&self, status: u16) -> Option<&ResponseEntry> {
        self.entries
            .iter()
            .find(|e| matches!(e.matcher, StatusMatcher::Exact(_)) && e.matcher.matches(status))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| matches!(e.matcher, StatusMatcher::Family(_)) && e.matcher.matches(status))
            })
    }

    /// What an absent `response` means: any 2xx, no schema.
    pub fn implicit(location: Location) -> Self {
        Self {
            entries: vec![ResponseEntry { matcher: StatusMatcher::Family(2), schema: None, location }],
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATION
// ————————————————————————————————————————————————————————————————————————————

/// Validates every entry of the `interfaces` sequence against `registry`.
/// Undeclared names found here are recorded on the registry as unresolved.
pub fn validate_interfaces(
    entries: &[Node],
    registry: &mut Registry,
    diags: &mut Diagnostics,
) -> Vec<InterfaceDecl> {
    let section = TreePath::root().key("interfaces");
    let mut out: Vec<InterfaceDecl> = Vec::new();
    let mut unresolved = IndexSet::new();
    for (i, node) in entries.iter().enumerate() {
        let mut validator = InterfaceValidator {
            registry: &*registry,
            diags: &mut *diags,
            unresolved: &mut unresolved,
        };
        let Some(decl) = validator.validate(node, section.index(i)) else {
            continue;
        };
        let duplicate = out
            .iter()
            .find(|d| d.method == decl.method && d.path.normalized() == decl.path.normalized());
        if let Some(first) = duplicate {
            diags.error(
                Code::DuplicateDeclaration,
                format!(
                    "interface `{} {}` is already declared at {}",
                    decl.method, decl.path.raw, first.location
                ),
                decl.location,
            );
            continue;
        }
        out.push(decl);
    }
    registry.mark_unresolved(unresolved);
    tracing::debug!(interfaces = out.len(), "validated interfaces");
    out
}

struct InterfaceValidator<'a> {
    registry: &'a Registry,
    diags: &'a mut Diagnostics,
    unresolved: &'a mut IndexSet<String>,
}

impl<'a> InterfaceValidator<'a> {
    fn validate(&mut self, node: &Node, path: TreePath) -> Option<InterfaceDecl> {
        let location = Location::new(node.file(), path.clone());
        let Some(map) = node.as_mapping() else {
            self.diags.error(
                Code::InvalidInterface,
                format!("interface entry must be a mapping, found {}", node.kind_name()),
                location,
            );
            return None;
        };
        self.check_keys(map, &path);

        let template = self.path_template(map, &path, &location);
        let method = self.method(map, &path, &location);

        let query = self.payload(map, "query", method, &path);
        let body = self.payload(map, "body", method, &path);
        let body_type = self.body_type(map, method, &path);
        if body_type.is_some() && !map.contains_key("body") {
            self.diags.warning(
                Code::BodyTypeWithoutBody,
                "`body_type` is set but the interface declares no `body`",
                Location::new(node.file(), path.key("body_type")),
            );
        }
        let response = self.response(map, &path, &location);

        Some(InterfaceDecl {
            path: template?,
            method: method?,
            query,
            body,
            body_type,
            response,
            location,
        })
    }

    fn check_keys(&mut self, map: &Mapping, path: &TreePath) {
        let mut seen: Vec<&str> = Vec::new();
        for (key, value) in map.iter() {
            let location = Location::new(value.file(), path.key(key));
            if seen.contains(&key) {
                self.diags.error(
                    Code::DuplicateField,
                    format!("`{key}` is given more than once"),
                    location,
                );
                continue;
            }
            seen.push(key);
            if !KNOWN_FIELDS.contains(&key) {
                self.diags.warning(
                    Code::UnknownField,
                    format!("unknown interface field `{key}`"),
                    location,
                );
            }
        }
    }

    fn path_template(&mut self, map: &Mapping, path: &TreePath, location: &Location) -> Option<PathTemplate> {
        let Some(node) = map.get("path") else {
            self.diags.error(Code::MissingField, "interface is missing `path`", location.clone());
            return None;
        };
        let location = Location::new(node.file(), path.key("path"));
        let Some(raw) = node.as_str() else {
            self.diags.error(
                Code::InvalidPath,
                format!("`path` must be a string, found {}", node.kind_name()),
                location,
            );
            return None;
        };
        Some(parse_path_template(raw, &location, self.diags))
    }

    fn method(&mut self, map: &Mapping, path: &TreePath, location: &Location) -> Option<HttpMethod> {
        let Some(node) = map.get("method") else {
            self.diags.error(Code::MissingField, "interface is missing `method`", location.clone());
            return None;
        };
        let location = Location::new(node.file(), path.key("method"));
        let method = node.as_str().and_then(|s| s.parse::<HttpMethod>().ok());
        if method.is_none() {
            let shown = match &node.value {
                NodeValue::Scalar(Scalar::String(s)) => format!("`{s}`"),
                _ => node.kind_name().to_string(),
            };
            self.diags.error(
                Code::InvalidMethod,
                format!("invalid method {shown}; expected one of GET, POST, PUT, PATCH, DELETE, HEAD"),
                location,
            );
        }
        method
    }

    /// `query` or `body`. Illegal for the method → diagnosed and not parsed.
    fn payload(
        &mut self,
        map: &Mapping,
        field: &str,
        method: Option<HttpMethod>,
        path: &TreePath,
    ) -> Option<TypeExpr> {
        let node = map.get(field)?;
        let path = path.key(field);
        let location = Location::new(node.file(), path.clone());
        if let Some(method) = method {
            let allowed = match field {
                "query" => method.allows_query(),
                _ => method.allows_body(),
            };
            if !allowed {
                self.diags.error(
                    Code::FieldNotAllowed,
                    format!("`{field}` is not allowed for {method} interfaces"),
                    location,
                );
                return None;
            }
        }
        let expr = self.type_expr(node, &path);
        let object_shaped = match &expr {
            TypeExpr::InlineObject(_) | TypeExpr::Reference(_) | TypeExpr::Invalid => true,
            _ => false,
        };
        if !object_shaped {
            self.diags.error(
                Code::InvalidPayload,
                format!("`{field}` must be an inline object or a declared type"),
                location,
            );
        }
        Some(expr)
    }

    fn body_type(&mut self, map: &Mapping, method: Option<HttpMethod>, path: &TreePath) -> Option<BodyType> {
        let node = map.get("body_type")?;
        let location = Location::new(node.file(), path.key("body_type"));
        if let Some(method) = method {
            if !method.allows_body() {
                self.diags.error(
                    Code::FieldNotAllowed,
                    format!("`body_type` is not allowed for {method} interfaces"),
                    location,
                );
                return None;
            }
        }
        match node.as_str() {
            Some("form-data") => Some(BodyType::FormData),
            _ => {
                self.diags.error(
                    Code::InvalidBodyType,
                    "`body_type` must be `form-data`",
                    location,
                );
                None
            }
        }
    }

    fn response(&mut self, map: &Mapping, path: &TreePath, location: &Location) -> ResponseSpec {
        let Some(node) = map.get("response") else {
            return ResponseSpec::implicit(location.clone());
        };
        let path = path.key("response");
        let location = Location::new(node.file(), path.clone());
        match &node.value {
            NodeValue::Mapping(m) if is_status_mapping(m) => self.status_responses(m, &path),
            NodeValue::Mapping(_) | NodeValue::Scalar(Scalar::String(_)) => {
                let schema = self.type_expr(node, &path);
                ResponseSpec {
                    entries: vec![ResponseEntry { matcher: StatusMatcher::Family(2), schema: Some(schema), location }],
                }
            }
            _ => {
                self.diags.error(
                    Code::InvalidResponse,
                    format!("`response` must be a type or a mapping of status codes, found {}", node.kind_name()),
                    location.clone(),
                );
                ResponseSpec::implicit(location)
            }
        }
    }

    fn status_responses(&mut self, map: &Mapping, path: &TreePath) -> ResponseSpec {
        let mut spec = ResponseSpec::default();
        for (key, value) in map.iter() {
            let entry_path = path.key(key);
            let location = Location::new(value.file(), entry_path.clone());
            let Some(matcher) = StatusMatcher::parse(key) else {
                self.diags.error(
                    Code::InvalidStatusKey,
                    format!("`{key}` is not a status code (100-599) or a family like `4xx`"),
                    location,
                );
                continue;
            };
            if let Some(first) = spec.entries.iter().find(|e| e.matcher == matcher) {
                self.diags.error(
                    Code::DuplicateStatusMatcher,
                    format!("status `{matcher}` is already declared at {}", first.location),
                    location,
                );
                continue;
            }
            let schema = if value.is_null() {
                None
            } else {
                Some(self.type_expr(value, &entry_path))
            };
            spec.entries.push(ResponseEntry { matcher, schema, location });
        }
        spec
    }

    /// Type string or inline object, checked against the registry. No `?`.
    fn type_expr(&mut self, node: &Node, path: &TreePath) -> TypeExpr {
        let location = Location::new(node.file(), path.clone());
        let expr = match &node.value {
            NodeValue::Mapping(m) => type_expr::parse_inline_object(m, node.file(), path, 1, self.diags),
            _ => match node.as_str() {
                Some(src) => type_expr::parse_type_str(src, &location, false, self.diags).expr,
                None => {
                    self.diags.error(
                        Code::InvalidTypeSyntax,
                        format!("expected a type name or an inline object, found {}", node.kind_name()),
                        location,
                    );
                    TypeExpr::Invalid
                }
            },
        };
        self.registry.check_expr(&expr, self.diags, self.unresolved);
        expr
    }
}

/// A response mapping is keyed by status when any key starts with a digit.
fn is_status_mapping(map: &Mapping) -> bool {
    map.keys().any(|k| k.starts_with(|c: char| c.is_ascii_digit()))
}

/// Split a path into literal and `{param}` segments.
pub fn parse_path_template(raw: &str, location: &Location, diags: &mut Diagnostics) -> PathTemplate {
    let mut segments = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for part in raw.split('/').filter(|p| !p.is_empty()) {
        let is_param = part.starts_with('{') && part.ends_with('}') && part.len() >= 2;
        let inner = if is_param { &part[1..part.len() - 1] } else { part };
        if inner.contains(['{', '}']) {
            diags.error(
                Code::InvalidPath,
                format!("malformed path segment `{part}` in `{raw}`"),
                location.clone(),
            );
            continue;
        }
        if !is_param {
            segments.push(PathSegment::Literal(part.to_string()));
            continue;
        }
        let name = inner.trim();
        if name.is_empty() {
            diags.error(
                Code::InvalidPath,
                format!("empty path parameter in `{raw}`"),
                location.clone(),
            );
            continue;
        }
        if seen.iter().any(|s| s == name) {
            diags.error(
                Code::DuplicatePathParameter,
                format!("path parameter `{name}` appears more than once in `{raw}`"),
                location.clone(),
            );
        } else {
            seen.push(name.to_string());
        }
        segments.push(PathSegment::Param(name.to_string()));
    }
    PathTemplate { raw: raw.to_string(), segments }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn run(yaml: &str) -> (Vec<InterfaceDecl>, Diagnostics) {
        let root = Node::from_yaml_str(yaml, "main.yaml").unwrap();
        let map = root.as_mapping().unwrap();
        let mut diags = Diagnostics::new();
        let mut registry = Registry::collect(map.get("types"), &mut diags);
        registry.resolve(&mut diags);
        let entries = map.get("interfaces").and_then(Node::as_sequence).unwrap_or(&[]);
        let decls = validate_interfaces(entries, &mut registry, &mut diags);
        (decls, diags)
    }

    const NEWS: &str = "types:\n  news_entry:\n    title: str\n";

    #[test]
    fn minimal_get_has_implicit_2xx() {
        let (decls, diags) = run("interfaces:\n  - path: news\n    method: get\n");
        assert!(diags.is_empty());
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].method, HttpMethod::Get);
        assert_eq!(decls[0].response.entries.len(), 1);
        assert_eq!(decls[0].response.entries[0].matcher, StatusMatcher::Family(2));
        assert!(decls[0].response.entries[0].schema.is_none());
    }

    #[test]
    fn method_is_case_insensitive_and_validated() {
        let (decls, diags) = run("interfaces:\n  - path: a\n    method: PaTcH\n  - path: b\n    method: trace\n  - path: c\n");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].method, HttpMethod::Patch);
        assert_eq!(diags.with_code(Code::InvalidMethod).count(), 1);
        assert_eq!(diags.with_code(Code::MissingField).count(), 1);
    }

    #[test]
    fn query_on_post_is_flagged() {
        let (decls, diags) = run("interfaces:\n  - path: news\n    method: post\n    query:\n      page: int\n");
        let errs: Vec<_> = diags.with_code(Code::FieldNotAllowed).collect();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].location.path.to_string(), "interfaces[0].query");
        assert!(decls[0].query.is_none());
    }

    #[test]
    fn field_legality_matrix() {
        let yaml = "interfaces:\n\
            \x20 - {path: a, method: get, body: {t: str}}\n\
            \x20 - {path: b, method: delete, query: {p: int}, body: {t: str}}\n\
            \x20 - {path: c, method: head, query: {p: int?}}\n\
            \x20 - {path: d, method: put, body: {t: str}, body_type: form-data}\n\
            \x20 - {path: e, method: get, body_type: form-data}\n";
        let (decls, diags) = run(yaml);
        assert_eq!(diags.with_code(Code::FieldNotAllowed).count(), 4);
        assert_eq!(decls.len(), 5);
        assert!(decls[2].query.is_some());
        assert_eq!(decls[3].body_type, Some(BodyType::FormData));
    }

    #[test]
    fn body_type_values() {
        let (_, diags) = run("interfaces:\n  - {path: a, method: post, body: {t: str}, body_type: json}\n  - {path: b, method: post, body_type: form-data}\n");
        assert_eq!(diags.with_code(Code::InvalidBodyType).count(), 1);
        assert_eq!(diags.with_code(Code::BodyTypeWithoutBody).count(), 1);
    }

    #[test]
    fn payload_references_resolve_through_registry() {
        let yaml = format!("{NEWS}interfaces:\n  - {{path: a, method: post, body: news_entry}}\n  - {{path: b, method: post, body: unicorn}}\n  - {{path: c, method: post, body: 'array[news_entry]'}}\n");
        let (_, diags) = run(&yaml);
        assert_eq!(diags.with_code(Code::UndeclaredType).count(), 1);
        assert_eq!(diags.with_code(Code::InvalidPayload).count(), 1);
    }

    #[test]
    fn path_parameters() {
        let (decls, diags) = run("interfaces:\n  - path: /news/{id}/comments/{cid}\n    method: get\n");
        assert!(diags.is_empty());
        assert_eq!(decls[0].path.params().collect::<Vec<_>>(), vec!["id", "cid"]);

        let (_, diags) = run("interfaces:\n  - path: a/{id}/b/{id}\n    method: get\n  - path: x/{}\n    method: get\n  - path: y/{a\n    method: get\n");
        assert_eq!(diags.with_code(Code::DuplicatePathParameter).count(), 1);
        assert_eq!(diags.with_code(Code::InvalidPath).count(), 2);
    }

    #[test]
    fn exact_status_outranks_family_regardless_of_order() {
        let yaml = format!(
            "{NEWS}interfaces:\n  - path: news\n    method: get\n    response:\n      5xx: {{code: int}}\n      4xx: {{reason: str}}\n      200: news_entry\n      501: {{code: int, detail: str}}\n"
        );
        let (decls, diags) = run(&yaml);
        assert!(diags.is_empty(), "{diags:?}");
        let response = &decls[0].response;
        assert_eq!(response.resolve(501).unwrap().matcher, StatusMatcher::Exact(501));
        assert_eq!(response.resolve(503).unwrap().matcher, StatusMatcher::Family(5));
        assert_eq!(response.resolve(404).unwrap().matcher, StatusMatcher::Family(4));
        assert_eq!(response.resolve(200).unwrap().matcher, StatusMatcher::Exact(200));
        assert!(response.resolve(201).is_none());
        assert!(response.resolve(302).is_none());
    }

    #[test]
    fn no_match_without_covering_entry() {
        let yaml = format!(
            "{NEWS}interfaces:\n  - path: news\n    method: get\n    response:\n      200: news_entry\n      4xx: {{reason: str}}\n      501: {{code: int}}\n"
        );
        let (decls, _) = run(&yaml);
        let response = &decls[0].response;
        assert_eq!(response.resolve(501).unwrap().matcher, StatusMatcher::Exact(501));
        assert_eq!(response.resolve(404).unwrap().matcher, StatusMatcher::Family(4));
        assert!(response.resolve(503).is_none());
    }

    #[test]
    fn status_key_errors() {
        let yaml = "interfaces:\n  - path: a\n    method: get\n    response:\n      200: {a: int}\n      '200': {b: int}\n      4xx: {c: int}\n      600: {e: int}\n      2XX: {f: int}\n      99: {g: int}\n      1xxx: {h: int}\n      204: ~\n";
        let (decls, diags) = run(yaml);
        assert_eq!(diags.with_code(Code::DuplicateStatusMatcher).count(), 1);
        assert_eq!(diags.with_code(Code::InvalidStatusKey).count(), 4);
        let entries = &decls[0].response.entries;
        assert_eq!(entries.len(), 3);
        assert!(entries[2].schema.is_none());
    }

    #[test]
    fn single_type_response_is_2xx_sugar() {
        let yaml = format!("{NEWS}interfaces:\n  - {{path: a, method: get, response: news_entry}}\n  - {{path: b, method: get, response: {{ok: bool}}}}\n  - {{path: c, method: get, response: news_entry?}}\n");
        let (decls, diags) = run(&yaml);
        assert_eq!(diags.with_code(Code::InvalidOptional).count(), 1);
        for decl in &decls {
            assert_eq!(decl.response.entries[0].matcher, StatusMatcher::Family(2));
            assert!(decl.response.resolve(204).is_some());
        }
    }

    #[test]
    fn duplicate_interfaces_and_unknown_fields() {
        let (decls, diags) = run("interfaces:\n  - {path: /news, method: get}\n  - {path: news/, method: GET}\n  - {path: news, method: post, summary: x}\n");
        assert_eq!(decls.len(), 2);
        assert_eq!(diags.with_code(Code::DuplicateDeclaration).count(), 1);
        assert_eq!(diags.with_code(Code::UnknownField).count(), 1);
    }

    #[test]
    fn non_mapping_entries_are_reported() {
        let (decls, diags) = run("interfaces:\n  - just a string\n");
        assert!(decls.is_empty());
        assert_eq!(diags.with_code(Code::InvalidInterface).count(), 1);
    }
}
