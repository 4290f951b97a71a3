//! Auxiliary top-level sections: `hosts` and `versioning`, plus the check
//! that flags sections nobody consumes.
use indexmap::IndexMap;
use serde::Serialize;

use crate::diagnostics::{Code, Diagnostics, Location};
use crate::loader::IMPORT_KEY;
use crate::node::{Node, TreePath};

pub const KNOWN_SECTIONS: &[&str] = &["types", "interfaces", "hosts", "versioning"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub env: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningFormat {
    Headers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versioning {
    pub format: VersioningFormat,
    pub header: String,
}

/// Warn about top-level keys outside [`KNOWN_SECTIONS`].
pub fn check_sections(root: &Node, diags: &mut Diagnostics) {
    let Some(map) = root.as_mapping() else {
        return;
    };
    for (key, value) in map.iter() {
        if KNOWN_SECTIONS.contains(&key) || key == IMPORT_KEY {
            continue;
        }
        diags.warning(
            Code::UnknownSection,
            format!("unknown top-level section `{key}`"),
            Location::new(value.file(), TreePath::root().key(key)),
        );
    }
}

/// `hosts`: environment name → address.
pub fn parse_hosts(node: Option<&Node>, diags: &mut Diagnostics) -> Vec<Host> {
    let Some(node) = node else {
        return Vec::new();
    };
    let section = TreePath::root().key("hosts");
    let Some(map) = node.as_mapping() else {
        diags.error(
            Code::InvalidHost,
            format!("`hosts` must map environment names to addresses, found {}", node.kind_name()),
            Location::new(node.file(), section),
        );
        return Vec::new();
    };
    let mut hosts: IndexMap<String, Host> = IndexMap::new();
    for (env, value) in map.iter() {
        let location = Location::new(value.file(), section.key(env));
        let Some(address) = value.as_str() else {
            diags.error(
                Code::InvalidHost,
                format!("host `{env}` must have a string address, found {}", value.kind_name()),
                location,
            );
            continue;
        };
        if hosts.contains_key(env) {
            diags.error(
                Code::DuplicateDeclaration,
                format!("host `{env}` is declared more than once"),
                location,
            );
            continue;
        }
        hosts.insert(env.to_string(), Host { env: env.to_string(), address: address.to_string() });
    }
    hosts.into_values().collect()
}

pub fn parse_versioning(node: Option<&Node>, diags: &mut Diagnostics) -> Option<Versioning> {
    let node = node?;
    let section = TreePath::root().key("versioning");
    let Some(map) = node.as_mapping() else {
        diags.error(
            Code::InvalidVersioning,
            format!("`versioning` must be a mapping, found {}", node.kind_name()),
            Location::new(node.file(), section),
        );
        return None;
    };
    let mut seen: Vec<&str> = Vec::new();
    for (key, value) in map.iter() {
        let location = Location::new(value.file(), section.key(key));
        match key {
            "format" | "header" => {
                if seen.contains(&key) {
                    diags.error(Code::DuplicateField, format!("`{key}` is given more than once"), location);
                }
                seen.push(key);
            }
            _ => diags.warning(Code::UnknownField, format!("unknown versioning field `{key}`"), location),
        }
    }

    let here = Location::new(node.file(), section.clone());
    let Some(format) = map.get("format") else {
        diags.error(Code::InvalidVersioning, "`versioning` is missing `format`", here);
        return None;
    };
    let format = match format.as_str() {
        Some("headers") => VersioningFormat::Headers,
        Some(other) => {
            diags.error(
                Code::UnsupportedVersioningFormat,
                format!("versioning format `{other}` is not supported; expected `headers`"),
                Location::new(format.file(), section.key("format")),
            );
            return None;
        }
        None => {
            diags.error(
                Code::InvalidVersioning,
                format!("`format` must be a string, found {}", format.kind_name()),
                Location::new(format.file(), section.key("format")),
            );
            return None;
        }
    };
    match map.get("header").and_then(Node::as_str) {
        Some(header) => Some(Versioning { format, header: header.to_string() }),
        None => {
            diags.error(
                Code::InvalidVersioning,
                "`headers` versioning needs a string `header` name",
                here,
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(yaml: &str) -> Node {
        Node::from_yaml_str(yaml, "main.yaml").unwrap()
    }

    #[test]
    fn hosts_are_parsed_in_order() {
        let doc = root("hosts:\n  prod: https://api.example.com\n  stage: https://stage.example.com\n  dev: 42\n");
        let mut diags = Diagnostics::new();
        let hosts = parse_hosts(doc.as_mapping().unwrap().get("hosts"), &mut diags);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0], Host { env: "prod".into(), address: "https://api.example.com".into() });
        let errs: Vec<_> = diags.with_code(Code::InvalidHost).collect();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].location.path.to_string(), "hosts.dev");
    }

    #[test]
    fn versioning_formats() {
        let mut diags = Diagnostics::new();
        let ok = root("versioning:\n  format: headers\n  header: X-Api-Version\n");
        let v = parse_versioning(ok.as_mapping().unwrap().get("versioning"), &mut diags).unwrap();
        assert_eq!(v.header, "X-Api-Version");
        assert!(diags.is_empty());

        let unsupported = root("versioning:\n  format: path\n");
        assert!(parse_versioning(unsupported.as_mapping().unwrap().get("versioning"), &mut diags).is_none());
        assert_eq!(diags.with_code(Code::UnsupportedVersioningFormat).count(), 1);

        let no_header = root("versioning:\n  format: headers\n");
        assert!(parse_versioning(no_header.as_mapping().unwrap().get("versioning"), &mut diags).is_none());
        let missing = root("versioning: {header: X}\n");
        assert!(parse_versioning(missing.as_mapping().unwrap().get("versioning"), &mut diags).is_none());
        assert_eq!(diags.with_code(Code::InvalidVersioning).count(), 2);
    }

    #[test]
    fn unknown_sections_warn() {
        let doc = root("types: {}\nmetadata: {owner: me}\nhosts: {}\n");
        let mut diags = Diagnostics::new();
        check_sections(&doc, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
        assert_eq!(diags.iter().next().unwrap().code, Code::UnknownSection);
    }
}
