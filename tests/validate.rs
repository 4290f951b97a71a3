use std::path::Path;

use arc_isle::interfaces::StatusMatcher;
use arc_isle::{Code, StructuralError, ValidateOptions, validate, validate_with};
use serde_json::json;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn imported_types_resolve_without_diagnostics() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.yaml",
        "types:\n  _import: types/news.yaml\n  feed:\n    entries: array[news_entry]\ninterfaces:\n  _import: interfaces/news.yaml\n",
    );
    write(temp.path(), "types/news.yaml", "news_entry:\n  id: uuid\n  title: str\n  published: date_iso8601?\n");
    write(
        temp.path(),
        "interfaces/news.yaml",
        "declarations:\n  - path: news\n    method: get\n    query: {page: int}\n    response:\n      200: feed\n      4xx: {message: str}\n",
    );

    let run = validate(temp.path().join("main.yaml")).unwrap();
    assert!(run.diagnostics.is_empty(), "{:?}", run.diagnostics);
    assert_eq!(run.spec.files.len(), 3);
    assert!(run.spec.registry.contains("news_entry"));

    let news = &run.spec.interfaces[0];
    let matched = news.response.resolve(404).unwrap();
    assert_eq!(matched.matcher, StatusMatcher::Family(4));
    assert!(news.response.resolve(503).is_none());

    let schema = arc_isle::emit_schema(&run.spec, "feed").unwrap();
    assert_eq!(schema["properties"]["entries"]["items"], json!({ "$ref": "#/$defs/news_entry" }));
    assert_eq!(schema["$defs"]["news_entry"]["required"], json!(["id", "title"]));
}

#[test]
fn import_cycle_aborts_before_semantic_checks() {
    let temp = TempDir::new().unwrap();
    // `unicorn` would be diagnosed if validation ever got that far
    write(temp.path(), "a.yaml", "types:\n  user:\n    pet: unicorn\n  _import: b.yaml\n");
    write(temp.path(), "b.yaml", "_import: a.yaml\n");
    let err = validate(temp.path().join("a.yaml")).unwrap_err();
    assert!(matches!(err, StructuralError::ImportCycle { .. }));
    let message = err.to_string();
    assert!(message.contains("a.yaml -> "), "{message}");
    assert!(message.contains("b.yaml"), "{message}");
}

#[test]
fn missing_import_names_the_importer() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.yaml", "interfaces:\n  - _import: gone.yaml\n");
    let err = validate(temp.path().join("main.yaml")).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("gone.yaml"), "{message}");
    assert!(message.contains("imported from"), "{message}");
    assert!(message.contains("interfaces[0]._import"), "{message}");
}

#[test]
fn imports_resolve_against_the_root_directory() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.yaml", "types:\n  _import: deep/nested/a.yaml\n");
    write(temp.path(), "deep/nested/a.yaml", "a:\n  b: b\n_import: shared/b.yaml\n");
    write(temp.path(), "shared/b.yaml", "b:\n  a: a?\n");
    let run = validate(temp.path().join("main.yaml")).unwrap();
    assert!(run.diagnostics.is_empty(), "{:?}", run.diagnostics);
    assert_eq!(run.spec.registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn duplicate_declarations_across_imports_keep_the_first() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.yaml",
        "types:\n  _import: [first.yaml, second.yaml]\ninterfaces:\n  - {path: /users, method: get}\n  - {path: users/, method: GET}\n",
    );
    write(temp.path(), "first.yaml", "user:\n  id: int\n");
    write(temp.path(), "second.yaml", "user:\n  id: str\n");

    for parallel_imports in [true, false] {
        let run = validate_with(temp.path().join("main.yaml"), &ValidateOptions { parallel_imports }).unwrap();
        let dups: Vec<_> = run.diagnostics.iter().filter(|d| d.code == Code::DuplicateDeclaration).collect();
        assert_eq!(dups.len(), 2, "{:?}", run.diagnostics);
        assert!(dups[0].location.file.ends_with("second.yaml"));
        let user = run.spec.registry.get("user").unwrap();
        assert!(user.location.file.ends_with("first.yaml"));
        assert_eq!(run.spec.interfaces.len(), 1);
    }
}

#[test]
fn list_imports_merge_in_declaration_order() {
    let temp = TempDir::new().unwrap();
    let files: Vec<String> = (0..8).map(|i| format!("t{i}.yaml")).collect();
    for (i, file) in files.iter().enumerate() {
        write(temp.path(), file, &format!("type_{i}:\n  n: int\n"));
    }
    write(temp.path(), "main.yaml", &format!("types:\n  _import: [{}]\n", files.join(", ")));
    let run = validate(temp.path().join("main.yaml")).unwrap();
    let names: Vec<_> = run.spec.registry.names().collect();
    let expected: Vec<String> = (0..8).map(|i| format!("type_{i}")).collect();
    assert_eq!(names, expected);
}

#[test]
fn semantic_errors_do_not_abort_the_run() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.yaml",
        "types:\n  user:\n    pet: unicorn\n    tags: array[int?]\ninterfaces:\n  - path: users/{id}/{id}\n    method: post\n    query: {q: str}\n    body_type: multipart\n    response:\n      200: user\n      2xx: user\n      600: user\n",
    );
    let run = validate(temp.path().join("main.yaml")).unwrap();
    let codes: Vec<Code> = run.diagnostics.iter().map(|d| d.code).collect();
    for code in [
        Code::UndeclaredType,
        Code::InvalidOptional,
        Code::DuplicatePathParameter,
        Code::FieldNotAllowed,
        Code::InvalidBodyType,
        Code::InvalidStatusKey,
    ] {
        assert!(codes.contains(&code), "missing {code}: {codes:?}");
    }
    assert_eq!(run.spec.interfaces.len(), 1);
    assert_eq!(run.errors().filter(|d| d.code == Code::UndeclaredType).count(), 1);
}

#[test]
fn empty_root_types_section_merges_with_imported_types() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.yaml",
        "types:\n_import: more.yaml\ninterfaces:\n  - path: users\n    method: get\n    response: user\n",
    );
    write(temp.path(), "more.yaml", "types:\n  user:\n    id: int\n");
    let run = validate(temp.path().join("main.yaml")).unwrap();
    assert!(run.diagnostics.is_empty(), "{:?}", run.diagnostics);
    assert!(run.spec.registry.contains("user"));
}

#[test]
fn shadowed_duplicate_types_are_still_resolved() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.yaml", "types:\n  _import: [a.yaml, b.yaml]\n");
    write(temp.path(), "a.yaml", "user:\n  id: int\n");
    write(temp.path(), "b.yaml", "user:\n  pet: unicorn\n");
    let run = validate(temp.path().join("main.yaml")).unwrap();
    let undeclared: Vec<_> = run.errors().filter(|d| d.code == Code::UndeclaredType).collect();
    assert_eq!(undeclared.len(), 1, "{:?}", run.diagnostics);
    assert!(undeclared[0].location.file.ends_with("b.yaml"));
    assert_eq!(run.errors().filter(|d| d.code == Code::DuplicateDeclaration).count(), 1);
}
