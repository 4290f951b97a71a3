//! Fatal errors. Anything here aborts the run before semantic validation.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::node::TreePath;

/// Where an `_import` directive pointed at the failing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub file: PathBuf,
    pub path: TreePath,
}

impl fmt::Display for ImportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.file.display(), self.path)
    }
}

#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("failed to read `{}`{}: {source}", .path.display(), imported_from(.importer))]
    Io {
        path: PathBuf,
        importer: Option<ImportSite>,
        source: std::io::Error,
    },
    #[error("failed to parse `{}`{}: {source}", .path.display(), imported_from(.importer))]
    Parse {
        path: PathBuf,
        importer: Option<ImportSite>,
        source: serde_yaml::Error,
    },
    #[error("import cycle detected: {}", render_chain(.chain))]
    ImportCycle { chain: Vec<PathBuf> },
    #[error("invalid `_import` in `{}` at {path}: {message}", .file.display())]
    InvalidImport {
        file: PathBuf,
        path: TreePath,
        message: String,
    },
    #[error("malformed document `{}` at {path}: {message}", .file.display())]
    InvalidShape {
        file: PathBuf,
        path: TreePath,
        message: String,
    },
}

fn imported_from(importer: &Option<ImportSite>) -> String {
    match importer {
        Some(site) => format!(" (imported from {site})"),
        None => String::new(),
    }
}

fn render_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
