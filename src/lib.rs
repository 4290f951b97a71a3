//! Semantic engine for an API description language: `types` describing
//! reusable data shapes and `interfaces` describing HTTP endpoints.
//!
//! ```no_run
//! let run = arc_isle::validate("api/main.yaml")?;
//! for diagnostic in &run.diagnostics {
//!     eprintln!("{diagnostic}");
//! }
//! let schema = arc_isle::schema::emit_schema(&run.spec, "news_entry");
//! # Ok::<(), arc_isle::StructuralError>(())
//! ```
pub mod diagnostics;
pub mod error;
pub mod interfaces;
pub mod loader;
pub mod node;
pub mod registry;
pub mod schema;
pub mod sections;
pub mod type_expr;
pub mod validate;

pub use diagnostics::{Code, Diagnostic, Diagnostics, Location, Severity};
pub use error::StructuralError;
pub use loader::{Document, load, load_with};
pub use schema::{EmitterError, emit_schema};
pub use validate::{ResolvedSpec, ValidateOptions, Validation, validate, validate_document, validate_with};
