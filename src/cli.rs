//! CLI: check (diagnostics) | schema (JSON Schema export)
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;

use arc_isle::schema::{self, EmitterError};
use arc_isle::{Diagnostic, Severity, ValidateOptions, Validation};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// validate API description documents and export JSON Schemas for their types
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct CommandLineInterface {
    /// log phase boundaries to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// validate one or more root documents and report every diagnostic
    Check(CheckOut),
    /// emit the JSON Schema of a declared type
    Schema(SchemaOut),
}

#[derive(Args, Debug, Clone)]
struct LoadSettings {
    /// load imports one file at a time
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    load_settings: LoadSettings,

    /// One or more root documents. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    load_settings: LoadSettings,

    /// root document
    #[arg(long, short)]
    input: PathBuf,

    /// declared type to export
    #[arg(long = "type", required_unless_present = "all", conflicts_with = "all")]
    type_name: Option<String>,

    /// export every declared type under `$defs`
    #[arg(long)]
    all: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

/// Whether the run found Error-severity problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    Failed,
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal: Option<String>,
    diagnostics: &'a [Diagnostic],
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl LoadSettings {
    fn options(&self) -> ValidateOptions {
        ValidateOptions { parallel_imports: !self.sequential }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<Outcome> {
        match &self.cmd {
            Command::Check(target) => target.run(),
            Command::Schema(target) => target.run(),
        }
    }
}

impl CheckOut {
    fn run(&self) -> Result<Outcome> {
        let options = self.load_settings.options();
        let roots = resolve_file_path_patterns(&self.input)?;
        let mut outcome = Outcome::Clean;
        let mut runs: Vec<(PathBuf, Result<Validation, String>)> = Vec::new();
        for root in roots {
            tracing::debug!(root = %root.display(), "checking");
            let run = arc_isle::validate_with(&root, &options).map_err(|e| e.to_string());
            if run.as_ref().map_or(true, Validation::has_errors) {
                outcome = Outcome::Failed;
            }
            runs.push((root, run));
        }

        match self.format {
            ReportFormat::Json => {
                let reports = runs
                    .iter()
                    .map(|(file, run)| match run {
                        Ok(v) => FileReport { file, fatal: None, diagnostics: &v.diagnostics },
                        Err(e) => FileReport { file, fatal: Some(e.clone()), diagnostics: &[] },
                    })
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
            ReportFormat::Text => {
                for (file, run) in &runs {
                    match run {
                        Ok(v) => print_validation(file, v),
                        Err(e) => eprintln!("{} {e}", "fatal:".red().bold()),
                    }
                }
            }
        }
        Ok(outcome)
    }
}

impl SchemaOut {
    fn run(&self) -> Result<Outcome> {
        let run = arc_isle::validate_with(&self.input, &self.load_settings.options())?;
        for diagnostic in run.errors() {
            eprintln!("{}", render(diagnostic));
        }

        let emitted = match &self.type_name {
            Some(name) => schema::emit_schema(&run.spec, name),
            None => schema::emit_all(&run.spec.registry),
        };
        let (schema, outcome) = match emitted {
            Ok(schema) => (schema, Outcome::Clean),
            Err(EmitterError::UnknownType(name)) => {
                anyhow::bail!("type `{name}` is not declared in {}", self.input.display())
            }
            Err(error @ EmitterError::Incomplete { .. }) => {
                eprintln!("{} {error}", "warning:".yellow().bold());
                let partial = error.partial().cloned().unwrap_or_default();
                (partial, Outcome::Failed)
            }
        };

        let schema_src = serde_json::to_string_pretty(&schema)?;
        if let Some(out) = self.out.as_ref() {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, &schema_src).with_context(|| format!("failed to write {}", out.display()))?;
        } else {
            println!("{schema_src}");
        }
        Ok(outcome)
    }
}

fn print_validation(file: &Path, run: &Validation) {
    for diagnostic in &run.diagnostics {
        println!("{}", render(diagnostic));
    }
    let errors = run.errors().count();
    let warnings = run.warnings().count();
    let summary = format!("{}: {errors} error(s), {warnings} warning(s)", file.display());
    if errors > 0 {
        println!("{}", summary.red());
    } else {
        println!("{}", summary.green());
    }
}

fn render(diagnostic: &Diagnostic) -> String {
    let head = match diagnostic.severity {
        Severity::Error => format!("error[{}]", diagnostic.code).red().bold(),
        Severity::Warning => format!("warning[{}]", diagnostic.code).yellow().bold(),
    };
    format!(
        "{head}: {}\n  {} {}",
        diagnostic.message,
        "-->".blue(),
        diagnostic.location
    )
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                anyhow::bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
