use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

impl SourceInfo {
    /// Location of `span` within this source
    pub fn locate(&self, span: Range<usize>) -> SourceLocation {
        SourceLocation {
            file_path: self.file_path.clone(),
            span,
            content: self.content.clone(),
        }
    }
}

/// A span within a config file
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Error type for merge conflicts
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<SourceLocation>,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    /// Offending definitions, if they can be pointed at
    pub labels: Vec<SourceLocation>,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, location: SourceLocation) -> Self {
        self.labels.push(location);
        self
    }
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, error: std::io::Error },
    Parse { path: PathBuf, error: toml::de::Error },
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io { path, error } => {
                write!(f, "Failed to read '{}': {}", path.display(), error)
            }
            LoadError::Parse { path, error } => {
                write!(f, "Failed to parse '{}': {}", path.display(), error)
            }
            LoadError::ImportCycle { path, cycle } => {
                write!(
                    f,
                    "Import cycle detected at '{}': involves {} file(s)",
                    path.display(),
                    cycle.len()
                )
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

impl From<ValidationError> for Diagnostic {
    fn from(error: ValidationError) -> Self {
        Diagnostic::Error(Error::Validation(error))
    }
}

/// Render a report with one label per location, first one highlighted
fn render_report(
    title: String,
    note: &str,
    locations: &[SourceLocation],
    label_msgs: (&str, &str),
    output: &mut Vec<u8>,
) {
    use ariadne::{Color, Label, Report, ReportKind};

    let file_id = |loc: &SourceLocation| loc.file_path.to_string_lossy().to_string();

    let first = &locations[0];
    let mut report = Report::build(ReportKind::Error, (file_id(first), first.span.clone()))
        .with_config(ariadne::Config::default().with_color(false))
        .with_message(title)
        .with_note(note);

    for (idx, loc) in locations.iter().enumerate() {
        report = report.with_label(
            Label::new((file_id(loc), loc.span.clone()))
                .with_message(if idx == 0 { label_msgs.0 } else { label_msgs.1 })
                .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
        );
    }

    // One cache holding every file referenced by the labels
    let mut seen = std::collections::HashSet::new();
    let sources: Vec<(String, String)> = locations
        .iter()
        .filter(|loc| seen.insert(file_id(loc)))
        .map(|loc| (file_id(loc), loc.content.clone()))
        .collect();

    report
        .finish()
        .write(ariadne::sources(sources), &mut *output)
        .ok();
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let warning_msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) if !merge_error.conflicts.is_empty() => {
                render_report(
                    format!("Merge conflict in field '{}'", merge_error.field_path),
                    &merge_error.message,
                    &merge_error.conflicts,
                    ("first definition here", "conflicts with this definition"),
                    &mut output,
                );
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                let error_msg = format!(
                    "Merge conflict in field '{}': {}\n",
                    merge_error.field_path, merge_error.message
                );
                output.extend_from_slice(error_msg.as_bytes());
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let error_msg = format!(
                    "Validation error in '{}': {}\n",
                    validation_error.field_path, validation_error.message
                );
                output.extend_from_slice(error_msg.as_bytes());

                if !validation_error.labels.is_empty() {
                    render_report(
                        format!("Invalid value for '{}'", validation_error.field_path),
                        &validation_error.message,
                        &validation_error.labels,
                        ("defined here", "also defined here"),
                        &mut output,
                    );
                }
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
