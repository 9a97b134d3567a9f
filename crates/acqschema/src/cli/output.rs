//! Output formatting for the acqschema CLI
//!
//! Table output is written as results arrive; JSON and YAML render a report
//! collected at the end of the run.

use std::io::{self, Write};

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::{AcqSchemaError, Result};
use crate::init::InitReport;
use crate::validation::{ValidationError, ValidationErrorKind, ValidationSummary};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Print any serializable report as JSON or YAML
pub fn render_serialized<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| AcqSchemaError::SerializationError(e.to_string()))?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(value)?;
            println!("{}", yaml);
        }
        OutputFormat::Table => {
            return Err(AcqSchemaError::SerializationError(
                "table output is not a serialized format".to_string(),
            ))
        }
    }
    Ok(())
}

/// Collected result of a `validate` run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub summary: ValidationSummary,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        let mut summary = ValidationSummary::default();
        for error in &errors {
            summary.record(error);
        }
        Self {
            valid: summary.is_success(),
            summary,
            errors,
        }
    }
}

/// Streams validation errors as table rows
pub struct TableWriter<W: Write> {
    out: W,
}

impl TableWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self) -> Result<()> {
        self.write_header().map_err(stdout_error)
    }

    pub fn row(&mut self, error: &ValidationError) -> Result<()> {
        self.write_row(error).map_err(stdout_error)
    }

    pub fn footer(&mut self, summary: &ValidationSummary) -> Result<()> {
        self.write_footer(summary).map_err(stdout_error)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", "Validation Results".cyan().bold())?;
        writeln!(self.out, "{}", "=".repeat(60))
    }

    fn write_row(&mut self, error: &ValidationError) -> io::Result<()> {
        let label = match error.kind {
            ValidationErrorKind::SchemaNotFound | ValidationErrorKind::InvalidArtifact => {
                error.kind.code().yellow().bold()
            }
            _ => error.kind.code().red().bold(),
        };
        let mut location = format!("sub-{}", error.subject);
        if let Some(session) = &error.session {
            location.push_str(&format!(" ses-{}", session));
        }

        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} {} [{}] {}",
            "x".red(),
            label,
            location.dimmed(),
            error.acquisition
        )?;
        if let Some(field) = &error.field {
            writeln!(self.out, "  {} {}", "Field:".dimmed(), field)?;
        }
        writeln!(self.out, "  {}", error.message)?;
        if let Some(instance) = &error.instance {
            writeln!(self.out, "  {} {}", "Found:".dimmed(), instance)?;
        }
        writeln!(self.out, "  {} {}", "Record:".dimmed(), error.record.display())
    }

    fn write_footer(&mut self, summary: &ValidationSummary) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", "-".repeat(60))?;
        if summary.is_success() {
            writeln!(self.out, "{} All records conform", "+".green())?;
        } else {
            writeln!(
                self.out,
                "{} {} error(s)",
                "x".red(),
                summary.total.to_string().red()
            )?;
            for (kind, count) in &summary.by_kind {
                writeln!(self.out, "  {:<20} {}", kind.code(), count)?;
            }
        }
        self.out.flush()
    }
}

fn stdout_error(source: io::Error) -> AcqSchemaError {
    AcqSchemaError::io("<stdout>", source)
}

/// Render an `init` report
pub fn render_init(report: &InitReport, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Table {
        return render_serialized(report, format);
    }
    write_init_table(&mut io::stdout(), report).map_err(stdout_error)
}

fn write_init_table<W: Write>(out: &mut W, report: &InitReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("Schemas inferred from sub-{}", report.exemplar)
            .cyan()
            .bold()
    )?;
    writeln!(out, "{}", "=".repeat(60))?;
    for artifact in &report.artifacts {
        writeln!(
            out,
            "{} {} ({} branch(es), {} record(s))",
            "+".green(),
            artifact.acquisition,
            artifact.branches,
            artifact.members
        )?;
        if let Some(instrument) = &artifact.instrument {
            writeln!(out, "  {} {}", "Instrument:".dimmed(), instrument)?;
        }
        writeln!(out, "  {}", artifact.path.display().to_string().dimmed())?;
    }
    for failure in &report.failures {
        writeln!(out, "{} {}", "x".red(), failure.acquisition.red().bold())?;
        writeln!(out, "  {}", failure.reason)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "{} schema(s) written, {} failed",
        report.artifacts.len(),
        report.failures.len()
    )?;
    out.flush()
}
