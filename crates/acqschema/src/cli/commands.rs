//! CLI command definitions for acqschema
//!
//! Provides Clap-based command definitions for schema initialization and
//! dataset validation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use super::output::{render_init, render_serialized, OutputFormat, TableWriter, ValidationReport};
use super::ExitCode;
use crate::config::ConfigRegistry;
use crate::error::Result;
use crate::init::{initialize, InitOptions};
use crate::layout::FsLayout;
use crate::settings::Settings;
use crate::validation::{
    SessionSelection, SubjectSelection, ValidationError, ValidationSummary, Validator,
};

/// acqschema CLI
///
/// Infer acquisition schemas from an exemplar subject and validate the
/// sidecar metadata of every other subject against them.
#[derive(Parser, Debug)]
#[command(name = "acqschema")]
#[command(about = "Infer and enforce acquisition metadata schemas", long_about = None)]
#[command(version)]
pub struct AcqSchemaCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: AcqSchemaCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum AcqSchemaCommands {
    /// Infer schemas from the exemplar subject
    ///
    /// Writes one artifact per acquisition into the schema folder, replacing
    /// any earlier artifacts.
    Init(InitArgs),

    /// Validate subjects against the inferred schemas
    Validate(ValidateArgs),
}

/// Switches given as `--flag` or `--flag=false` override the settings file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Root of the dataset
    pub bids_path: PathBuf,

    /// Infer one schema per session instead of one shared by all sessions
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub varying_sessions: Option<bool>,

    /// Branch schemas per physical instrument
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub scanner_specific: Option<bool>,

    /// Branch schemas per instrument software version
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub version_specific: Option<bool>,

    /// Subject whose records seed the schemas (default: first subject)
    #[arg(long)]
    pub exemplar: Option<String>,

    /// Reject fields outside the modality vocabulary
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub disallow_additional_fields: Option<bool>,

    /// Schema folder relative to the dataset root
    #[arg(long)]
    pub schema_folder: Option<PathBuf>,

    /// Directory of `<modality>_tags.json` vocabulary overrides
    #[arg(long, env = "ACQSCHEMA_VOCABULARY_DIR")]
    pub vocabulary_dir: Option<PathBuf>,

    /// Settings file (default: <BIDS_PATH>/acqschema.toml when present)
    #[arg(long, env = "ACQSCHEMA_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Output format for the init report
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Root of the dataset
    pub bids_path: PathBuf,

    /// Subjects to validate (default: all)
    #[arg(long, num_args = 1..)]
    pub participant_label: Vec<String>,

    /// Sessions to validate (default: any, including none)
    #[arg(long, num_args = 1..)]
    pub session_label: Vec<String>,

    /// Schema folder relative to the dataset root
    #[arg(long)]
    pub schema_folder: Option<PathBuf>,

    /// Settings file (default: <BIDS_PATH>/acqschema.toml when present)
    #[arg(long, env = "ACQSCHEMA_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Output format for validation results
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Execute the init command
pub fn execute_init(args: InitArgs) -> Result<ExitCode> {
    let mut settings = Settings::load(args.settings.as_deref(), &args.bids_path)?;
    apply_overrides(&args, &mut settings);

    let registry = match &settings.vocabulary_dir {
        Some(dir) => ConfigRegistry::with_vocabulary_dir(dir),
        None => ConfigRegistry::new(),
    };
    let layout = FsLayout::open(&args.bids_path)?;
    info!(
        "indexed {} sidecar(s) under {}",
        layout.len(),
        args.bids_path.display()
    );

    let options = InitOptions {
        exemplar: args.exemplar.map(|label| strip_prefix(&label, "sub-")),
        ..InitOptions::from(&settings)
    };
    let report = initialize(&layout, &registry, &options)?;
    render_init(&report, args.format)?;

    Ok(if report.is_complete() {
        ExitCode::Success
    } else {
        ExitCode::InferenceError
    })
}

/// Execute the validate command
pub fn execute_validate(args: ValidateArgs) -> Result<ExitCode> {
    let settings = Settings::load(args.settings.as_deref(), &args.bids_path)?;
    let schema_folder = args.schema_folder.unwrap_or(settings.schema_folder);
    let layout = FsLayout::open(&args.bids_path)?;
    let validator = Validator::from_manifest(&layout, schema_folder)?;

    let subjects = if args.participant_label.is_empty() {
        SubjectSelection::All
    } else {
        SubjectSelection::Only(labels(&args.participant_label, "sub-"))
    };
    let sessions = if args.session_label.is_empty() {
        SessionSelection::Any
    } else {
        SessionSelection::Only(labels(&args.session_label, "ses-"))
    };
    let run = validator.validate(subjects, sessions);

    let summary = match args.format {
        OutputFormat::Table => {
            let mut table = TableWriter::stdout();
            let mut summary = ValidationSummary::default();
            table.header()?;
            for error in run {
                let error = error?;
                summary.record(&error);
                table.row(&error)?;
            }
            table.footer(&summary)?;
            summary
        }
        format => {
            let errors: Vec<ValidationError> = run.collect::<Result<_>>()?;
            let report = ValidationReport::new(errors);
            render_serialized(&report, format)?;
            report.summary
        }
    };

    info!("{} validation error(s)", summary.total);
    Ok(ExitCode::from_validation_result(!summary.is_success()))
}

/// Command-line values win over the settings file
fn apply_overrides(args: &InitArgs, settings: &mut Settings) {
    if let Some(varying) = args.varying_sessions {
        settings.uniform_sessions = !varying;
    }
    if let Some(scanner_specific) = args.scanner_specific {
        settings.scanner_specific = scanner_specific;
    }
    if let Some(version_specific) = args.version_specific {
        settings.version_specific = version_specific;
    }
    if let Some(disallow) = args.disallow_additional_fields {
        settings.allow_additional_fields = !disallow;
    }
    if let Some(folder) = &args.schema_folder {
        settings.schema_folder = folder.clone();
    }
    if let Some(dir) = &args.vocabulary_dir {
        settings.vocabulary_dir = Some(dir.clone());
    }
}

fn labels(values: &[String], prefix: &str) -> Vec<String> {
    values.iter().map(|value| strip_prefix(value, prefix)).collect()
}

/// Accept labels with or without their entity prefix
fn strip_prefix(label: &str, prefix: &str) -> String {
    label.strip_prefix(prefix).unwrap_or(label).to_string()
}
