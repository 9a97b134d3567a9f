//! CLI module for acqschema
//!
//! `init` infers schemas from an exemplar subject, `validate` checks the
//! other subjects against them.

pub mod commands;
pub mod output;

pub use commands::{AcqSchemaCli, AcqSchemaCommands, InitArgs, ValidateArgs};
pub use output::OutputFormat;

use crate::error::{AcqSchemaError, ErrorCategory};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution, no validation errors
    Success = 0,
    /// Validation found errors
    ValidationError = 1,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found, unreadable or malformed
    FileError = 4,
    /// Unsupported datatype, bad vocabulary or settings
    ConfigurationError = 5,
    /// Schema inference failed for at least one acquisition
    InferenceError = 6,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code from validation result
    pub fn from_validation_result(has_errors: bool) -> Self {
        if has_errors {
            ExitCode::ValidationError
        } else {
            ExitCode::Success
        }
    }

    /// Exit code for a fatal error
    pub fn from_error(error: &AcqSchemaError) -> Self {
        if !error.is_user_error() {
            return ExitCode::InternalError;
        }
        match error.category() {
            ErrorCategory::Configuration => ExitCode::ConfigurationError,
            ErrorCategory::Inference => ExitCode::InferenceError,
            ErrorCategory::Io => ExitCode::FileError,
            ErrorCategory::Input => ExitCode::InvalidInput,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: AcqSchemaCli) -> Result<ExitCode, AcqSchemaError> {
    match cli.command {
        AcqSchemaCommands::Init(args) => commands::execute_init(args),
        AcqSchemaCommands::Validate(args) => commands::execute_validate(args),
    }
}
