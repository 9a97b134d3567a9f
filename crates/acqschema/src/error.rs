//! Error types for schema inference and validation
//!
//! Fatal conditions (configuration, inference, I/O) are `AcqSchemaError`.
//! Deviations found while validating records are not errors of the tool and
//! live in [`crate::validation::ValidationError`] instead.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Coarse classification of fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown datatype, malformed vocabulary or settings; aborts the run
    Configuration,
    /// Schema could not be inferred for one acquisition; other acquisitions continue
    Inference,
    /// Filesystem or parse failure with a known path; aborts the run
    Io,
    /// Bad command-line or API input
    Input,
}

/// Main error type for acquisition schema operations
#[derive(Error, Debug)]
pub enum AcqSchemaError {
    /// Datatype label has no modality mapping
    #[error("Unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    /// Vocabulary file could not be parsed or names an unknown tag
    #[error("Malformed vocabulary '{path}': {reason}")]
    MalformedVocabulary { path: String, reason: String },

    /// Settings file could not be parsed
    #[error("Invalid settings '{path}': {reason}")]
    InvalidSettings { path: String, reason: String },

    /// Query for comparable records matched nothing usable
    #[error("No comparable records for acquisition '{0}'")]
    NoComparableRecords(String),

    /// Discriminating tag values cannot partition the comparable group
    #[error("Cannot partition acquisition '{acquisition}' on tag '{tag}': {reason}")]
    ConflictingPartition {
        acquisition: String,
        tag: String,
        reason: String,
    },

    /// Filesystem failure
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON file
    #[error("JSON error at '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization failure while rendering output
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AcqSchemaError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AcqSchemaError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a JSON error bound to a path
    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        AcqSchemaError::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a malformed vocabulary error
    pub fn malformed_vocabulary(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AcqSchemaError::MalformedVocabulary {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AcqSchemaError::InvalidInput(msg.into())
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            AcqSchemaError::UnsupportedDatatype(_)
            | AcqSchemaError::MalformedVocabulary { .. }
            | AcqSchemaError::InvalidSettings { .. } => ErrorCategory::Configuration,
            AcqSchemaError::NoComparableRecords(_) | AcqSchemaError::ConflictingPartition { .. } => {
                ErrorCategory::Inference
            }
            AcqSchemaError::Io { .. }
            | AcqSchemaError::Json { .. }
            | AcqSchemaError::SerializationError(_) => ErrorCategory::Io,
            AcqSchemaError::InvalidInput(_) => ErrorCategory::Input,
        }
    }

    /// Whether the error only affects a single acquisition
    pub fn is_acquisition_local(&self) -> bool {
        self.category() == ErrorCategory::Inference
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        !matches!(self, AcqSchemaError::SerializationError(_))
    }
}

impl From<serde_yaml::Error> for AcqSchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        AcqSchemaError::SerializationError(format!("YAML error: {}", err))
    }
}

/// Result type alias for acquisition schema operations
pub type Result<T> = std::result::Result<T, AcqSchemaError>;
