//! acqschema
//!
//! Infers an acquisition schema (which sidecar fields each class of
//! acquisition must or may carry, and which values they may take) from one
//! exemplar subject of a dataset, then validates every other subject against
//! it and reports each deviation with its location and reason.
//!
//! ## Architecture
//!
//! 1. **Vocabularies** (`config`): per-modality tag vocabularies, loaded once
//!    and cached by [`ConfigRegistry`].
//! 2. **Records** (`entities`, `layout`): sidecar records with their
//!    identifying entities, served by a [`DatasetLayout`].
//! 3. **Factoring** (`factoring`): which entities may vary across records
//!    merged into one schema.
//! 4. **Inference** (`union`): [`UnionSchemaBuilder`] merges a comparable
//!    group into required/optional fields with observed value domains,
//!    branched by instrument.
//! 5. **Artifacts** (`persist`): JSON Schema documents under the dataset's
//!    schema folder.
//! 6. **Validation** (`validation`): [`Validator`] yields structured
//!    [`ValidationError`]s lazily.
//! 7. **CLI** (`cli`): `acqschema init` and `acqschema validate`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use acqschema::{initialize, ConfigRegistry, FsLayout, InitOptions, Validator};
//!
//! let layout = FsLayout::open("/data/ds").unwrap();
//! let registry = ConfigRegistry::new();
//! let options = InitOptions::default();
//! initialize(&layout, &registry, &options).unwrap();
//!
//! let validator = Validator::new(&layout, options.locator());
//! for error in validator.validate_all().unwrap() {
//!     println!("{}", error);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod factoring;
pub mod init;
pub mod layout;
pub mod persist;
pub mod settings;
pub mod union;
pub mod validation;

pub use cli::{AcqSchemaCli, AcqSchemaCommands, ExitCode, OutputFormat};
pub use config::{ConfigRegistry, Discrimination, Modality, TagRef, Vocabulary};
pub use entities::{Entities, Entity, Record, SUBJECT_PLACEHOLDER};
pub use error::{AcqSchemaError, ErrorCategory, Result};
pub use factoring::{build_query, FactoringPolicy};
pub use init::{initialize, InitOptions, InitReport};
pub use layout::{Constraint, DatasetLayout, FsLayout, MemoryLayout, Query};
pub use persist::{ArtifactLocator, InitManifest, JsonSchemaWriter, SchemaPersister, SchemaWriter};
pub use settings::Settings;
pub use union::{BranchKey, FieldConstraint, SchemaBranch, UnionSchema, UnionSchemaBuilder, ValueDomain};
pub use validation::{
    SessionSelection, SubjectSelection, ValidationError, ValidationErrorKind, ValidationRun,
    ValidationSummary, Validator,
};

/// Run the CLI application
///
/// This is the main entry point for the CLI binary.
pub fn run_cli(cli: AcqSchemaCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from_error(&e)
        }
    }
}
