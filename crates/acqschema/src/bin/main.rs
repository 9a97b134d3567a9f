//! acqschema CLI
//!
//! # Usage
//!
//! ```bash
//! # Infer schemas from the first subject
//! acqschema init /data/ds --scanner-specific
//!
//! # Validate two subjects and print JSON
//! acqschema validate /data/ds --participant-label 02 03 --format json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation found errors
//! - 3: Invalid input or arguments
//! - 4: File not found, unreadable or malformed
//! - 5: Configuration error
//! - 6: Schema inference failed for at least one acquisition
//! - 10: Internal error

use acqschema::{run_cli, AcqSchemaCli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = AcqSchemaCli::parse();

    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
