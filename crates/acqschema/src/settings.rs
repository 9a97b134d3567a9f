//! Run settings
//!
//! Settings come from a TOML file: `--settings FILE` when given, otherwise
//! `<dataset>/acqschema.toml` when present, otherwise the defaults below.
//! Command-line flags are applied on top by the CLI.
//!
//! ```toml
//! schema_folder = ".acqschema"
//! uniform_sessions = true
//! scanner_specific = false
//! version_specific = false
//! allow_additional_fields = true
//! vocabulary_dir = "vocabularies"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AcqSchemaError, Result};
use crate::persist::DEFAULT_SCHEMA_FOLDER;

/// Settings file looked up in the dataset root
pub const SETTINGS_FILE: &str = "acqschema.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Schema folder relative to the dataset root
    #[serde(default = "default_schema_folder")]
    pub schema_folder: PathBuf,
    /// Sessions share one schema per acquisition
    #[serde(default = "default_true")]
    pub uniform_sessions: bool,
    #[serde(default)]
    pub scanner_specific: bool,
    #[serde(default)]
    pub version_specific: bool,
    /// Keep fields outside the vocabulary instead of rejecting them
    #[serde(default = "default_true")]
    pub allow_additional_fields: bool,
    /// Directory of `<modality>_tags.json` overrides; relative paths are
    /// resolved against the settings file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_dir: Option<PathBuf>,
}

fn default_schema_folder() -> PathBuf {
    PathBuf::from(DEFAULT_SCHEMA_FOLDER)
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_folder: default_schema_folder(),
            uniform_sessions: true,
            scanner_specific: false,
            version_specific: false,
            allow_additional_fields: true,
            vocabulary_dir: None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML; `origin` names the source in errors
    pub fn from_toml(source: &str, origin: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(source).map_err(|e| AcqSchemaError::InvalidSettings {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        if settings.schema_folder.as_os_str().is_empty() || settings.schema_folder.is_absolute() {
            return Err(AcqSchemaError::InvalidSettings {
                path: origin.to_string(),
                reason: "schema_folder must be a non-empty relative path".to_string(),
            });
        }
        Ok(settings)
    }

    /// Read a settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| AcqSchemaError::io(path, e))?;
        let mut settings = Self::from_toml(&source, &path.display().to_string())?;
        if let (Some(dir), Some(parent)) = (&settings.vocabulary_dir, path.parent()) {
            if dir.is_relative() {
                settings.vocabulary_dir = Some(parent.join(dir));
            }
        }
        Ok(settings)
    }

    /// Settings for a dataset: explicit file, else the dataset's own file, else defaults
    pub fn load(explicit: Option<&Path>, dataset_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            debug!("loading settings from {}", path.display());
            return Self::from_file(path);
        }
        let candidate = dataset_root.join(SETTINGS_FILE);
        if candidate.is_file() {
            debug!("loading settings from {}", candidate.display());
            return Self::from_file(&candidate);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let settings = Settings::from_toml("", "empty.toml").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.schema_folder, PathBuf::from(".acqschema"));
        assert!(settings.uniform_sessions);
        assert!(settings.allow_additional_fields);
    }

    #[test]
    fn test_partial_file() {
        let settings = Settings::from_toml(
            "uniform_sessions = false\nscanner_specific = true\n",
            "partial.toml",
        )
        .unwrap();
        assert!(!settings.uniform_sessions);
        assert!(settings.scanner_specific);
        assert!(!settings.version_specific);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Settings::from_toml("scanner = true", "bad.toml").unwrap_err();
        assert!(matches!(err, AcqSchemaError::InvalidSettings { ref path, .. } if path == "bad.toml"));
    }

    #[test]
    fn test_absolute_schema_folder_rejected() {
        assert!(Settings::from_toml("schema_folder = \"/tmp/x\"", "abs.toml").is_err());
    }

    #[test]
    fn test_load_precedence() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(None, dir.path()).unwrap(), Settings::default());

        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "schema_folder = \"schemas\"\nvocabulary_dir = \"vocab\"\n",
        )
        .unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings.schema_folder, PathBuf::from("schemas"));
        assert_eq!(settings.vocabulary_dir, Some(dir.path().join("vocab")));

        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "version_specific = true\n").unwrap();
        let settings = Settings::load(Some(&explicit), dir.path()).unwrap();
        assert!(settings.version_specific);
        assert_eq!(settings.schema_folder, PathBuf::from(".acqschema"));
    }
}
