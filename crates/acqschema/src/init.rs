//! Schema initialization
//!
//! Every data record of the exemplar subject seeds one acquisition schema.
//! The seed's comparable group is fetched across all subjects, merged into a
//! union schema and written to the schema folder. A failed inference is
//! recorded and the remaining acquisitions are still processed; I/O and
//! configuration errors abort the run.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigRegistry, Discrimination, Vocabulary};
use crate::entities::{Entity, Record};
use crate::error::{AcqSchemaError, Result};
use crate::factoring::{build_query, FactoringPolicy};
use crate::layout::{DatasetLayout, Query};
use crate::persist::{ArtifactLocator, InitManifest, SchemaPersister, DEFAULT_SCHEMA_FOLDER};
use crate::settings::Settings;
use crate::union::UnionSchemaBuilder;

/// Options for an `init` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub schema_folder: PathBuf,
    pub uniform_sessions: bool,
    pub scanner_specific: bool,
    pub version_specific: bool,
    pub allow_additional_fields: bool,
    /// Subject whose records seed the schemas; first subject when unset
    pub exemplar: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            schema_folder: PathBuf::from(DEFAULT_SCHEMA_FOLDER),
            uniform_sessions: true,
            scanner_specific: false,
            version_specific: false,
            allow_additional_fields: true,
            exemplar: None,
        }
    }
}

impl From<&Settings> for InitOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            schema_folder: settings.schema_folder.clone(),
            uniform_sessions: settings.uniform_sessions,
            scanner_specific: settings.scanner_specific,
            version_specific: settings.version_specific,
            allow_additional_fields: settings.allow_additional_fields,
            exemplar: None,
        }
    }
}

impl InitOptions {
    pub fn discrimination(&self) -> Discrimination {
        Discrimination {
            scanner_specific: self.scanner_specific,
            version_specific: self.version_specific,
        }
    }

    pub fn locator(&self) -> ArtifactLocator {
        ArtifactLocator::new(&self.schema_folder, self.uniform_sessions)
    }
}

/// Artifact written by `init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub acquisition: String,
    pub path: PathBuf,
    pub branches: usize,
    pub members: usize,
    /// Instrument model of the seed record, with its serial when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
}

/// Acquisition whose schema could not be inferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitFailure {
    pub acquisition: String,
    /// Exemplar record that seeded the attempt
    pub seed: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub exemplar: String,
    pub artifacts: Vec<ArtifactSummary>,
    pub failures: Vec<InitFailure>,
}

impl InitReport {
    /// Whether every acquisition of the exemplar got a schema
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Infer and persist a schema for every acquisition of the exemplar subject
pub fn initialize<L>(layout: &L, registry: &ConfigRegistry, options: &InitOptions) -> Result<InitReport>
where
    L: DatasetLayout + ?Sized,
{
    for datatype in layout.datatypes()? {
        registry.get_config(&datatype)?;
    }

    let subjects = layout.subjects()?;
    let exemplar = match &options.exemplar {
        Some(label) if subjects.contains(label) => label.clone(),
        Some(label) => {
            return Err(AcqSchemaError::invalid_input(format!(
                "exemplar subject '{}' not found in dataset",
                label
            )))
        }
        None => subjects
            .first()
            .cloned()
            .ok_or_else(|| AcqSchemaError::invalid_input("dataset has no subjects"))?,
    };
    info!("initializing schemas from exemplar sub-{}", exemplar);

    let seeds: Vec<Record> = layout
        .query(
            &Query::new()
                .with_exact(Entity::Subject, exemplar.as_str())
                .with_exact(Entity::Extension, ".json"),
        )?
        .into_iter()
        .filter(|record| !record.is_non_data())
        .collect();

    let policy = FactoringPolicy::for_sessions(options.uniform_sessions);
    let locator = options.locator();
    let builder = UnionSchemaBuilder::new().allow_additional_fields(options.allow_additional_fields);
    let persister = SchemaPersister::new();
    let schema_dir = locator.schema_dir(layout.root());

    let mut report = InitReport {
        exemplar: exemplar.clone(),
        ..InitReport::default()
    };
    let mut written: BTreeSet<PathBuf> = BTreeSet::new();

    for seed in &seeds {
        let path = locator.artifact_path(layout, &seed.entities)?;
        if written.contains(&path) {
            debug!("{} already covered by {}", seed.path.display(), path.display());
            continue;
        }
        let acquisition = seed.entities.acquisition_label();

        let datatype = seed.entities.get(Entity::Datatype).unwrap_or_default();
        let vocabulary = registry.get_config(datatype)?;
        let group = layout.query(&build_query(seed, &policy))?;
        let tags = vocabulary.discriminating_tags(options.discrimination());
        debug!(
            "{}: branching on {} tag(s), exemplar instrument {}",
            acquisition,
            tags.len(),
            describe_instrument(&vocabulary, seed).as_deref().unwrap_or("unknown")
        );

        let schema = match builder.build(seed, &group, &tags, &vocabulary.properties, &policy) {
            Ok(schema) => schema,
            Err(e) if e.is_acquisition_local() => {
                warn!("{}: {}", acquisition, e);
                report.failures.push(InitFailure {
                    acquisition,
                    seed: seed.path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        persister.persist(&schema, &path)?;
        report.artifacts.push(ArtifactSummary {
            acquisition,
            path: path.clone(),
            branches: schema.branches.len(),
            members: schema.member_count(),
            instrument: describe_instrument(&vocabulary, seed),
        });
        written.insert(path);
    }

    let manifest = InitManifest {
        generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        exemplar,
        uniform_sessions: options.uniform_sessions,
        scanner_specific: options.scanner_specific,
        version_specific: options.version_specific,
        allow_additional_fields: options.allow_additional_fields,
        artifacts: written
            .iter()
            .map(|path| path.strip_prefix(&schema_dir).unwrap_or(path).to_path_buf())
            .collect(),
    };
    manifest.write(&locator.manifest_path(layout.root()))?;

    info!(
        "wrote {} schema(s), {} acquisition(s) failed",
        report.artifacts.len(),
        report.failures.len()
    );
    Ok(report)
}

/// `<model> (<serial>)` of the record's instrument
fn describe_instrument(vocabulary: &Vocabulary, record: &Record) -> Option<String> {
    let text = |value: Value| match value {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let model = text(vocabulary.instrument_model().value(record)?);
    Some(match vocabulary.unique_instrument().value(record) {
        Some(serial) => format!("{} ({})", model, text(serial)),
        None => model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Entities;
    use crate::layout::MemoryLayout;
    use serde_json::{json, Value};

    fn entities(subject: &str, datatype: &str, suffix: &str) -> Entities {
        Entities::new()
            .with(Entity::Subject, subject)
            .with(Entity::Datatype, datatype)
            .with(Entity::Suffix, suffix)
            .with(Entity::Extension, ".json")
    }

    #[test]
    fn test_initialize_writes_artifacts_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(entities("01", "anat", "T1w"), json!({"EchoTime": 0.003}))
            .unwrap()
            .with_record(entities("02", "anat", "T1w"), json!({"EchoTime": 0.004}))
            .unwrap()
            .with_record(
                entities("01", "func", "bold").with(Entity::Task, "rest"),
                json!({"RepetitionTime": 2.0}),
            )
            .unwrap();

        let report = initialize(&layout, &ConfigRegistry::new(), &InitOptions::default()).unwrap();
        assert_eq!(report.exemplar, "01");
        assert!(report.is_complete());
        assert_eq!(report.artifacts.len(), 2);

        let t1w = dir.path().join(".acqschema/sub-ref/anat/sub-ref_T1w.json");
        let document: Value = serde_json::from_str(&std::fs::read_to_string(&t1w).unwrap()).unwrap();
        assert_eq!(
            document["anyOf"][0]["properties"]["EchoTime"]["enum"],
            json!([0.003, 0.004])
        );

        let manifest = InitManifest::read(&dir.path().join(".acqschema/manifest.json"))
            .unwrap()
            .unwrap();
        assert_eq!(manifest.exemplar, "01");
        assert!(manifest
            .artifacts
            .contains(&PathBuf::from("sub-ref/anat/sub-ref_T1w.json")));
    }

    #[test]
    fn test_report_names_exemplar_instrument() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(
                entities("01", "anat", "T1w"),
                json!({"ManufacturersModelName": "Prisma", "DeviceSerialNumber": "1234"}),
            )
            .unwrap()
            .with_record(
                entities("01", "dwi", "dwi"),
                json!({"ManufacturersModelName": "Prisma"}),
            )
            .unwrap()
            .with_record(entities("01", "func", "bold").with(Entity::Task, "rest"), json!({}))
            .unwrap();
        let report = initialize(&layout, &ConfigRegistry::new(), &InitOptions::default()).unwrap();
        let mut instruments: Vec<(String, Option<String>)> = report
            .artifacts
            .iter()
            .map(|a| (a.acquisition.clone(), a.instrument.clone()))
            .collect();
        instruments.sort();
        assert_eq!(
            instruments,
            vec![
                ("anat/T1w".to_string(), Some("Prisma (1234)".to_string())),
                ("dwi/dwi".to_string(), Some("Prisma".to_string())),
                ("func/task-rest_bold".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_sessions_share_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(entities("01", "anat", "T1w").with(Entity::Session, "1"), json!({"A": 1}))
            .unwrap()
            .with_record(entities("01", "anat", "T1w").with(Entity::Session, "2"), json!({"A": 1}))
            .unwrap();
        let report = initialize(&layout, &ConfigRegistry::new(), &InitOptions::default()).unwrap();
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].members, 2);

        let options = InitOptions {
            uniform_sessions: false,
            ..InitOptions::default()
        };
        let report = initialize(&layout, &ConfigRegistry::new(), &options).unwrap();
        assert_eq!(report.artifacts.len(), 2);
    }

    #[test]
    fn test_unsupported_datatype_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(entities("01", "pet", "pet"), json!({}))
            .unwrap();
        let err = initialize(&layout, &ConfigRegistry::new(), &InitOptions::default()).unwrap_err();
        assert!(matches!(err, AcqSchemaError::UnsupportedDatatype(_)));
    }

    #[test]
    fn test_unknown_exemplar() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(entities("01", "anat", "T1w"), json!({}))
            .unwrap();
        let options = InitOptions {
            exemplar: Some("99".into()),
            ..InitOptions::default()
        };
        let err = initialize(&layout, &ConfigRegistry::new(), &options).unwrap_err();
        assert!(matches!(err, AcqSchemaError::InvalidInput(_)));

        let empty = MemoryLayout::new(dir.path());
        assert!(initialize(&empty, &ConfigRegistry::new(), &InitOptions::default()).is_err());
    }

    #[test]
    fn test_inference_failure_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(
                entities("01", "anat", "T1w"),
                json!({"Manufacturer": ["Siemens", "GE"]}),
            )
            .unwrap()
            .with_record(entities("01", "dwi", "dwi"), json!({"Manufacturer": "GE"}))
            .unwrap();
        let report = initialize(&layout, &ConfigRegistry::new(), &InitOptions::default()).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].acquisition, "anat/T1w");
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].acquisition, "dwi/dwi");
    }
}
