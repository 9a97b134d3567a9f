//! Schema artifacts on disk
//!
//! Union schemas are rendered to JSON Schema documents by a [`SchemaWriter`]
//! and stored under the dataset's schema folder at the path the dataset
//! layout gives for a placeholder subject. The folder also holds an
//! [`InitManifest`] recording the options the artifacts were written with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::entities::{Entities, Entity, SUBJECT_PLACEHOLDER};
use crate::error::{AcqSchemaError, Result};
use crate::layout::DatasetLayout;
use crate::union::{SchemaBranch, UnionSchema, ValueDomain};

/// Default schema folder, relative to the dataset root
pub const DEFAULT_SCHEMA_FOLDER: &str = ".acqschema";

/// File name of the init manifest inside the schema folder
pub const MANIFEST_FILE: &str = "manifest.json";

/// Dialect declared by rendered artifacts
pub const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Key holding the discriminating tag names of an artifact
pub const DISCRIMINATORS_KEY: &str = "x-discriminators";

/// Key holding the tag values that select a branch
pub const BRANCH_KEY: &str = "x-branch";

/// Renders a union schema to a serializable document
pub trait SchemaWriter: Send + Sync {
    fn render(&self, schema: &UnionSchema) -> Value;
}

/// Writes draft 2020-12 JSON Schema with one `anyOf` entry per branch
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaWriter;

impl JsonSchemaWriter {
    fn render_branch(&self, branch: &SchemaBranch, allow_additional_fields: bool) -> Value {
        let mut properties = Map::new();
        for (name, constraint) in &branch.fields {
            let mut property = Map::new();
            if let ValueDomain::Enumerated(values) = &constraint.domain {
                property.insert("enum".to_string(), Value::Array(values.clone()));
            }
            property.insert(
                "x-types".to_string(),
                constraint
                    .types
                    .iter()
                    .map(|t| Value::String(t.name().to_string()))
                    .collect(),
            );
            properties.insert(name.clone(), Value::Object(property));
        }

        json!({
            BRANCH_KEY: branch.key.to_json(),
            "x-members": branch.members,
            "type": "object",
            "properties": properties,
            "required": branch.required_fields().collect::<Vec<_>>(),
            "additionalProperties": allow_additional_fields,
        })
    }
}

impl SchemaWriter for JsonSchemaWriter {
    fn render(&self, schema: &UnionSchema) -> Value {
        let branches: Vec<Value> = schema
            .branches
            .iter()
            .map(|branch| self.render_branch(branch, schema.allow_additional_fields))
            .collect();

        json!({
            "$schema": JSON_SCHEMA_DIALECT,
            "title": schema.title,
            "type": "object",
            "additionalProperties": true,
            DISCRIMINATORS_KEY: schema.discriminators,
            "anyOf": branches,
        })
    }
}

/// Writes rendered schemas to disk
pub struct SchemaPersister {
    writer: Box<dyn SchemaWriter>,
}

impl Default for SchemaPersister {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaPersister").finish_non_exhaustive()
    }
}

impl SchemaPersister {
    pub fn new() -> Self {
        Self::with_writer(JsonSchemaWriter)
    }

    pub fn with_writer(writer: impl SchemaWriter + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    /// Write `schema` to `path`, creating parent directories and replacing
    /// any previous artifact
    pub fn persist(&self, schema: &UnionSchema, path: &Path) -> Result<()> {
        let document = self.writer.render(schema);
        write_json(path, &document)?;
        info!(
            "wrote {} ({} branch(es)) to {}",
            schema.title,
            schema.branches.len(),
            path.display()
        );
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AcqSchemaError::io(parent, e))?;
    }
    let content = serde_json::to_string_pretty(value).map_err(|e| AcqSchemaError::json(path, e))?;
    std::fs::write(path, content).map_err(|e| AcqSchemaError::io(path, e))
}

/// Maps record entities to artifact locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    schema_folder: PathBuf,
    uniform_sessions: bool,
}

impl Default for ArtifactLocator {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_FOLDER, true)
    }
}

impl ArtifactLocator {
    pub fn new(schema_folder: impl Into<PathBuf>, uniform_sessions: bool) -> Self {
        Self {
            schema_folder: schema_folder.into(),
            uniform_sessions,
        }
    }

    pub fn uniform_sessions(&self) -> bool {
        self.uniform_sessions
    }

    /// Schema folder of a dataset
    pub fn schema_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.schema_folder)
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        self.schema_dir(root).join(MANIFEST_FILE)
    }

    /// Entities naming the artifact shared by every subject
    ///
    /// Subject becomes the placeholder; session is dropped when sessions
    /// are uniform.
    pub fn artifact_entities(&self, entities: &Entities) -> Entities {
        let mut entities = entities.clone().with(Entity::Subject, SUBJECT_PLACEHOLDER);
        if self.uniform_sessions {
            entities.remove(Entity::Session);
        }
        entities
    }

    /// Absolute path of the artifact for a record's entities
    pub fn artifact_path<L>(&self, layout: &L, entities: &Entities) -> Result<PathBuf>
    where
        L: DatasetLayout + ?Sized,
    {
        let relative = layout.build_path(&self.artifact_entities(entities))?;
        Ok(self.schema_dir(layout.root()).join(relative))
    }
}

/// Options an `init` run used, stored next to its artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitManifest {
    pub generator: String,
    pub exemplar: String,
    pub uniform_sessions: bool,
    pub scanner_specific: bool,
    pub version_specific: bool,
    pub allow_additional_fields: bool,
    /// Artifact paths relative to the schema folder
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

impl InitManifest {
    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Read a manifest; `Ok(None)` when the file does not exist
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AcqSchemaError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| AcqSchemaError::json(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagRef;
    use crate::entities::Record;
    use crate::factoring::FactoringPolicy;
    use crate::layout::MemoryLayout;
    use crate::union::UnionSchemaBuilder;
    use std::collections::BTreeSet;

    fn bold_entities(subject: &str, session: &str) -> Entities {
        Entities::new()
            .with(Entity::Subject, subject)
            .with(Entity::Session, session)
            .with(Entity::Task, "rest")
            .with(Entity::Datatype, "func")
            .with(Entity::Suffix, "bold")
            .with(Entity::Extension, ".json")
    }

    fn sample_schema() -> UnionSchema {
        let mut fields = Map::new();
        fields.insert("Manufacturer".into(), json!("Siemens"));
        fields.insert("RepetitionTime".into(), json!(2.0));
        fields.insert("Notes".into(), json!("none"));
        let seed = Record::new("x.json", bold_entities("01", "1"), fields);
        let vocabulary: BTreeSet<String> = ["Manufacturer", "RepetitionTime"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        UnionSchemaBuilder::new()
            .build(
                &seed,
                std::slice::from_ref(&seed),
                &[TagRef::parse("Manufacturer")],
                &vocabulary,
                &FactoringPolicy::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_json_schema_writer_layout() {
        let document = JsonSchemaWriter.render(&sample_schema());

        assert_eq!(document["$schema"], JSON_SCHEMA_DIALECT);
        assert_eq!(document["title"], "func/ses-1_task-rest_bold");
        assert_eq!(document["additionalProperties"], true);
        assert_eq!(document[DISCRIMINATORS_KEY], json!(["Manufacturer"]));

        let branch = &document["anyOf"][0];
        assert_eq!(branch[BRANCH_KEY], json!({"Manufacturer": "Siemens"}));
        assert_eq!(branch["properties"]["RepetitionTime"]["enum"], json!([2.0]));
        assert!(branch["properties"]["Notes"].get("enum").is_none());
        assert_eq!(branch["properties"]["Notes"]["x-types"], json!(["string"]));
        assert_eq!(
            branch["required"],
            json!(["Manufacturer", "Notes", "RepetitionTime"])
        );
    }

    #[test]
    fn test_persist_creates_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep/nested/schema.json");
        let persister = SchemaPersister::new();

        persister.persist(&sample_schema(), &path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.contains("\n  \"$schema\""));

        let mut changed = sample_schema();
        changed.title = "func/changed".to_string();
        persister.persist(&changed, &path).unwrap();
        let second: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(second["title"], "func/changed");
    }

    #[test]
    fn test_persist_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = SchemaPersister::new()
            .persist(&sample_schema(), &blocker.join("schema.json"))
            .unwrap_err();
        assert!(matches!(err, AcqSchemaError::Io { .. }));
    }

    #[test]
    fn test_artifact_path_uniform_sessions() {
        let layout = MemoryLayout::new("/data/ds");
        let locator = ArtifactLocator::default();
        assert_eq!(
            locator
                .artifact_path(&layout, &bold_entities("07", "2"))
                .unwrap(),
            PathBuf::from("/data/ds/.acqschema/sub-ref/func/sub-ref_task-rest_bold.json")
        );
    }

    #[test]
    fn test_artifact_path_varying_sessions() {
        let layout = MemoryLayout::new("/data/ds");
        let locator = ArtifactLocator::new("schemas", false);
        assert_eq!(
            locator
                .artifact_path(&layout, &bold_entities("07", "2"))
                .unwrap(),
            PathBuf::from("/data/ds/schemas/sub-ref/ses-2/func/sub-ref_ses-2_task-rest_bold.json")
        );
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        assert_eq!(InitManifest::read(&path).unwrap(), None);

        let manifest = InitManifest {
            generator: "acqschema 0.1.0".into(),
            exemplar: "01".into(),
            uniform_sessions: false,
            scanner_specific: true,
            version_specific: false,
            allow_additional_fields: true,
            artifacts: vec![PathBuf::from("sub-ref/anat/sub-ref_T1w.json")],
        };
        manifest.write(&path).unwrap();
        assert_eq!(InitManifest::read(&path).unwrap(), Some(manifest));
    }
}
