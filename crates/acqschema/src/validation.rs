//! Conformance validation against persisted artifacts
//!
//! The validator walks the selected subjects and sessions, finds the
//! artifact for every record, selects the branch matching the record's
//! discriminating tag values and reports each violation as a
//! [`ValidationError`]. Errors are produced lazily, one subject/session at a
//! time, through [`ValidationRun`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use jsonschema::error::ValidationErrorKind as SchemaErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TagRef;
use crate::entities::{Entity, Record};
use crate::error::Result;
use crate::layout::{Constraint, DatasetLayout, Query};
use crate::persist::{ArtifactLocator, InitManifest, BRANCH_KEY, DISCRIMINATORS_KEY};
use crate::union::BranchKey;

/// Category of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// A required field is absent
    MissingField,
    /// A field holds a value outside the allowed domain
    DisallowedValue,
    /// A field is not allowed by a closed branch
    UnexpectedField,
    /// No branch matches the record's discriminating tag values
    NoMatchingBranch,
    /// No artifact exists for the record's acquisition
    SchemaNotFound,
    /// The artifact could not be read or compiled
    InvalidArtifact,
}

impl ValidationErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationErrorKind::MissingField => "missing-field",
            ValidationErrorKind::DisallowedValue => "disallowed-value",
            ValidationErrorKind::UnexpectedField => "unexpected-field",
            ValidationErrorKind::NoMatchingBranch => "no-matching-branch",
            ValidationErrorKind::SchemaNotFound => "schema-not-found",
            ValidationErrorKind::InvalidArtifact => "invalid-artifact",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One deviation of a record from its acquisition schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Acquisition label, e.g. `anat/T1w`
    pub acquisition: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Record the error was found in
    pub record: PathBuf,
    /// Field path within the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    /// Observed value, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<Value>,
}

impl ValidationError {
    fn for_record(kind: ValidationErrorKind, record: &Record, message: impl Into<String>) -> Self {
        Self {
            kind,
            acquisition: record.entities.acquisition_label(),
            subject: record.entities.subject().unwrap_or_default().to_string(),
            session: record.entities.session().map(str::to_string),
            record: record.path.clone(),
            field: None,
            message: message.into(),
            instance: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>, instance: Option<Value>) -> Self {
        self.field = Some(field.into());
        self.instance = instance;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] sub-{}", self.kind, self.subject)?;
        if let Some(session) = &self.session {
            write!(f, " ses-{}", session)?;
        }
        write!(f, " {}", self.acquisition)?;
        if let Some(field) = &self.field {
            write!(f, " {}", field)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Subjects to validate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubjectSelection {
    #[default]
    All,
    Only(Vec<String>),
}

/// Sessions to validate within each subject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionSelection {
    /// Every session, and records outside any session
    #[default]
    Any,
    Only(Vec<String>),
}

/// Running counts over a validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ValidationErrorKind, usize>,
}

impl ValidationSummary {
    pub fn record(&mut self, error: &ValidationError) {
        self.total += 1;
        *self.by_kind.entry(error.kind).or_default() += 1;
    }

    pub fn count(&self, kind: ValidationErrorKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.total == 0
    }
}

struct CompiledBranch {
    key: BranchKey,
    schema: jsonschema::Validator,
}

/// Artifact compiled for validation
pub struct Artifact {
    path: PathBuf,
    discriminators: Vec<TagRef>,
    branches: Vec<CompiledBranch>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("path", &self.path)
            .field("discriminators", &self.discriminators)
            .field("branches", &self.branches.len())
            .finish()
    }
}

/// Outcome of loading an artifact
#[derive(Debug)]
pub enum LoadedArtifact {
    Missing,
    Invalid(String),
    Ready(Artifact),
}

impl Artifact {
    /// Read and compile the artifact at `path`
    pub fn load(path: &Path) -> LoadedArtifact {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadedArtifact::Missing,
            Err(e) => return LoadedArtifact::Invalid(format!("cannot read artifact: {}", e)),
        };
        let document: Value = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => return LoadedArtifact::Invalid(format!("malformed artifact: {}", e)),
        };
        match Self::compile(path, &document) {
            Ok(artifact) => LoadedArtifact::Ready(artifact),
            Err(reason) => LoadedArtifact::Invalid(reason),
        }
    }

    /// Compile an artifact document
    pub fn compile(path: &Path, document: &Value) -> std::result::Result<Self, String> {
        let discriminators: Vec<String> = match document.get(DISCRIMINATORS_KEY) {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|name| {
                    name.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("{} must list tag names", DISCRIMINATORS_KEY))
                })
                .collect::<std::result::Result<_, _>>()?,
            Some(_) => return Err(format!("{} must be an array", DISCRIMINATORS_KEY)),
        };

        let entries = document
            .get("anyOf")
            .and_then(Value::as_array)
            .filter(|entries| !entries.is_empty())
            .ok_or_else(|| "artifact has no branches".to_string())?;

        let mut branches = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let key = match entry.get(BRANCH_KEY) {
                Some(Value::Object(values)) => BranchKey::from_json(&discriminators, values),
                None if discriminators.is_empty() => BranchKey::default(),
                _ => return Err(format!("branch {} has no {} object", index, BRANCH_KEY)),
            };
            let schema = jsonschema::validator_for(entry)
                .map_err(|e| format!("branch {} does not compile: {}", index, e))?;
            branches.push(CompiledBranch { key, schema });
        }

        Ok(Self {
            path: path.to_path_buf(),
            discriminators: discriminators.iter().map(|name| TagRef::parse(name)).collect(),
            branches,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every deviation of `record` from its branch
    pub fn check(&self, record: &Record) -> Vec<ValidationError> {
        let key = BranchKey::of(record, &self.discriminators);
        let Some(branch) = self.branches.iter().find(|branch| branch.key == key) else {
            let known: Vec<String> = self.branches.iter().map(|b| format!("{{{}}}", b.key)).collect();
            return vec![ValidationError {
                instance: Some(key.to_json()),
                ..ValidationError::for_record(
                    ValidationErrorKind::NoMatchingBranch,
                    record,
                    format!("no branch for {}; known branches: {}", key, known.join(", ")),
                )
            }];
        };

        let instance = Value::Object(record.fields.clone());
        let mut errors = Vec::new();
        for error in branch.schema.iter_errors(&instance) {
            let pointer = error.instance_path.to_string();
            match &error.kind {
                SchemaErrorKind::Required { property } => {
                    let field = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    errors.push(
                        ValidationError::for_record(
                            ValidationErrorKind::MissingField,
                            record,
                            format!("required field '{}' is missing", field),
                        )
                        .with_field(field, None),
                    );
                }
                SchemaErrorKind::AdditionalProperties { unexpected } => {
                    for field in unexpected {
                        errors.push(
                            ValidationError::for_record(
                                ValidationErrorKind::UnexpectedField,
                                record,
                                format!("field '{}' is not allowed", field),
                            )
                            .with_field(field.clone(), record.fields.get(field.as_str()).cloned()),
                        );
                    }
                }
                _ => {
                    let observed = instance.pointer(&pointer).cloned();
                    errors.push(
                        ValidationError::for_record(
                            ValidationErrorKind::DisallowedValue,
                            record,
                            error.to_string(),
                        )
                        .with_field(field_name(&pointer), observed),
                    );
                }
            }
        }
        errors
    }
}

/// Field path from a JSON pointer, `/a~1b/0` becomes `a/b.0`
fn field_name(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone)]
struct Target {
    subject: String,
    sessions: Vec<Constraint>,
}

/// Applies persisted artifacts to the records of a dataset
pub struct Validator<'a, L: DatasetLayout + ?Sized> {
    layout: &'a L,
    locator: ArtifactLocator,
}

impl<'a, L: DatasetLayout + ?Sized> Validator<'a, L> {
    pub fn new(layout: &'a L, locator: ArtifactLocator) -> Self {
        Self { layout, locator }
    }

    /// Validator using the path convention recorded by `init`
    ///
    /// Falls back to uniform sessions when the schema folder has no manifest.
    pub fn from_manifest(layout: &'a L, schema_folder: impl Into<PathBuf>) -> Result<Self> {
        let schema_folder = schema_folder.into();
        let default_locator = ArtifactLocator::new(&schema_folder, true);
        let manifest_path = default_locator.manifest_path(layout.root());
        let uniform_sessions = match InitManifest::read(&manifest_path)? {
            Some(manifest) => {
                debug!(
                    "manifest {}: exemplar sub-{}, uniform sessions {}",
                    manifest_path.display(),
                    manifest.exemplar,
                    manifest.uniform_sessions
                );
                manifest.uniform_sessions
            }
            None => {
                warn!(
                    "no manifest at {}; assuming uniform sessions",
                    manifest_path.display()
                );
                true
            }
        };
        Ok(Self::new(layout, ArtifactLocator::new(schema_folder, uniform_sessions)))
    }

    pub fn locator(&self) -> &ArtifactLocator {
        &self.locator
    }

    /// Lazily validate the selected subjects and sessions
    pub fn validate(
        &self,
        subjects: SubjectSelection,
        sessions: SessionSelection,
    ) -> ValidationRun<'_, 'a, L> {
        ValidationRun {
            validator: self,
            subjects,
            sessions,
            targets: None,
            pending: VecDeque::new(),
            artifacts: HashMap::new(),
            failed: false,
        }
    }

    /// Validate everything and collect the results
    pub fn validate_all(&self) -> Result<Vec<ValidationError>> {
        self.validate(SubjectSelection::All, SessionSelection::Any)
            .collect()
    }
}

/// Lazy sequence of validation errors
///
/// Yields `Ok` for each deviation found. A fatal error (unreadable dataset)
/// is yielded once as `Err` and ends the sequence.
pub struct ValidationRun<'v, 'a, L: DatasetLayout + ?Sized> {
    validator: &'v Validator<'a, L>,
    subjects: SubjectSelection,
    sessions: SessionSelection,
    targets: Option<VecDeque<Target>>,
    pending: VecDeque<ValidationError>,
    artifacts: HashMap<PathBuf, LoadedArtifact>,
    failed: bool,
}

impl<'v, 'a, L: DatasetLayout + ?Sized> ValidationRun<'v, 'a, L> {
    fn plan(&self) -> Result<VecDeque<Target>> {
        let available = self.validator.layout.subjects()?;
        let subjects: Vec<String> = match &self.subjects {
            SubjectSelection::All => available,
            SubjectSelection::Only(labels) => labels
                .iter()
                .filter(|label| {
                    let known = available.contains(*label);
                    if !known {
                        warn!("subject '{}' not found in dataset", label);
                    }
                    known
                })
                .cloned()
                .collect(),
        };

        let sessions: Vec<Constraint> = match &self.sessions {
            SessionSelection::Any => vec![Constraint::Any],
            SessionSelection::Only(labels) => labels
                .iter()
                .map(|label| Constraint::Exact(label.clone()))
                .collect(),
        };

        // one target per subject so sessions sharing an artifact form one group
        let targets: VecDeque<Target> = subjects
            .into_iter()
            .map(|subject| Target {
                subject,
                sessions: sessions.clone(),
            })
            .collect();
        info!(
            "validating {} subject(s) across {} session selector(s)",
            targets.len(),
            sessions.len()
        );
        Ok(targets)
    }

    fn check_target(&mut self, target: &Target) -> Result<()> {
        let validator = self.validator;
        let mut records = Vec::new();
        for session in &target.sessions {
            let query = Query::new()
                .with_exact(Entity::Subject, target.subject.as_str())
                .with(Entity::Session, session.clone())
                .with_exact(Entity::Extension, ".json");
            records.extend(validator.layout.query(&query)?);
        }

        let mut groups: BTreeMap<PathBuf, Vec<Record>> = BTreeMap::new();
        for record in records.into_iter().filter(|record| !record.is_non_data()) {
            let path = validator
                .locator
                .artifact_path(validator.layout, &record.entities)?;
            groups.entry(path).or_default().push(record);
        }
        debug!(
            "sub-{}: {} acquisition group(s)",
            target.subject,
            groups.len()
        );

        for (path, records) in groups {
            let artifact = self
                .artifacts
                .entry(path.clone())
                .or_insert_with(|| Artifact::load(&path));
            match artifact {
                LoadedArtifact::Missing => {
                    let first = &records[0];
                    let session = first.entities.session();
                    let shared_session = records
                        .iter()
                        .all(|record| record.entities.session() == session);
                    let mut error = ValidationError::for_record(
                        ValidationErrorKind::SchemaNotFound,
                        first,
                        format!(
                            "no schema at {} for {} record(s)",
                            path.display(),
                            records.len()
                        ),
                    );
                    if !shared_session {
                        error.session = None;
                    }
                    self.pending.push_back(error);
                }
                LoadedArtifact::Invalid(reason) => {
                    self.pending.push_back(ValidationError::for_record(
                        ValidationErrorKind::InvalidArtifact,
                        &records[0],
                        format!("{}: {}", path.display(), reason),
                    ));
                }
                LoadedArtifact::Ready(artifact) => {
                    for record in &records {
                        self.pending.extend(artifact.check(record));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'v, 'a, L: DatasetLayout + ?Sized> Iterator for ValidationRun<'v, 'a, L> {
    type Item = Result<ValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(error) = self.pending.pop_front() {
                return Some(Ok(error));
            }
            if self.failed {
                return None;
            }
            if self.targets.is_none() {
                match self.plan() {
                    Ok(targets) => self.targets = Some(targets),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            let target = self.targets.as_mut()?.pop_front()?;
            if let Err(e) = self.check_target(&target) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Entities;
    use crate::layout::MemoryLayout;
    use serde_json::{json, Map};

    fn t1w(subject: &str) -> Entities {
        Entities::new()
            .with(Entity::Subject, subject)
            .with(Entity::Datatype, "anat")
            .with(Entity::Suffix, "T1w")
            .with(Entity::Extension, ".json")
    }

    fn record(subject: &str, fields: Value) -> Record {
        let fields: Map<String, Value> = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Record::new(format!("sub-{0}/anat/sub-{0}_T1w.json", subject), t1w(subject), fields)
    }

    fn artifact(document: Value) -> Artifact {
        Artifact::compile(Path::new("artifact.json"), &document).unwrap()
    }

    fn two_branch_artifact() -> Artifact {
        artifact(json!({
            "type": "object",
            "x-discriminators": ["Manufacturer"],
            "anyOf": [
                {
                    "x-branch": {"Manufacturer": "Siemens"},
                    "type": "object",
                    "properties": {
                        "Manufacturer": {"enum": ["Siemens"]},
                        "EchoTime": {"enum": [0.003]},
                        "SiemensOnly": {}
                    },
                    "required": ["Manufacturer", "EchoTime", "SiemensOnly"],
                    "additionalProperties": true
                },
                {
                    "x-branch": {"Manufacturer": "GE"},
                    "type": "object",
                    "properties": {
                        "Manufacturer": {"enum": ["GE"]},
                        "EchoTime": {"enum": [0.002]}
                    },
                    "required": ["Manufacturer", "EchoTime"],
                    "additionalProperties": false
                }
            ]
        }))
    }

    #[test]
    fn test_conforming_record_has_no_errors() {
        let artifact = two_branch_artifact();
        let ge = record("01", json!({"Manufacturer": "GE", "EchoTime": 0.002}));
        assert!(artifact.check(&ge).is_empty());
    }

    #[test]
    fn test_branch_selection_scopes_required_fields() {
        let artifact = two_branch_artifact();
        let siemens = record("01", json!({"Manufacturer": "Siemens", "EchoTime": 0.003}));
        let errors = artifact.check(&siemens);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::MissingField);
        assert_eq!(errors[0].field.as_deref(), Some("SiemensOnly"));
        assert_eq!(errors[0].subject, "01");
        assert_eq!(errors[0].acquisition, "anat/T1w");
    }

    #[test]
    fn test_disallowed_value_reports_instance() {
        let artifact = two_branch_artifact();
        let ge = record("02", json!({"Manufacturer": "GE", "EchoTime": 0.009}));
        let errors = artifact.check(&ge);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::DisallowedValue);
        assert_eq!(errors[0].field.as_deref(), Some("EchoTime"));
        assert_eq!(errors[0].instance, Some(json!(0.009)));
    }

    #[test]
    fn test_each_unexpected_field_is_reported() {
        let artifact = two_branch_artifact();
        let ge = record(
            "03",
            json!({"Manufacturer": "GE", "EchoTime": 0.002, "A": 1, "B": 2}),
        );
        let mut fields: Vec<String> = artifact
            .check(&ge)
            .into_iter()
            .inspect(|e| assert_eq!(e.kind, ValidationErrorKind::UnexpectedField))
            .filter_map(|e| e.field)
            .collect();
        fields.sort();
        assert_eq!(fields, vec!["A", "B"]);
    }

    #[test]
    fn test_unseen_discriminator_value() {
        let artifact = two_branch_artifact();
        let philips = record("04", json!({"Manufacturer": "Philips", "EchoTime": 0.002}));
        let errors = artifact.check(&philips);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::NoMatchingBranch);
        assert_eq!(errors[0].instance, Some(json!({"Manufacturer": "Philips"})));
        assert!(errors[0].message.contains("Philips"));
    }

    #[test]
    fn test_integral_float_selects_integer_branch() {
        let artifact = artifact(json!({
            "x-discriminators": ["ReceiveCoilChannels"],
            "anyOf": [{
                "x-branch": {"ReceiveCoilChannels": 8},
                "type": "object",
                "properties": {"ReceiveCoilChannels": {"enum": [8]}},
                "required": ["ReceiveCoilChannels"],
                "additionalProperties": true
            }]
        }));
        let observed = record("06", json!({"ReceiveCoilChannels": 8.0}));
        assert!(artifact.check(&observed).is_empty());

        let other = record("07", json!({"ReceiveCoilChannels": 8.5}));
        let errors = artifact.check(&other);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::NoMatchingBranch);
    }

    #[test]
    fn test_compile_rejects_malformed_artifacts() {
        let path = Path::new("artifact.json");
        assert!(Artifact::compile(path, &json!({"anyOf": []})).is_err());
        assert!(Artifact::compile(path, &json!({"x-discriminators": "Manufacturer"})).is_err());
        assert!(Artifact::compile(
            path,
            &json!({"x-discriminators": ["Manufacturer"], "anyOf": [{"type": "object"}]})
        )
        .is_err());
        assert!(Artifact::compile(path, &json!({"anyOf": [{"type": 5}]})).is_err());
    }

    #[test]
    fn test_field_name_from_pointer() {
        assert_eq!(field_name("/EchoTime"), "EchoTime");
        assert_eq!(field_name("/ImageType/0"), "ImageType.0");
        assert_eq!(field_name("/a~1b"), "a/b");
    }

    #[test]
    fn test_missing_artifact_reported_once_per_group() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(t1w("01").with(Entity::Session, "1"), json!({"A": 1}))
            .unwrap()
            .with_record(t1w("01").with(Entity::Session, "2"), json!({"A": 1}))
            .unwrap();
        let validator = Validator::new(&layout, ArtifactLocator::default());
        let errors = validator.validate_all().unwrap();
        // both sessions share one artifact under uniform sessions
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::SchemaNotFound);
        assert_eq!(errors[0].session, None);
    }

    #[test]
    fn test_missing_artifact_reported_once_across_selected_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(t1w("01").with(Entity::Session, "1"), json!({"A": 1}))
            .unwrap()
            .with_record(t1w("01").with(Entity::Session, "2"), json!({"A": 1}))
            .unwrap();
        let validator = Validator::new(&layout, ArtifactLocator::default());
        let errors: Vec<ValidationError> = validator
            .validate(
                SubjectSelection::All,
                SessionSelection::Only(vec!["1".into(), "2".into()]),
            )
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(errors[0].kind, ValidationErrorKind::SchemaNotFound);
        assert_eq!(errors[0].session, None);

        // per-session artifacts are distinct, so each session is reported
        let validator = Validator::new(&layout, ArtifactLocator::new(".acqschema", false));
        let mut sessions: Vec<Option<String>> = validator
            .validate(
                SubjectSelection::All,
                SessionSelection::Only(vec!["1".into(), "2".into()]),
            )
            .map(|e| e.unwrap().session)
            .collect();
        sessions.sort();
        assert_eq!(sessions, vec![Some("1".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn test_invalid_artifact_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(t1w("01"), json!({"A": 1}))
            .unwrap();
        let locator = ArtifactLocator::default();
        let path = locator.artifact_path(&layout, &t1w("01")).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{broken").unwrap();

        let errors = Validator::new(&layout, locator).validate_all().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidArtifact);
    }

    #[test]
    fn test_subject_and_session_selection() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MemoryLayout::new(dir.path())
            .with_record(t1w("01").with(Entity::Session, "1"), json!({}))
            .unwrap()
            .with_record(t1w("01").with(Entity::Session, "2"), json!({}))
            .unwrap()
            .with_record(t1w("02").with(Entity::Session, "1"), json!({}))
            .unwrap();
        let validator = Validator::new(&layout, ArtifactLocator::new(".acqschema", false));

        let errors: Vec<ValidationError> = validator
            .validate(
                SubjectSelection::Only(vec!["01".into(), "missing".into()]),
                SessionSelection::Only(vec!["2".into()]),
            )
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].subject, "01");
        assert_eq!(errors[0].session.as_deref(), Some("2"));
    }

    #[test]
    fn test_summary_counts() {
        let artifact = two_branch_artifact();
        let mut summary = ValidationSummary::default();
        assert!(summary.is_success());
        for error in artifact.check(&record("05", json!({"Manufacturer": "GE"}))) {
            summary.record(&error);
        }
        assert_eq!(summary.total, 1);
        assert_eq!(summary.count(ValidationErrorKind::MissingField), 1);
        assert!(!summary.is_success());
    }
}
