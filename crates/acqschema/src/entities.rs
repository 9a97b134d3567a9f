//! Identifying attributes and sidecar records
//!
//! Entities are the closed set of attributes used to locate and group
//! records (subject, session, run, ...). They are distinct from the sidecar
//! fields whose content is inferred and validated.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AcqSchemaError, Result};

/// Subject label that replaces the real subject in artifact paths
pub const SUBJECT_PLACEHOLDER: &str = "ref";

/// Suffixes of dataset bookkeeping sidecars that never describe an acquisition
pub const NON_DATA_SUFFIXES: &[&str] = &["scans", "sessions", "participants"];

/// Identifying attribute of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Subject,
    Session,
    Task,
    Acquisition,
    Ceagent,
    Reconstruction,
    Direction,
    Run,
    Modality,
    Echo,
    Flip,
    Inversion,
    Mtransfer,
    Part,
    Recording,
    Chunk,
    Datatype,
    Suffix,
    Extension,
}

impl Entity {
    /// Entities that appear as `key-value` pairs in filenames, in filename order
    pub const KEY_VALUE: [Entity; 16] = [
        Entity::Subject,
        Entity::Session,
        Entity::Task,
        Entity::Acquisition,
        Entity::Ceagent,
        Entity::Reconstruction,
        Entity::Direction,
        Entity::Run,
        Entity::Modality,
        Entity::Echo,
        Entity::Flip,
        Entity::Inversion,
        Entity::Mtransfer,
        Entity::Part,
        Entity::Recording,
        Entity::Chunk,
    ];

    /// Long name used in vocabularies and queries
    pub fn name(&self) -> &'static str {
        match self {
            Entity::Subject => "subject",
            Entity::Session => "session",
            Entity::Task => "task",
            Entity::Acquisition => "acquisition",
            Entity::Ceagent => "ceagent",
            Entity::Reconstruction => "reconstruction",
            Entity::Direction => "direction",
            Entity::Run => "run",
            Entity::Modality => "modality",
            Entity::Echo => "echo",
            Entity::Flip => "flip",
            Entity::Inversion => "inversion",
            Entity::Mtransfer => "mtransfer",
            Entity::Part => "part",
            Entity::Recording => "recording",
            Entity::Chunk => "chunk",
            Entity::Datatype => "datatype",
            Entity::Suffix => "suffix",
            Entity::Extension => "extension",
        }
    }

    /// Short key used in filenames, `None` for structural entities
    pub fn key(&self) -> Option<&'static str> {
        let key = match self {
            Entity::Subject => "sub",
            Entity::Session => "ses",
            Entity::Task => "task",
            Entity::Acquisition => "acq",
            Entity::Ceagent => "ce",
            Entity::Reconstruction => "rec",
            Entity::Direction => "dir",
            Entity::Run => "run",
            Entity::Modality => "mod",
            Entity::Echo => "echo",
            Entity::Flip => "flip",
            Entity::Inversion => "inv",
            Entity::Mtransfer => "mt",
            Entity::Part => "part",
            Entity::Recording => "recording",
            Entity::Chunk => "chunk",
            Entity::Datatype | Entity::Suffix | Entity::Extension => return None,
        };
        Some(key)
    }

    /// Look up an entity by its filename key
    pub fn from_key(key: &str) -> Option<Entity> {
        Entity::KEY_VALUE
            .iter()
            .copied()
            .find(|entity| entity.key() == Some(key))
    }

    /// Whether this entity identifies an acquisition instance rather than its kind
    pub fn is_identifying(&self) -> bool {
        !matches!(self, Entity::Datatype | Entity::Suffix | Entity::Extension)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Entity {
    type Err = AcqSchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Entity::KEY_VALUE
            .iter()
            .chain([Entity::Datatype, Entity::Suffix, Entity::Extension].iter())
            .copied()
            .find(|entity| entity.name() == s)
            .ok_or_else(|| AcqSchemaError::invalid_input(format!("unknown entity '{}'", s)))
    }
}

/// Identifying attributes of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities(BTreeMap<Entity, String>);

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, entity: Entity, value: impl Into<String>) -> Self {
        self.insert(entity, value);
        self
    }

    pub fn insert(&mut self, entity: Entity, value: impl Into<String>) {
        self.0.insert(entity, value.into());
    }

    pub fn remove(&mut self, entity: Entity) -> Option<String> {
        self.0.remove(&entity)
    }

    pub fn get(&self, entity: Entity) -> Option<&str> {
        self.0.get(&entity).map(String::as_str)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.0.contains_key(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &str)> {
        self.0.iter().map(|(entity, value)| (*entity, value.as_str()))
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(Entity::Subject)
    }

    pub fn session(&self) -> Option<&str> {
        self.get(Entity::Session)
    }

    /// Human-readable acquisition label, e.g. `anat/acq-mprage_T1w`
    ///
    /// Subject and extension are left out; everything else that shapes the
    /// artifact path is kept.
    pub fn acquisition_label(&self) -> String {
        let mut parts: Vec<String> = Entity::KEY_VALUE
            .iter()
            .filter(|entity| **entity != Entity::Subject)
            .filter_map(|entity| {
                let value = self.get(*entity)?;
                Some(format!("{}-{}", entity.key()?, value))
            })
            .collect();
        if let Some(suffix) = self.get(Entity::Suffix) {
            parts.push(suffix.to_string());
        }
        let stem = parts.join("_");
        match self.get(Entity::Datatype) {
            Some(datatype) => format!("{}/{}", datatype, stem),
            None => stem,
        }
    }
}

/// A sidecar record: flat metadata plus the attributes that locate it
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub path: PathBuf,
    pub entities: Entities,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(path: impl Into<PathBuf>, entities: Entities, fields: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            entities,
            fields,
        }
    }

    /// Bookkeeping sidecars and files outside a datatype folder carry no acquisition metadata
    pub fn is_non_data(&self) -> bool {
        let suffix = self.entities.get(Entity::Suffix).unwrap_or_default();
        NON_DATA_SUFFIXES.contains(&suffix) || !self.entities.contains(Entity::Datatype)
    }

    /// Field value, treating explicit `null` as absent
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }
}

fn key_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-z]+)-([a-zA-Z0-9]+)$").expect("static entity pattern is valid")
    })
}

/// Parse a sidecar filename such as `sub-01_ses-1_run-2_bold.json`
///
/// The datatype is not part of the filename and must be supplied by the
/// caller from the enclosing folder.
pub fn parse_filename(file_name: &str) -> Result<Entities> {
    let (stem, extension) = match file_name.find('.') {
        Some(index) => file_name.split_at(index),
        None => {
            return Err(AcqSchemaError::invalid_input(format!(
                "'{}' has no extension",
                file_name
            )))
        }
    };

    let mut parts: Vec<&str> = stem.split('_').collect();
    let suffix = parts
        .pop()
        .filter(|suffix| !suffix.is_empty() && !suffix.contains('-'))
        .ok_or_else(|| {
            AcqSchemaError::invalid_input(format!("'{}' has no suffix", file_name))
        })?;

    let mut entities = Entities::new()
        .with(Entity::Suffix, suffix)
        .with(Entity::Extension, extension);

    for part in parts {
        let captures = key_value_pattern().captures(part).ok_or_else(|| {
            AcqSchemaError::invalid_input(format!(
                "'{}' in '{}' is not a key-value pair",
                part, file_name
            ))
        })?;
        let entity = Entity::from_key(&captures[1]).ok_or_else(|| {
            AcqSchemaError::invalid_input(format!(
                "unknown entity key '{}' in '{}'",
                &captures[1], file_name
            ))
        })?;
        if entities.contains(entity) {
            return Err(AcqSchemaError::invalid_input(format!(
                "entity '{}' repeated in '{}'",
                entity, file_name
            )));
        }
        entities.insert(entity, &captures[2]);
    }

    if !entities.contains(Entity::Subject) {
        return Err(AcqSchemaError::invalid_input(format!(
            "'{}' has no subject",
            file_name
        )));
    }
    Ok(entities)
}

/// Build the dataset-relative path for a set of entities
///
/// `sub-<s>/[ses-<x>/]<datatype>/sub-<s>[_ses-<x>]..._<suffix><extension>`
pub fn build_path(entities: &Entities) -> Result<PathBuf> {
    let subject = entities
        .subject()
        .ok_or_else(|| AcqSchemaError::invalid_input("cannot build a path without a subject"))?;
    let suffix = entities
        .get(Entity::Suffix)
        .ok_or_else(|| AcqSchemaError::invalid_input("cannot build a path without a suffix"))?;

    let mut path = PathBuf::from(format!("sub-{}", subject));
    if let Some(session) = entities.session() {
        path.push(format!("ses-{}", session));
    }
    if let Some(datatype) = entities.get(Entity::Datatype) {
        path.push(datatype);
    }

    let mut name: Vec<String> = Entity::KEY_VALUE
        .iter()
        .filter_map(|entity| {
            let value = entities.get(*entity)?;
            Some(format!("{}-{}", entity.key()?, value))
        })
        .collect();
    name.push(suffix.to_string());
    let extension = entities.get(Entity::Extension).unwrap_or_default();
    path.push(format!("{}{}", name.join("_"), extension));
    Ok(path)
}

/// Read a sidecar file into a record
pub fn read_record(path: &Path, entities: Entities) -> Result<Record> {
    let content = std::fs::read_to_string(path).map_err(|e| AcqSchemaError::io(path, e))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| AcqSchemaError::json(path, e))?;
    match value {
        Value::Object(fields) => Ok(Record::new(path, entities, fields)),
        other => Err(AcqSchemaError::invalid_input(format!(
            "sidecar '{}' is a JSON {} instead of an object",
            path.display(),
            json_type_name(&other)
        ))),
    }
}

/// JSON type name as used by JSON Schema
pub fn json_type_name(value: &Value) -> &'static str {
    crate::union::JsonType::of(value).name()
}
