//! Per-modality tag vocabularies
//!
//! A vocabulary tells the inference engine which sidecar fields identify an
//! instrument, which ones split a schema into device-specific branches, and
//! which ones have their values pinned. Vocabularies are bundled with the
//! crate and can be overridden from a directory of `<modality>_tags.json`
//! files.
//!
//! # Example
//!
//! ```rust
//! use acqschema::config::{ConfigRegistry, Discrimination};
//!
//! let registry = ConfigRegistry::new();
//! let vocabulary = registry.get_config("anat").unwrap();
//! let tags = vocabulary.discriminating_tags(Discrimination::default());
//! assert!(tags.iter().any(|tag| tag.name() == "Manufacturer"));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::entities::{Entity, Record};
use crate::error::{AcqSchemaError, Result};

const MRI_TAGS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/mri_tags.json"));
const MEEG_TAGS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/meeg_tags.json"));

/// Group of datatypes sharing one vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modality {
    /// Magnetic resonance acquisitions
    Mri,
    /// Electro- and magneto-encephalography
    Meeg,
}

impl Modality {
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Mri => "mri",
            Modality::Meeg => "meeg",
        }
    }

    /// File name of the vocabulary for this modality
    pub fn file_name(&self) -> String {
        format!("{}_tags.json", self.name())
    }

    fn bundled(&self) -> &'static str {
        match self {
            Modality::Mri => MRI_TAGS,
            Modality::Meeg => MEEG_TAGS,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Datatype folders with a known modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    Anat,
    Func,
    Dwi,
    Swi,
    Fmap,
    Eeg,
    Meg,
}

impl Datatype {
    pub fn modality(&self) -> Modality {
        match self {
            Datatype::Anat | Datatype::Func | Datatype::Dwi | Datatype::Swi | Datatype::Fmap => {
                Modality::Mri
            }
            Datatype::Eeg | Datatype::Meg => Modality::Meeg,
        }
    }
}

impl FromStr for Datatype {
    type Err = AcqSchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "anat" => Ok(Datatype::Anat),
            "func" => Ok(Datatype::Func),
            "dwi" => Ok(Datatype::Dwi),
            "swi" => Ok(Datatype::Swi),
            "fmap" => Ok(Datatype::Fmap),
            "eeg" => Ok(Datatype::Eeg),
            "meg" => Ok(Datatype::Meg),
            other => Err(AcqSchemaError::UnsupportedDatatype(other.to_string())),
        }
    }
}

/// Accessor for a tag named in a vocabulary
///
/// A tag is either an identifying entity of the record or a sidecar field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagRef {
    Entity(Entity),
    Field(String),
}

impl TagRef {
    /// Resolve a tag name without checking it against a vocabulary
    pub fn parse(name: &str) -> TagRef {
        match name.parse::<Entity>() {
            Ok(entity) => TagRef::Entity(entity),
            Err(_) => TagRef::Field(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TagRef::Entity(entity) => entity.name(),
            TagRef::Field(name) => name,
        }
    }

    /// Value of this tag on a record; absent and `null` are both `None`
    pub fn value(&self, record: &Record) -> Option<Value> {
        match self {
            TagRef::Entity(entity) => record
                .entities
                .get(*entity)
                .map(|value| Value::String(value.to_string())),
            TagRef::Field(name) => record.field(name).cloned(),
        }
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How finely instruments are told apart during inference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discrimination {
    /// One branch per physical instrument instead of per model
    pub scanner_specific: bool,
    /// One branch per instrument software version
    pub version_specific: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VocabularyFile {
    instrument: InstrumentFile,
    instrument_tags: Vec<String>,
    properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstrumentFile {
    uid_tags: Vec<String>,
    grouping_tags: Vec<String>,
    #[serde(default)]
    version_tags: Vec<String>,
}

/// Tag vocabulary of one modality
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub modality: Modality,
    /// Tags naming a physical instrument
    pub uid_tags: Vec<TagRef>,
    /// Tags naming an instrument model
    pub grouping_tags: Vec<TagRef>,
    /// Tags naming instrument software versions
    pub version_tags: Vec<TagRef>,
    /// Tags that always split the schema into branches
    pub instrument_tags: Vec<TagRef>,
    /// Fields whose observed values become the allowed domain
    pub properties: BTreeSet<String>,
}

impl Vocabulary {
    /// Parse and check a vocabulary document
    ///
    /// `origin` names the source in error messages.
    pub fn from_json(modality: Modality, source: &str, origin: &str) -> Result<Self> {
        let file: VocabularyFile = serde_json::from_str(source)
            .map_err(|e| AcqSchemaError::malformed_vocabulary(origin, e.to_string()))?;

        let mut properties = BTreeSet::new();
        for property in file.properties {
            if property.trim().is_empty() {
                return Err(AcqSchemaError::malformed_vocabulary(origin, "empty property name"));
            }
            properties.insert(property);
        }

        let resolve = |section: &str, names: Vec<String>| -> Result<Vec<TagRef>> {
            names
                .into_iter()
                .map(|name| {
                    let tag = TagRef::parse(&name);
                    if let TagRef::Field(field) = &tag {
                        if !properties.contains(field) {
                            return Err(AcqSchemaError::malformed_vocabulary(
                                origin,
                                format!(
                                    "{} tag '{}' is neither an entity nor a declared property",
                                    section, field
                                ),
                            ));
                        }
                    }
                    Ok(tag)
                })
                .collect()
        };

        let uid_tags = resolve("uid", file.instrument.uid_tags)?;
        let grouping_tags = resolve("grouping", file.instrument.grouping_tags)?;
        let version_tags = resolve("version", file.instrument.version_tags)?;
        let instrument_tags = resolve("instrument", file.instrument_tags)?;

        if uid_tags.is_empty() || grouping_tags.is_empty() {
            return Err(AcqSchemaError::malformed_vocabulary(
                origin,
                "instrument needs at least one uid tag and one grouping tag",
            ));
        }

        Ok(Self {
            modality,
            uid_tags,
            grouping_tags,
            version_tags,
            instrument_tags,
            properties,
        })
    }

    /// Tag that uniquely names a physical instrument
    pub fn unique_instrument(&self) -> &TagRef {
        &self.uid_tags[0]
    }

    /// Tag that names an instrument model
    pub fn instrument_model(&self) -> &TagRef {
        &self.grouping_tags[0]
    }

    /// Tags that partition a comparable group into branches
    pub fn discriminating_tags(&self, discrimination: Discrimination) -> Vec<TagRef> {
        let mut tags: Vec<TagRef> = Vec::new();
        let extra_uid: &[TagRef] = if discrimination.scanner_specific {
            self.uid_tags.as_slice()
        } else {
            &[]
        };
        let extra_version: &[TagRef] = if discrimination.version_specific {
            self.version_tags.as_slice()
        } else {
            &[]
        };
        for tag in self
            .instrument_tags
            .iter()
            .chain(extra_uid)
            .chain(extra_version)
        {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}

/// Lazily populated cache of vocabularies
///
/// The first request for a modality loads its vocabulary; later requests get
/// the cached `Arc`. Two threads racing on the first request may both load
/// it, and whichever inserts first wins; both loads produce the same value.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    vocabulary_dir: Option<PathBuf>,
    cache: RwLock<HashMap<Modality, Arc<Vocabulary>>>,
}

impl ConfigRegistry {
    /// Registry backed by the bundled vocabularies
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry reading `<dir>/<modality>_tags.json` instead of the bundled files
    pub fn with_vocabulary_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            vocabulary_dir: Some(dir.into()),
            cache: RwLock::default(),
        }
    }

    /// Vocabulary for a datatype label such as `anat` or `eeg`
    pub fn get_config(&self, datatype: &str) -> Result<Arc<Vocabulary>> {
        let datatype: Datatype = datatype.parse()?;
        self.get_modality(datatype.modality())
    }

    /// Vocabulary for a modality
    pub fn get_modality(&self, modality: Modality) -> Result<Arc<Vocabulary>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(vocabulary) = cache.get(&modality) {
                return Ok(Arc::clone(vocabulary));
            }
        }

        let loaded = Arc::new(self.load(modality)?);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(cache.entry(modality).or_insert(loaded)))
    }

    /// Number of modalities currently cached
    pub fn cached(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn load(&self, modality: Modality) -> Result<Vocabulary> {
        match &self.vocabulary_dir {
            Some(dir) => {
                let path = dir.join(modality.file_name());
                debug!("loading vocabulary {}", path.display());
                let source = read_vocabulary(&path)?;
                Vocabulary::from_json(modality, &source, &path.display().to_string())
            }
            None => {
                debug!("loading bundled vocabulary for {}", modality);
                Vocabulary::from_json(modality, modality.bundled(), &modality.file_name())
            }
        }
    }
}

fn read_vocabulary(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        AcqSchemaError::malformed_vocabulary(path.display().to_string(), e.to_string())
    })
}
