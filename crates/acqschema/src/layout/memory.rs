//! In-memory layout
//!
//! Holds records directly; artifacts still live under `root` on disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{DatasetLayout, Query};
use crate::entities::{build_path, Entities, Record};
use crate::error::{AcqSchemaError, Result};

#[derive(Debug, Clone, Default)]
pub struct MemoryLayout {
    root: PathBuf,
    records: Vec<Record>,
}

impl MemoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records: Vec::new(),
        }
    }

    /// Add a record; its path is derived from its entities
    pub fn with_record(mut self, entities: Entities, fields: Value) -> Result<Self> {
        self.insert(entities, fields)?;
        Ok(self)
    }

    pub fn insert(&mut self, entities: Entities, fields: Value) -> Result<()> {
        let fields: Map<String, Value> = match fields {
            Value::Object(map) => map,
            _ => return Err(AcqSchemaError::invalid_input("record fields must be an object")),
        };
        let path = self.root.join(build_path(&entities)?);
        self.records.push(Record::new(path, entities, fields));
        self.records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(())
    }
}

impl DatasetLayout for MemoryLayout {
    fn root(&self) -> &Path {
        &self.root
    }

    fn datatypes(&self) -> Result<Vec<String>> {
        let datatypes: BTreeSet<&str> = self
            .records
            .iter()
            .filter_map(|record| record.entities.get(crate::entities::Entity::Datatype))
            .collect();
        Ok(datatypes.into_iter().map(str::to_string).collect())
    }

    fn subjects(&self) -> Result<Vec<String>> {
        let subjects: BTreeSet<&str> = self
            .records
            .iter()
            .filter_map(|record| record.entities.subject())
            .collect();
        Ok(subjects.into_iter().map(str::to_string).collect())
    }

    fn query(&self, query: &Query) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|record| query.matches(&record.entities))
            .cloned()
            .collect())
    }
}
