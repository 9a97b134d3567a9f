//! Dataset layout service
//!
//! The engine never walks a dataset itself. It asks a [`DatasetLayout`] which
//! datatypes and subjects exist, which records match a [`Query`], and where a
//! set of entities lives on disk.

pub mod fs;
pub mod memory;

pub use fs::FsLayout;
pub use memory::MemoryLayout;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entities::{self, Entities, Entity, Record};
use crate::error::Result;

/// Constraint on one entity in a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Entity must be present with this value
    Exact(String),
    /// Any value, including absent
    Any,
    /// Entity must not be present
    Absent,
}

impl Constraint {
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Constraint::Exact(expected) => value == Some(expected.as_str()),
            Constraint::Any => true,
            Constraint::Absent => value.is_none(),
        }
    }
}

/// Entity-based record selector
///
/// Entities without a constraint are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    constraints: BTreeMap<Entity, Constraint>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style constraint
    pub fn with(mut self, entity: Entity, constraint: Constraint) -> Self {
        self.set(entity, constraint);
        self
    }

    /// Builder-style exact match
    pub fn with_exact(self, entity: Entity, value: impl Into<String>) -> Self {
        self.with(entity, Constraint::Exact(value.into()))
    }

    pub fn set(&mut self, entity: Entity, constraint: Constraint) {
        self.constraints.insert(entity, constraint);
    }

    pub fn remove(&mut self, entity: Entity) -> Option<Constraint> {
        self.constraints.remove(&entity)
    }

    pub fn get(&self, entity: Entity) -> Option<&Constraint> {
        self.constraints.get(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Constraint)> {
        self.constraints.iter().map(|(entity, c)| (*entity, c))
    }

    pub fn matches(&self, entities: &Entities) -> bool {
        self.constraints
            .iter()
            .all(|(entity, constraint)| constraint.matches(entities.get(*entity)))
    }
}

/// Read access to a hierarchical dataset
pub trait DatasetLayout {
    /// Dataset root directory
    fn root(&self) -> &Path;

    /// Datatype labels present in the dataset, sorted
    fn datatypes(&self) -> Result<Vec<String>>;

    /// Subject labels present in the dataset, sorted
    fn subjects(&self) -> Result<Vec<String>>;

    /// Records whose entities satisfy the query, sorted by path
    fn query(&self, query: &Query) -> Result<Vec<Record>>;

    /// Dataset-relative path for a set of entities
    fn build_path(&self, entities: &Entities) -> Result<PathBuf> {
        entities::build_path(entities)
    }
}
