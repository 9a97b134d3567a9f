//! Entity factoring
//!
//! Factoring decides which identifying attributes may differ between records
//! merged into one schema. Free attributes become wildcards in the
//! comparability query; all other attributes are held to the seed's value,
//! and attributes the seed lacks must be absent.

use std::collections::BTreeSet;

use crate::entities::{Entity, Record};
use crate::layout::{Constraint, Query};

/// Set of identifying attributes allowed to vary within a comparable group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoringPolicy {
    free: BTreeSet<Entity>,
}

impl Default for FactoringPolicy {
    fn default() -> Self {
        Self::new([Entity::Run])
    }
}

impl FactoringPolicy {
    /// Policy freeing the given entities; subject is always free
    pub fn new(free: impl IntoIterator<Item = Entity>) -> Self {
        let mut free: BTreeSet<Entity> = free.into_iter().collect();
        free.insert(Entity::Subject);
        Self { free }
    }

    /// Policy used by `init`: subject and run, plus session when sessions are uniform
    pub fn for_sessions(uniform_sessions: bool) -> Self {
        let mut policy = Self::default();
        if uniform_sessions {
            policy.free.insert(Entity::Session);
        }
        policy
    }

    pub fn is_free(&self, entity: Entity) -> bool {
        self.free.contains(&entity)
    }

    pub fn free(&self) -> impl Iterator<Item = Entity> + '_ {
        self.free.iter().copied()
    }

    /// Whether `other` agrees with `seed` on every attribute held fixed
    pub fn comparable(&self, seed: &Record, other: &Record) -> bool {
        Entity::KEY_VALUE
            .iter()
            .chain([Entity::Datatype, Entity::Suffix].iter())
            .filter(|entity| !self.is_free(**entity))
            .all(|entity| seed.entities.get(*entity) == other.entities.get(*entity))
    }
}

/// Query selecting every record structurally comparable to `seed`
pub fn build_query(seed: &Record, policy: &FactoringPolicy) -> Query {
    let mut query = Query::new();
    for (entity, value) in seed.entities.iter() {
        query.set(entity, Constraint::Exact(value.to_string()));
    }
    for entity in Entity::KEY_VALUE {
        if !seed.entities.contains(entity) {
            query.set(entity, Constraint::Absent);
        }
    }
    for entity in policy.free() {
        query.set(entity, Constraint::Any);
    }
    query.remove(Entity::Subject);
    query
}
