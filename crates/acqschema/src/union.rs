//! Union schema inference
//!
//! A union schema merges a group of structurally comparable records into one
//! contract: fields seen in every record of a branch are required, fields
//! seen in some are optional, and vocabulary fields are limited to the values
//! observed across the branch. Branches split the group by the values of the
//! discriminating tags, so each instrument family gets its own contract.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::TagRef;
use crate::entities::Record;
use crate::error::{AcqSchemaError, Result};
use crate::factoring::FactoringPolicy;

/// JSON Schema primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => JsonType::Integer,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values a field may take
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDomain {
    /// Any value
    Unconstrained,
    /// One of the observed values
    Enumerated(Vec<Value>),
}

impl ValueDomain {
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            ValueDomain::Unconstrained => true,
            ValueDomain::Enumerated(values) => values.contains(value),
        }
    }

    fn observe(&mut self, value: &Value) {
        if let ValueDomain::Enumerated(values) = self {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
}

/// Inferred contract for one field within a branch
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub required: bool,
    pub types: BTreeSet<JsonType>,
    pub domain: ValueDomain,
}

impl FieldConstraint {
    fn new(constrained: bool) -> Self {
        Self {
            required: false,
            types: BTreeSet::new(),
            domain: if constrained {
                ValueDomain::Enumerated(Vec::new())
            } else {
                ValueDomain::Unconstrained
            },
        }
    }

    fn observe(&mut self, value: &Value) {
        self.types.insert(JsonType::of(value));
        self.domain.observe(value);
    }
}

/// Values of the discriminating tags that select a branch
///
/// Absent tags are recorded as `null`. Integral floats are stored as
/// integers, so `8.0` and `8` select the same branch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchKey {
    entries: Vec<(String, Value)>,
}

impl BranchKey {
    /// Key of a record under the given tags
    pub fn of(record: &Record, tags: &[TagRef]) -> Self {
        Self {
            entries: tags
                .iter()
                .map(|tag| {
                    (
                        tag.name().to_string(),
                        key_value(tag.value(record).unwrap_or(Value::Null)),
                    )
                })
                .collect(),
        }
    }

    /// Key stored in an artifact, read in the order of `tags`
    pub fn from_json(tags: &[String], object: &Map<String, Value>) -> Self {
        Self {
            entries: tags
                .iter()
                .map(|tag| {
                    let value = object.get(tag).cloned().unwrap_or(Value::Null);
                    (tag.clone(), key_value(value))
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(tag, value)| (tag.clone(), value.clone()))
                .collect(),
        )
    }

    /// Stable string form used to order and group branches
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

/// Numbers compare by value, as the `enum` keyword does
fn key_value(value: Value) -> Value {
    match &value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value,
        },
        _ => value,
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("(any instrument)");
        }
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(tag, value)| format!("{}={}", tag, value))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Contract for the records sharing one branch key
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaBranch {
    pub key: BranchKey,
    /// Number of records merged into this branch
    pub members: usize,
    pub fields: BTreeMap<String, FieldConstraint>,
}

impl SchemaBranch {
    pub fn field(&self, name: &str) -> Option<&FieldConstraint> {
        self.fields.get(name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, constraint)| constraint.required)
            .map(|(name, _)| name.as_str())
    }
}

/// Merged contract for one acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct UnionSchema {
    /// Acquisition label, e.g. `anat/T1w`
    pub title: String,
    /// Names of the tags branches are keyed by
    pub discriminators: Vec<String>,
    /// Whether fields outside the vocabulary are accepted
    pub allow_additional_fields: bool,
    pub branches: Vec<SchemaBranch>,
}

impl UnionSchema {
    /// Branch a record falls into, if any
    pub fn branch_for(&self, record: &Record) -> Option<&SchemaBranch> {
        let tags: Vec<TagRef> = self.discriminators.iter().map(|t| TagRef::parse(t)).collect();
        let key = BranchKey::of(record, &tags);
        self.branches.iter().find(|branch| branch.key == key)
    }

    /// Total number of records merged
    pub fn member_count(&self) -> usize {
        self.branches.iter().map(|branch| branch.members).sum()
    }
}

/// Builds union schemas from comparable record groups
#[derive(Debug, Clone)]
pub struct UnionSchemaBuilder {
    allow_additional_fields: bool,
}

impl Default for UnionSchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnionSchemaBuilder {
    pub fn new() -> Self {
        Self {
            allow_additional_fields: true,
        }
    }

    /// Keep fields outside the vocabulary as unconstrained (default) or reject them
    pub fn allow_additional_fields(mut self, allow: bool) -> Self {
        self.allow_additional_fields = allow;
        self
    }

    /// Merge `group` into a union schema seeded by `seed`
    ///
    /// Non-data records and records that differ from the seed on a fixed
    /// attribute are left out. Records are partitioned by the values of
    /// `discriminating_tags`; fields named in `vocabulary` get an enumerated
    /// domain.
    pub fn build(
        &self,
        seed: &Record,
        group: &[Record],
        discriminating_tags: &[TagRef],
        vocabulary: &BTreeSet<String>,
        policy: &FactoringPolicy,
    ) -> Result<UnionSchema> {
        let title = seed.entities.acquisition_label();

        let members: Vec<&Record> = group
            .iter()
            .filter(|record| !record.is_non_data())
            .filter(|record| {
                let comparable = policy.comparable(seed, record);
                if !comparable {
                    debug!("{}: ignoring {}", title, record.path.display());
                }
                comparable
            })
            .collect();
        if members.is_empty() {
            return Err(AcqSchemaError::NoComparableRecords(title));
        }

        let mut partition: BTreeMap<String, (BranchKey, Vec<&Record>)> = BTreeMap::new();
        for record in members {
            for tag in discriminating_tags {
                if let Some(value) = tag.value(record) {
                    if value.is_array() || value.is_object() {
                        return Err(AcqSchemaError::ConflictingPartition {
                            acquisition: title,
                            tag: tag.name().to_string(),
                            reason: format!(
                                "{} holds a non-scalar value",
                                record.path.display()
                            ),
                        });
                    }
                }
            }
            let key = BranchKey::of(record, discriminating_tags);
            partition
                .entry(key.canonical())
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(record);
        }

        let branches: Vec<SchemaBranch> = partition
            .into_values()
            .map(|(key, records)| self.merge_branch(key, &records, vocabulary))
            .collect();
        debug!(
            "{}: {} branch(es) over {} record(s)",
            title,
            branches.len(),
            branches.iter().map(|b| b.members).sum::<usize>()
        );

        Ok(UnionSchema {
            title,
            discriminators: discriminating_tags
                .iter()
                .map(|tag| tag.name().to_string())
                .collect(),
            allow_additional_fields: self.allow_additional_fields,
            branches,
        })
    }

    fn merge_branch(
        &self,
        key: BranchKey,
        records: &[&Record],
        vocabulary: &BTreeSet<String>,
    ) -> SchemaBranch {
        let mut fields: BTreeMap<String, FieldConstraint> = BTreeMap::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();

        for record in records {
            for (name, value) in &record.fields {
                let constrained = vocabulary.contains(name);
                if !constrained && !self.allow_additional_fields {
                    continue;
                }
                fields
                    .entry(name.clone())
                    .or_insert_with(|| FieldConstraint::new(constrained))
                    .observe(value);
                *seen.entry(name.clone()).or_default() += 1;
            }
        }

        for (name, constraint) in fields.iter_mut() {
            constraint.required = seen.get(name).copied() == Some(records.len());
        }

        SchemaBranch {
            key,
            members: records.len(),
            fields,
        }
    }
}
