//! Filesystem layout for BIDS-style datasets
//!
//! Sidecars are found at `sub-<s>/[ses-<x>/][<datatype>/]<name>.json`.
//! Files whose names do not parse as entity filenames are skipped. Hidden
//! directories (including the schema folder) are never entered.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{DatasetLayout, Query};
use crate::entities::{parse_filename, read_record, Entities, Entity, Record};
use crate::error::{AcqSchemaError, Result};

#[derive(Debug, Clone)]
struct IndexedFile {
    path: PathBuf,
    entities: Entities,
}

/// Dataset indexed from disk
///
/// The index holds paths and entities; sidecar contents are read on query.
#[derive(Debug, Clone)]
pub struct FsLayout {
    root: PathBuf,
    files: Vec<IndexedFile>,
}

impl FsLayout {
    /// Index every sidecar below `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AcqSchemaError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "dataset root is not a directory"),
            ));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    return false;
                }
                // only subject folders at the top level
                entry.depth() != 1 || !entry.file_type().is_dir() || name.starts_with("sub-")
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                AcqSchemaError::io(path, e.into())
            })?;
            if entry.depth() < 2 || !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(".json") {
                continue;
            }

            let mut entities = match parse_filename(&name) {
                Ok(entities) => entities,
                Err(e) => {
                    debug!("skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if let Some(datatype) = datatype_folder(entry.path()) {
                entities.insert(Entity::Datatype, datatype);
            }
            files.push(IndexedFile {
                path: entry.path().to_path_buf(),
                entities,
            });
        }

        debug!("indexed {} sidecars under {}", files.len(), root.display());
        Ok(Self { root, files })
    }

    /// Number of indexed sidecars
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn datatype_folder(path: &Path) -> Option<String> {
    let parent = path.parent()?.file_name()?.to_string_lossy();
    if parent.starts_with("sub-") || parent.starts_with("ses-") {
        None
    } else {
        Some(parent.into_owned())
    }
}

impl DatasetLayout for FsLayout {
    fn root(&self) -> &Path {
        &self.root
    }

    fn datatypes(&self) -> Result<Vec<String>> {
        let datatypes: BTreeSet<&str> = self
            .files
            .iter()
            .filter_map(|file| file.entities.get(Entity::Datatype))
            .collect();
        Ok(datatypes.into_iter().map(str::to_string).collect())
    }

    fn subjects(&self) -> Result<Vec<String>> {
        let subjects: BTreeSet<&str> = self
            .files
            .iter()
            .filter_map(|file| file.entities.subject())
            .collect();
        Ok(subjects.into_iter().map(str::to_string).collect())
    }

    fn query(&self, query: &Query) -> Result<Vec<Record>> {
        self.files
            .iter()
            .filter(|file| query.matches(&file.entities))
            .map(|file| read_record(&file.path, file.entities.clone()))
            .collect()
    }
}
