//! Resumable artifact storage keyed by unit and part.
//!
//! The existence of an artifact is the checkpoint: a unit whose artifact
//! exists is done, and a part whose artifact exists needs no further call.

mod fs;
mod memory;

pub use fs::{ArtifactLayout, FsStore};
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Identifies one unit of work (a chapter) by its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chapter_{:02}", self.0)
    }
}

/// Errors raised while reading or writing artifacts.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No artifact for {0}")]
    Missing(String),
}

/// Byte-oriented storage for unit and part artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Whether the final artifact for `unit` exists.
    fn exists(&self, unit: UnitId) -> bool;

    /// Whether part `part` (1-based) of `unit` exists.
    fn part_exists(&self, unit: UnitId, part: usize) -> bool;

    /// Replace the final artifact for `unit`.
    fn write_unit(&self, unit: UnitId, data: &[u8]) -> Result<(), StoreError>;

    /// Replace part `part` of `unit`.
    fn write_part(&self, unit: UnitId, part: usize, data: &[u8]) -> Result<(), StoreError>;

    fn read_unit(&self, unit: UnitId) -> Result<Vec<u8>, StoreError>;

    fn read_part(&self, unit: UnitId, part: usize) -> Result<Vec<u8>, StoreError>;

    /// Concatenate parts `1..=count` in order into the unit artifact.
    ///
    /// Returns `Ok(false)` without writing anything unless every part exists.
    /// Repeating a successful merge rewrites the same bytes.
    fn merge_parts(&self, unit: UnitId, count: usize) -> Result<bool, StoreError> {
        if count == 0 || !(1..=count).all(|part| self.part_exists(unit, part)) {
            return Ok(false);
        }

        let mut merged = Vec::new();
        for part in 1..=count {
            merged.extend_from_slice(&self.read_part(unit, part)?);
        }
        self.write_unit(unit, &merged)?;
        Ok(true)
    }
}
