//! In-memory artifact store, mainly for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ArtifactStore, StoreError, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Unit(UnitId),
    Part(UnitId, usize),
}

/// Keeps artifacts in a map and counts every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<HashMap<Key, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far, units and parts together.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn artifacts(&self) -> MutexGuard<'_, HashMap<Key, Vec<u8>>> {
        self.artifacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of every artifact currently held, for comparing snapshots.
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .artifacts()
            .iter()
            .map(|(key, data)| {
                let name = match key {
                    Key::Unit(unit) => unit.to_string(),
                    Key::Part(unit, part) => format!("{}_part{:02}", unit, part),
                };
                (name, data.clone())
            })
            .collect();
        entries.sort();
        entries
    }

    fn contains(&self, key: Key) -> bool {
        self.artifacts().contains_key(&key)
    }

    fn put(&self, key: Key, data: &[u8]) -> Result<(), StoreError> {
        self.artifacts().insert(key, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, key: Key, name: String) -> Result<Vec<u8>, StoreError> {
        self.artifacts()
            .get(&key)
            .cloned()
            .ok_or(StoreError::Missing(name))
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, unit: UnitId) -> bool {
        self.contains(Key::Unit(unit))
    }

    fn part_exists(&self, unit: UnitId, part: usize) -> bool {
        self.contains(Key::Part(unit, part))
    }

    fn write_unit(&self, unit: UnitId, data: &[u8]) -> Result<(), StoreError> {
        self.put(Key::Unit(unit), data)
    }

    fn write_part(&self, unit: UnitId, part: usize, data: &[u8]) -> Result<(), StoreError> {
        self.put(Key::Part(unit, part), data)
    }

    fn read_unit(&self, unit: UnitId) -> Result<Vec<u8>, StoreError> {
        self.get(Key::Unit(unit), unit.to_string())
    }

    fn read_part(&self, unit: UnitId, part: usize) -> Result<Vec<u8>, StoreError> {
        self.get(Key::Part(unit, part), format!("{} part {}", unit, part))
    }
}
