//! Artifact store backed by a directory of files.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ArtifactStore, StoreError, UnitId};

/// How unit and part artifacts are named inside the store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Appended to the unit name for the final artifact, e.g. `_cn.md`
    pub unit_suffix: String,
    /// Extension of part artifacts including the dot, e.g. `.mp3`
    pub part_extension: String,
}

impl ArtifactLayout {
    pub fn new(unit_suffix: impl Into<String>, part_extension: impl Into<String>) -> Self {
        Self {
            unit_suffix: unit_suffix.into(),
            part_extension: part_extension.into(),
        }
    }

    /// Layout for stages that only ever write a whole unit.
    pub fn text(unit_suffix: impl Into<String>) -> Self {
        Self::new(unit_suffix, ".txt")
    }

    pub fn unit_file(&self, unit: UnitId) -> String {
        format!("{}{}", unit, self.unit_suffix)
    }

    pub fn part_file(&self, unit: UnitId, part: usize) -> String {
        format!("{}_part{:02}{}", unit, part, self.part_extension)
    }
}

/// Stores artifacts as files under one directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    layout: ArtifactLayout,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unit_path(&self, unit: UnitId) -> PathBuf {
        self.root.join(self.layout.unit_file(unit))
    }

    pub fn part_path(&self, unit: UnitId, part: usize) -> PathBuf {
        self.root.join(self.layout.part_file(unit, part))
    }

    fn write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let wrap = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        fs::write(path, data).map_err(wrap)?;
        log::debug!("Wrote {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn read(path: &Path) -> Result<Vec<u8>, StoreError> {
        fs::read(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, unit: UnitId) -> bool {
        self.unit_path(unit).is_file()
    }

    fn part_exists(&self, unit: UnitId, part: usize) -> bool {
        self.part_path(unit, part).is_file()
    }

    fn write_unit(&self, unit: UnitId, data: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.unit_path(unit), data)
    }

    fn write_part(&self, unit: UnitId, part: usize, data: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.part_path(unit, part), data)
    }

    fn read_unit(&self, unit: UnitId) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.unit_path(unit))
    }

    fn read_part(&self, unit: UnitId, part: usize) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.part_path(unit, part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn audio_store(dir: &TempDir) -> FsStore {
        FsStore::new(dir.path().join("audio"), ArtifactLayout::new("_full.mp3", ".mp3"))
    }

    #[test]
    fn test_layout_names() {
        let layout = ArtifactLayout::new("_full.mp3", ".mp3");
        assert_eq!(layout.unit_file(UnitId(7)), "chapter_07_full.mp3");
        assert_eq!(layout.part_file(UnitId(7), 3), "chapter_07_part03.mp3");

        let text = ArtifactLayout::text("_cn.md");
        assert_eq!(text.unit_file(UnitId(1)), "chapter_01_cn.md");
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = audio_store(&dir);
        let unit = UnitId(1);

        assert!(!store.exists(unit));
        store.write_unit(unit, b"audio").unwrap();

        assert!(store.exists(unit));
        assert!(dir.path().join("audio/chapter_01_full.mp3").is_file());
        assert_eq!(store.read_unit(unit).unwrap(), b"audio");
    }

    #[test]
    fn test_parts_and_merge_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = audio_store(&dir);
        let unit = UnitId(2);

        store.write_part(unit, 1, b"ID3-one").unwrap();
        assert!(store.part_exists(unit, 1));
        assert!(!store.part_exists(unit, 2));
        assert!(!store.merge_parts(unit, 2).unwrap());
        assert!(!store.exists(unit));

        store.write_part(unit, 2, b"-two").unwrap();
        assert!(store.merge_parts(unit, 2).unwrap());
        assert_eq!(store.read_unit(unit).unwrap(), b"ID3-one-two");
        // Parts stay behind after the merge.
        assert!(store.part_exists(unit, 1));
    }

    #[test]
    fn test_read_missing_reports_path() {
        let dir = TempDir::new().unwrap();
        let store = audio_store(&dir);

        let err = store.read_part(UnitId(9), 1).unwrap_err();
        assert!(err.to_string().contains("chapter_09_part01.mp3"));
    }

    #[test]
    fn test_write_failure_reports_path() {
        let dir = TempDir::new().unwrap();
        // A file where the store directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let store = FsStore::new(&blocker, ArtifactLayout::text(".txt"));

        let err = store.write_unit(UnitId(1), b"text").unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert!(err.to_string().contains("blocked"));
    }
}
