//! Chapter file discovery and selection.
//!
//! Stage inputs are files named `chapter_NN<suffix>` in one directory; the
//! number is the unit id and determines processing order.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::store::UnitId;

static CHAPTER_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^chapter_(\d+)(.*)$").expect("chapter file pattern is valid"));

/// One input file for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    pub id: UnitId,
    pub path: PathBuf,
}

impl ChapterFile {
    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// Parse the chapter number from a file name ending in `suffix`.
fn chapter_number(file_name: &str, suffix: &str) -> Option<u32> {
    let captures = CHAPTER_FILE.captures(file_name)?;
    if !captures[2].ends_with(suffix) {
        return None;
    }
    captures[1].parse().ok()
}

/// Find every `chapter_NN*<suffix>` file in `dir`, ordered by chapter number.
///
/// When several files share a number, the first by name wins.
pub fn discover(dir: &Path, suffix: &str) -> Result<Vec<ChapterFile>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut chapters: Vec<ChapterFile> = Vec::new();
    for name in names {
        let Some(number) = chapter_number(&name, suffix) else {
            continue;
        };
        let id = UnitId(number);
        if chapters.iter().any(|c| c.id == id) {
            log::warn!("Ignoring {}: {} already has an input file", name, id);
            continue;
        }
        chapters.push(ChapterFile {
            id,
            path: dir.join(name),
        });
    }

    chapters.sort_by_key(|c| c.id);
    Ok(chapters)
}

/// Errors from parsing a `--chapters` value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Invalid chapter number: {0}")]
    InvalidNumber(String),

    #[error("Invalid chapter range {0}: start is after end")]
    ReversedRange(String),

    #[error("Empty chapter selection")]
    Empty,
}

/// Which chapters a run should process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChapterSelection {
    #[default]
    All,
    /// Inclusive range, e.g. `1-5`
    Range(u32, u32),
    /// Explicit list, e.g. `1,3,5`
    List(BTreeSet<u32>),
}

impl ChapterSelection {
    pub fn contains(&self, id: UnitId) -> bool {
        match self {
            Self::All => true,
            Self::Range(start, end) => (*start..=*end).contains(&id.0),
            Self::List(numbers) => numbers.contains(&id.0),
        }
    }
}

fn parse_number(s: &str) -> Result<u32, SelectionError> {
    s.trim()
        .parse()
        .map_err(|_| SelectionError::InvalidNumber(s.trim().to_string()))
}

impl FromStr for ChapterSelection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SelectionError::Empty);
        }

        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse_number(start)?, parse_number(end)?);
            if start > end {
                return Err(SelectionError::ReversedRange(s.to_string()));
            }
            return Ok(Self::Range(start, end));
        }

        let numbers = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(parse_number)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if numbers.is_empty() {
            return Err(SelectionError::Empty);
        }
        Ok(Self::List(numbers))
    }
}

/// Keep the selected chapters, then at most `max` of them.
pub fn select(
    chapters: Vec<ChapterFile>,
    selection: &ChapterSelection,
    max: Option<usize>,
) -> Vec<ChapterFile> {
    chapters
        .into_iter()
        .filter(|c| selection.contains(c.id))
        .take(max.unwrap_or(usize::MAX))
        .collect()
}

/// Split a chapter file into its first line (the title) and the rest.
///
/// A file without a line break has no separate title.
pub fn split_title(text: &str) -> (Option<&str>, &str) {
    match text.split_once('\n') {
        Some((title, body)) => (Some(title.trim_end_matches('\r')), body),
        None => (None, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).unwrap();
    }

    fn ids(chapters: &[ChapterFile]) -> Vec<u32> {
        chapters.iter().map(|c| c.id.0).collect()
    }

    #[test]
    fn test_discover_orders_by_number() {
        let dir = TempDir::new().unwrap();
        for name in ["chapter_10.txt", "chapter_02.txt", "chapter_1.txt", "notes.txt"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("chapter_05.txt")).unwrap();

        let chapters = discover(dir.path(), ".txt").unwrap();
        assert_eq!(ids(&chapters), vec![1, 2, 10]);
        assert_eq!(chapters[2].read().unwrap(), "chapter_10.txt");
    }

    #[test]
    fn test_discover_filters_by_suffix() {
        let dir = TempDir::new().unwrap();
        for name in ["chapter_01_cn.md", "chapter_01.txt", "chapter_02_cn.md", "chapter_03.md"] {
            touch(dir.path(), name);
        }

        let chapters = discover(dir.path(), "_cn.md").unwrap();
        assert_eq!(ids(&chapters), vec![1, 2]);
        assert!(chapters[0].path.ends_with("chapter_01_cn.md"));
    }

    #[test]
    fn test_discover_keeps_first_duplicate() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "chapter_01.txt");
        touch(dir.path(), "chapter_01_summary.txt");

        let chapters = discover(dir.path(), ".txt").unwrap();
        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].path.ends_with("chapter_01.txt"));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = discover(&dir.path().join("missing"), ".txt").unwrap_err();
        assert!(err.to_string().contains("Failed to read input directory"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("1-5".parse::<ChapterSelection>(), Ok(ChapterSelection::Range(1, 5)));
        assert_eq!(
            "1, 3,5".parse::<ChapterSelection>(),
            Ok(ChapterSelection::List(BTreeSet::from([1, 3, 5])))
        );
        assert_eq!("7".parse::<ChapterSelection>(), Ok(ChapterSelection::List(BTreeSet::from([7]))));
        assert_eq!(
            "5-1".parse::<ChapterSelection>(),
            Err(SelectionError::ReversedRange("5-1".to_string()))
        );
        assert_eq!(
            "one".parse::<ChapterSelection>(),
            Err(SelectionError::InvalidNumber("one".to_string()))
        );
        assert_eq!(" ".parse::<ChapterSelection>(), Err(SelectionError::Empty));
    }

    #[test]
    fn test_select_applies_selection_then_max() {
        let chapters: Vec<ChapterFile> = (1..=6)
            .map(|n| ChapterFile {
                id: UnitId(n),
                path: PathBuf::from(format!("chapter_{:02}.txt", n)),
            })
            .collect();

        let picked = select(chapters.clone(), &ChapterSelection::Range(2, 5), Some(2));
        assert_eq!(ids(&picked), vec![2, 3]);

        let picked = select(chapters.clone(), &"1,4,6".parse().unwrap(), None);
        assert_eq!(ids(&picked), vec![1, 4, 6]);

        let picked = select(chapters, &ChapterSelection::All, Some(4));
        assert_eq!(ids(&picked), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_split_title() {
        assert_eq!(
            split_title("1. The Start\r\n\nBody text."),
            (Some("1. The Start"), "\nBody text.")
        );
        assert_eq!(split_title("Only a line"), (None, "Only a line"));
    }
}
