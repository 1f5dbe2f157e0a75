//! Per-unit and per-job outcome reports.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::store::UnitId;

/// Final state of one unit after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// The unit artifact existed before the run; nothing was called.
    AlreadyDone,
    /// Every chunk succeeded and the artifact was written.
    Done,
    /// The artifact was written, but some chunks fell back per the failure policy.
    DoneWithFailures,
    /// No artifact was written; the next run retries the unit.
    Incomplete,
    /// The text had no content; nothing was called or written.
    Empty,
    /// An artifact could not be persisted.
    Failed,
}

impl UnitStatus {
    /// Whether the unit needs no further work.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::AlreadyDone | Self::Done | Self::Empty)
    }

    /// Whether the unit was written but carries fallbacks.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::DoneWithFailures)
    }

    /// Whether the unit still lacks its artifact.
    pub fn is_unfinished(&self) -> bool {
        matches!(self, Self::Incomplete | Self::Failed)
    }
}

/// A chunk whose call exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    /// 1-based chunk index
    pub index: usize,
    pub attempts: u32,
    pub reason: String,
}

/// What happened to one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: UnitId,
    pub status: UnitStatus,
    /// Number of chunks the text was segmented into
    pub chunks: usize,
    /// Outbound calls made, retries included
    pub calls: u32,
    /// Part artifacts found from an earlier run and not called again
    pub reused_parts: usize,
    pub failures: Vec<ChunkFailure>,
    /// Persistence error, when the status is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitReport {
    pub fn new(unit: UnitId, status: UnitStatus) -> Self {
        Self {
            unit,
            status,
            chunks: 0,
            calls: 0,
            reused_parts: 0,
            failures: Vec::new(),
            error: None,
        }
    }
}

/// Outcome of running one stage over a list of units.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitReport>,
}

impl JobReport {
    pub fn start(stage: &str) -> Self {
        let now = Utc::now();
        Self {
            stage: stage.to_string(),
            started_at: now,
            finished_at: now,
            units: Vec::new(),
        }
    }

    pub fn push(&mut self, report: UnitReport) {
        self.units.push(report);
        self.finished_at = Utc::now();
    }

    pub fn completed(&self) -> usize {
        self.count(UnitStatus::is_complete)
    }

    pub fn degraded(&self) -> usize {
        self.count(UnitStatus::is_degraded)
    }

    pub fn unfinished(&self) -> usize {
        self.count(UnitStatus::is_unfinished)
    }

    /// Outbound calls made across every unit.
    pub fn total_calls(&self) -> u32 {
        self.units.iter().map(|u| u.calls).sum()
    }

    fn count(&self, predicate: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| predicate(&u.status)).count()
    }

    /// One-line tally for the end of a run.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} completed, {} degraded, {} unfinished ({} calls)",
            self.stage,
            self.completed(),
            self.degraded(),
            self.unfinished(),
            self.total_calls()
        )
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path).context("Failed to create report file")?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).context("Failed to write report JSON")?;
        Ok(())
    }
}
