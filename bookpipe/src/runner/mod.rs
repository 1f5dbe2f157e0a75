//! Drives one stage over units: segment, call per chunk in order, reassemble.
//!
//! Text stages accumulate chunk outputs in memory and write the unit artifact
//! once. Speech writes each chunk as a part artifact as soon as it succeeds, so
//! an interrupted unit resumes from its first missing part.

mod report;

pub use report::{ChunkFailure, JobReport, UnitReport, UnitStatus};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::cell::Cell;

use crate::pacing::{CallOutcome, PacedCaller};
use crate::store::{ArtifactStore, UnitId};
use crate::text::{segment_with, Chunk, SegmentOptions};

/// Separator between reassembled text chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// One outbound operation applied to a chunk.
#[async_trait]
pub trait ChunkCall: Send + Sync {
    type Output: Send;

    /// Short stage name used in logs and failure markers.
    fn label(&self) -> &str;

    async fn call(&self, chunk: &Chunk) -> anyhow::Result<Self::Output>;
}

/// What a text stage puts in place of a chunk whose call was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The input chunk, unchanged.
    KeepInput,
    /// A visible `[<stage> failed for chunk i]` placeholder.
    Marker,
    /// Nothing: the unit is left without an artifact.
    Abandon,
}

/// Input for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitJob {
    pub id: UnitId,
    /// Kept verbatim as the first line of a text artifact
    pub title: Option<String>,
    pub text: String,
}

impl UnitJob {
    pub fn new(id: UnitId, text: impl Into<String>) -> Self {
        Self {
            id,
            title: None,
            text: text.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Runs units through a [`ChunkCall`] against one store and one pacing window.
pub struct ChunkJobRunner<'a> {
    caller: &'a PacedCaller,
    store: &'a dyn ArtifactStore,
    options: SegmentOptions,
    max_attempts: u32,
}

impl<'a> ChunkJobRunner<'a> {
    pub fn new(
        caller: &'a PacedCaller,
        store: &'a dyn ArtifactStore,
        options: SegmentOptions,
        max_attempts: u32,
    ) -> Self {
        Self {
            caller,
            store,
            options,
            max_attempts,
        }
    }

    /// Segment `job`, or report why there is nothing to do.
    fn prepare(&self, job: &UnitJob) -> Result<Vec<Chunk>, UnitReport> {
        if self.store.exists(job.id) {
            info!("{}: already done, skipping", job.id);
            return Err(UnitReport::new(job.id, UnitStatus::AlreadyDone));
        }

        let chunks = segment_with(&job.text, self.options);
        if chunks.is_empty() {
            warn!("{}: no text to process", job.id);
            return Err(UnitReport::new(job.id, UnitStatus::Empty));
        }

        info!(
            "{}: {} chars in {} chunk(s)",
            job.id,
            job.text.chars().count(),
            chunks.len()
        );
        Ok(chunks)
    }

    /// Invoke `call` for one chunk through the paced caller, counting attempts.
    async fn invoke<C>(&self, job: &UnitJob, chunk: &Chunk, call: &C, calls: &Cell<u32>) -> CallOutcome<C::Output>
    where
        C: ChunkCall + ?Sized,
    {
        let label = format!("{} {} chunk {}/{}", call.label(), job.id, chunk.index, chunk.total);
        debug!("{} ({} chars)", label, chunk.size_chars);
        self.caller
            .invoke(&label, self.max_attempts, || {
                calls.set(calls.get() + 1);
                call.call(chunk)
            })
            .await
    }

    /// Run a text stage over one unit.
    ///
    /// Chunk outputs are joined with a blank line; a title, when present, is
    /// written first. Exhausted chunks are handled per `policy`.
    pub async fn run_text<C>(&self, job: &UnitJob, call: &C, policy: FailurePolicy) -> UnitReport
    where
        C: ChunkCall<Output = String> + ?Sized,
    {
        let chunks = match self.prepare(job) {
            Ok(chunks) => chunks,
            Err(report) => return report,
        };

        let calls = Cell::new(0);
        let mut report = UnitReport::new(job.id, UnitStatus::Done);
        report.chunks = chunks.len();
        let mut outputs = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            match self.invoke(job, chunk, call, &calls).await {
                CallOutcome::Success(text) => outputs.push(text),
                CallOutcome::Exhausted { attempts, reason } => {
                    error!(
                        "{}: {} failed for chunk {}/{} after {} attempts: {}",
                        job.id,
                        call.label(),
                        chunk.index,
                        chunk.total,
                        attempts,
                        reason
                    );
                    report.failures.push(ChunkFailure {
                        index: chunk.index,
                        attempts,
                        reason,
                    });

                    match policy {
                        FailurePolicy::KeepInput => outputs.push(chunk.text.clone()),
                        FailurePolicy::Marker => outputs.push(format!(
                            "[{} failed for chunk {}]",
                            call.label(),
                            chunk.index
                        )),
                        FailurePolicy::Abandon => {
                            report.calls = calls.get();
                            report.status = UnitStatus::Incomplete;
                            warn!("{}: abandoned, will retry on the next run", job.id);
                            return report;
                        }
                    }
                }
            }
        }
        report.calls = calls.get();

        let body = outputs.join(CHUNK_SEPARATOR);
        let content = match &job.title {
            Some(title) => format!("{}{}{}", title, CHUNK_SEPARATOR, body),
            None => body,
        };

        if let Err(err) = self.store.write_unit(job.id, content.as_bytes()) {
            error!("{}: {}", job.id, err);
            report.status = UnitStatus::Failed;
            report.error = Some(err.to_string());
            return report;
        }

        if !report.failures.is_empty() {
            report.status = UnitStatus::DoneWithFailures;
        }
        info!(
            "{}: saved ({} chars, {} fallback chunk(s))",
            job.id,
            content.chars().count(),
            report.failures.len()
        );
        report
    }

    /// Run speech synthesis over one unit with part-level checkpoints.
    ///
    /// A one-chunk unit is written straight to the unit artifact. Otherwise
    /// each chunk becomes a part artifact, existing parts are not called again,
    /// and the parts are merged once all of them exist.
    pub async fn run_speech<C>(&self, job: &UnitJob, call: &C) -> UnitReport
    where
        C: ChunkCall<Output = Vec<u8>> + ?Sized,
    {
        let chunks = match self.prepare(job) {
            Ok(chunks) => chunks,
            Err(report) => return report,
        };

        let calls = Cell::new(0);
        let mut report = UnitReport::new(job.id, UnitStatus::Done);
        report.chunks = chunks.len();
        let sole = chunks.len() == 1;

        for chunk in &chunks {
            if !sole && self.store.part_exists(job.id, chunk.index) {
                debug!("{}: part {} already exists", job.id, chunk.index);
                report.reused_parts += 1;
                continue;
            }

            let audio = match self.invoke(job, chunk, call, &calls).await {
                CallOutcome::Success(audio) => audio,
                CallOutcome::Exhausted { attempts, reason } => {
                    error!(
                        "{}: {} failed for part {}/{} after {} attempts: {}",
                        job.id,
                        call.label(),
                        chunk.index,
                        chunk.total,
                        attempts,
                        reason
                    );
                    report.failures.push(ChunkFailure {
                        index: chunk.index,
                        attempts,
                        reason,
                    });
                    continue;
                }
            };

            let written = if sole {
                self.store.write_unit(job.id, &audio)
            } else {
                self.store.write_part(job.id, chunk.index, &audio)
            };
            if let Err(err) = written {
                error!("{}: {}", job.id, err);
                report.calls = calls.get();
                report.status = UnitStatus::Failed;
                report.error = Some(err.to_string());
                return report;
            }
            debug!("{}: part {} saved ({} bytes)", job.id, chunk.index, audio.len());
        }
        report.calls = calls.get();

        if !report.failures.is_empty() {
            warn!(
                "{}: {} of {} part(s) missing, will retry on the next run",
                job.id,
                report.failures.len(),
                chunks.len()
            );
            report.status = UnitStatus::Incomplete;
            return report;
        }

        if !sole {
            match self.store.merge_parts(job.id, chunks.len()) {
                Ok(true) => info!("{}: merged {} parts", job.id, chunks.len()),
                Ok(false) => {
                    warn!("{}: parts incomplete, not merged", job.id);
                    report.status = UnitStatus::Incomplete;
                }
                Err(err) => {
                    error!("{}: {}", job.id, err);
                    report.status = UnitStatus::Failed;
                    report.error = Some(err.to_string());
                }
            }
        } else {
            info!("{}: saved", job.id);
        }
        report
    }
}

/// Run a text stage over `jobs` in order.
///
/// `on_unit` sees each unit's report as soon as it is finished.
pub async fn run_text_job<C>(
    runner: &ChunkJobRunner<'_>,
    jobs: &[UnitJob],
    call: &C,
    policy: FailurePolicy,
    mut on_unit: impl FnMut(&UnitReport),
) -> JobReport
where
    C: ChunkCall<Output = String> + ?Sized,
{
    let mut job_report = JobReport::start(call.label());
    for job in jobs {
        let report = runner.run_text(job, call, policy).await;
        on_unit(&report);
        job_report.push(report);
    }
    job_report
}

/// Run speech synthesis over `jobs` in order.
pub async fn run_speech_job<C>(
    runner: &ChunkJobRunner<'_>,
    jobs: &[UnitJob],
    call: &C,
    mut on_unit: impl FnMut(&UnitReport),
) -> JobReport
where
    C: ChunkCall<Output = Vec<u8>> + ?Sized,
{
    let mut job_report = JobReport::start(call.label());
    for job in jobs {
        let report = runner.run_speech(job, call).await;
        on_unit(&report);
        job_report.push(report);
    }
    job_report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::{Clock, ManualClock};
    use crate::store::{MemoryStore, StoreError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const THREE_PARAGRAPHS: &str = "First.\n\nSecond.\n\nThird.";

    /// Upper-cases chunks, failing every call whose chunk contains `fail_on`.
    struct Shout {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Shout {
        fn new() -> Self {
            Self {
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(needle: &'static str) -> Self {
            Self {
                fail_on: Some(needle),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn shout(&self, chunk: &Chunk) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(needle) = self.fail_on {
                if chunk.text.contains(needle) {
                    anyhow::bail!("service unavailable");
                }
            }
            Ok(chunk.text.to_uppercase())
        }
    }

    #[async_trait]
    impl ChunkCall for Shout {
        type Output = String;

        fn label(&self) -> &str {
            "shout"
        }

        async fn call(&self, chunk: &Chunk) -> anyhow::Result<String> {
            self.shout(chunk)
        }
    }

    /// Speech stand-in: the "audio" is the upper-cased chunk text.
    struct ShoutAudio(Shout);

    #[async_trait]
    impl ChunkCall for ShoutAudio {
        type Output = Vec<u8>;

        fn label(&self) -> &str {
            "speak"
        }

        async fn call(&self, chunk: &Chunk) -> anyhow::Result<Vec<u8>> {
            self.0.shout(chunk).map(String::into_bytes)
        }
    }

    /// A store whose unit writes always fail.
    struct ReadOnlyStore(MemoryStore);

    impl ArtifactStore for ReadOnlyStore {
        fn exists(&self, unit: UnitId) -> bool {
            self.0.exists(unit)
        }
        fn part_exists(&self, unit: UnitId, part: usize) -> bool {
            self.0.part_exists(unit, part)
        }
        fn write_unit(&self, unit: UnitId, _data: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Write {
                path: format!("/readonly/{}", unit).into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
        fn write_part(&self, unit: UnitId, part: usize, data: &[u8]) -> Result<(), StoreError> {
            self.0.write_part(unit, part, data)
        }
        fn read_unit(&self, unit: UnitId) -> Result<Vec<u8>, StoreError> {
            self.0.read_unit(unit)
        }
        fn read_part(&self, unit: UnitId, part: usize) -> Result<Vec<u8>, StoreError> {
            self.0.read_part(unit, part)
        }
    }

    fn caller() -> (Arc<ManualClock>, PacedCaller) {
        let clock = Arc::new(ManualClock::new());
        let caller = PacedCaller::new(60, clock.clone());
        (clock, caller)
    }

    fn runner<'a>(caller: &'a PacedCaller, store: &'a dyn ArtifactStore, max_chars: usize) -> ChunkJobRunner<'a> {
        ChunkJobRunner::new(caller, store, SegmentOptions::new(max_chars), 3)
    }

    fn text_of(store: &MemoryStore, unit: UnitId) -> String {
        String::from_utf8(store.read_unit(unit).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_text_unit_joins_chunks_after_title() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let job = UnitJob::new(UnitId(1), THREE_PARAGRAPHS).with_title("1. Opening");

        let report = runner.run_text(&job, &Shout::new(), FailurePolicy::KeepInput).await;

        assert_eq!(report.status, UnitStatus::Done);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.calls, 3);
        assert_eq!(
            text_of(&store, UnitId(1)),
            "1. Opening\n\nFIRST.\n\nSECOND.\n\nTHIRD."
        );
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_input_in_place() {
        let (clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let call = Shout::failing_on("Second");
        let job = UnitJob::new(UnitId(1), THREE_PARAGRAPHS);

        let report = runner.run_text(&job, &call, FailurePolicy::KeepInput).await;

        assert_eq!(report.status, UnitStatus::DoneWithFailures);
        assert_eq!(text_of(&store, UnitId(1)), "FIRST.\n\nSecond.\n\nTHIRD.");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 2);
        assert_eq!(report.failures[0].attempts, 3);
        assert_eq!(report.failures[0].reason, "service unavailable");
        // One call each for chunks 1 and 3, three for chunk 2.
        assert_eq!(call.calls(), 5);
        assert_eq!(report.calls, 5);
        assert!(clock.sleeps().contains(&std::time::Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_marker_policy() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let job = UnitJob::new(UnitId(3), THREE_PARAGRAPHS);

        runner
            .run_text(&job, &Shout::failing_on("Third"), FailurePolicy::Marker)
            .await;

        assert_eq!(
            text_of(&store, UnitId(3)),
            "FIRST.\n\nSECOND.\n\n[shout failed for chunk 3]"
        );
    }

    #[tokio::test]
    async fn test_abandon_policy_writes_nothing() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let call = Shout::failing_on("First");
        let job = UnitJob::new(UnitId(1), THREE_PARAGRAPHS);

        let report = runner.run_text(&job, &call, FailurePolicy::Abandon).await;

        assert_eq!(report.status, UnitStatus::Incomplete);
        assert!(!store.exists(UnitId(1)));
        assert_eq!(store.write_count(), 0);
        // Later chunks are not called once the unit is abandoned.
        assert_eq!(call.calls(), 3);
    }

    #[tokio::test]
    async fn test_second_run_makes_no_calls() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let jobs = vec![
            UnitJob::new(UnitId(1), THREE_PARAGRAPHS),
            UnitJob::new(UnitId(2), "Only one"),
        ];

        let first = Shout::new();
        let report = run_text_job(&runner, &jobs, &first, FailurePolicy::KeepInput, |_| {}).await;
        assert_eq!(report.completed(), 2);
        assert_eq!(first.calls(), 4);

        let writes = store.write_count();
        let snapshot = store.snapshot();

        let second = Shout::new();
        let mut seen = Vec::new();
        let report = run_text_job(&runner, &jobs, &second, FailurePolicy::KeepInput, |unit| {
            seen.push(unit.status)
        })
        .await;

        assert_eq!(second.calls(), 0);
        assert_eq!(report.total_calls(), 0);
        assert_eq!(seen, vec![UnitStatus::AlreadyDone, UnitStatus::AlreadyDone]);
        assert_eq!(store.write_count(), writes);
        assert_eq!(store.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_empty_text_is_reported_not_called() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let call = Shout::new();

        let report = runner
            .run_text(&UnitJob::new(UnitId(1), " \n\n \n"), &call, FailurePolicy::KeepInput)
            .await;

        assert_eq!(report.status, UnitStatus::Empty);
        assert_eq!(call.calls(), 0);
        assert!(!store.exists(UnitId(1)));
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_stop_job() {
        let (_clock, caller) = caller();
        let store = ReadOnlyStore(MemoryStore::new());
        let runner = runner(&caller, &store, 100);
        let jobs = vec![
            UnitJob::new(UnitId(1), "One."),
            UnitJob::new(UnitId(2), "Two."),
        ];
        let call = Shout::new();

        let report = run_text_job(&runner, &jobs, &call, FailurePolicy::KeepInput, |_| {}).await;

        assert_eq!(report.units.len(), 2);
        assert_eq!(report.unfinished(), 2);
        assert_eq!(call.calls(), 2);
        let error = report.units[1].error.as_deref().unwrap();
        assert!(error.contains("chapter_02"));
    }

    #[tokio::test]
    async fn test_speech_resumes_missing_part() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let job = UnitJob::new(UnitId(1), THREE_PARAGRAPHS);

        let flaky = ShoutAudio(Shout::failing_on("Second"));
        let report = runner.run_speech(&job, &flaky).await;

        assert_eq!(report.status, UnitStatus::Incomplete);
        assert!(store.part_exists(UnitId(1), 1));
        assert!(!store.part_exists(UnitId(1), 2));
        assert!(store.part_exists(UnitId(1), 3));
        assert!(!store.exists(UnitId(1)));
        assert!(!store.merge_parts(UnitId(1), 3).unwrap());

        let healthy = ShoutAudio(Shout::new());
        let report = runner.run_speech(&job, &healthy).await;

        assert_eq!(report.status, UnitStatus::Done);
        assert_eq!(report.reused_parts, 2);
        assert_eq!(healthy.0.calls(), 1);
        assert_eq!(store.read_unit(UnitId(1)).unwrap(), b"FIRST.SECOND.THIRD.");
    }

    #[tokio::test]
    async fn test_single_chunk_speech_writes_unit_directly() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 100);
        let job = UnitJob::new(UnitId(5), THREE_PARAGRAPHS);

        let report = runner.run_speech(&job, &ShoutAudio(Shout::new())).await;

        assert_eq!(report.status, UnitStatus::Done);
        assert!(!store.part_exists(UnitId(5), 1));
        assert_eq!(store.write_count(), 1);
        assert_eq!(
            store.read_unit(UnitId(5)).unwrap(),
            b"FIRST.\n\nSECOND.\n\nTHIRD."
        );
    }

    #[tokio::test]
    async fn test_speech_job_skips_done_units() {
        let (_clock, caller) = caller();
        let store = MemoryStore::new();
        store.write_unit(UnitId(1), b"old audio").unwrap();
        let runner = runner(&caller, &store, 8);
        let jobs = vec![
            UnitJob::new(UnitId(1), THREE_PARAGRAPHS),
            UnitJob::new(UnitId(2), THREE_PARAGRAPHS),
        ];
        let call = ShoutAudio(Shout::new());

        let report = run_speech_job(&runner, &jobs, &call, |_| {}).await;

        assert_eq!(report.units[0].status, UnitStatus::AlreadyDone);
        assert_eq!(report.units[1].status, UnitStatus::Done);
        assert_eq!(call.0.calls(), 3);
        assert_eq!(store.read_unit(UnitId(1)).unwrap(), b"old audio");
    }

    #[tokio::test]
    async fn test_units_share_the_pacing_window() {
        let clock = Arc::new(ManualClock::new());
        let caller = PacedCaller::new(2, clock.clone());
        let store = MemoryStore::new();
        let runner = runner(&caller, &store, 8);
        let jobs = vec![
            UnitJob::new(UnitId(1), "One."),
            UnitJob::new(UnitId(2), "Two."),
            UnitJob::new(UnitId(3), "Three."),
        ];

        run_text_job(&runner, &jobs, &Shout::new(), FailurePolicy::KeepInput, |_| {}).await;

        assert_eq!(clock.now(), std::time::Duration::from_secs(60));
    }
}
