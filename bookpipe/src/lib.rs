//! bookpipe - run book chapters through a rate-limited generation service.
//!
//! Chapters are segmented into bounded chunks, each chunk is sent through a
//! shared [`pacing::PacedCaller`], and results are persisted so an interrupted
//! run resumes where it stopped.

pub mod chapters;
pub mod config;
pub mod pacing;
pub mod runner;
pub mod stages;
pub mod store;
pub mod text;

pub use config::{ConfigError, PipelineConfig};
pub use pacing::{CallOutcome, PacedCaller};
pub use runner::{
    run_speech_job, run_text_job, ChunkCall, ChunkJobRunner, FailurePolicy, JobReport, UnitJob,
    UnitReport, UnitStatus,
};
pub use stages::Stage;
pub use store::{ArtifactLayout, ArtifactStore, FsStore, MemoryStore, StoreError, UnitId};
pub use text::{segment, Chunk};
