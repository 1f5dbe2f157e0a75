//! Stage calls: the outbound operation each pipeline stage applies per chunk.

mod speech;
mod text;

pub use speech::SpeechCall;
pub use text::{summary_input, CleanupCall, Sampling, SummaryCall, TranslateCall};

use crate::chapters::split_title;
use crate::runner::{FailurePolicy, UnitJob};
use crate::store::{ArtifactLayout, UnitId};
use crate::text::clean_for_speech;

/// Pipeline stages that talk to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clean,
    Translate,
    Summarize,
    Speak,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Translate => "translate",
            Stage::Summarize => "summarize",
            Stage::Speak => "speak",
        }
    }

    /// Suffix shared by every input file of this stage, after `chapter_NN`.
    pub fn input_suffix(&self) -> &'static str {
        match self {
            Stage::Clean | Stage::Translate => ".txt",
            Stage::Summarize | Stage::Speak => "_cn.md",
        }
    }

    /// Naming of this stage's artifacts; `audio_extension` applies to speech only.
    pub fn layout(&self, audio_extension: &str) -> ArtifactLayout {
        match self {
            Stage::Clean => ArtifactLayout::text(".txt"),
            Stage::Translate => ArtifactLayout::text("_cn.md"),
            Stage::Summarize => ArtifactLayout::text("_summary.txt"),
            Stage::Speak => {
                let extension = format!(".{}", audio_extension.trim_start_matches('.'));
                ArtifactLayout::new(format!("_full{}", extension), extension)
            }
        }
    }

    /// Default handling of exhausted chunks for text stages.
    pub fn default_policy(&self) -> FailurePolicy {
        match self {
            Stage::Clean | Stage::Translate => FailurePolicy::KeepInput,
            Stage::Summarize | Stage::Speak => FailurePolicy::Abandon,
        }
    }

    /// Turn the contents of an input file into this stage's unit job.
    ///
    /// Summaries only see the first `summary_chars` chars; speech input is
    /// stripped of Markdown markers first.
    pub fn prepare_job(&self, id: UnitId, raw: &str, summary_chars: usize) -> UnitJob {
        match self {
            Stage::Clean | Stage::Translate => match split_title(raw) {
                (Some(title), body) => UnitJob::new(id, body).with_title(title),
                (None, body) => UnitJob::new(id, body),
            },
            Stage::Summarize => UnitJob::new(id, summary_input(raw, summary_chars)),
            Stage::Speak => UnitJob::new(id, clean_for_speech(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UnitId;

    #[test]
    fn test_stage_artifact_names() {
        let unit = UnitId(4);
        assert_eq!(Stage::Clean.layout("mp3").unit_file(unit), "chapter_04.txt");
        assert_eq!(Stage::Translate.layout("mp3").unit_file(unit), "chapter_04_cn.md");
        assert_eq!(
            Stage::Summarize.layout("mp3").unit_file(unit),
            "chapter_04_summary.txt"
        );

        let audio = Stage::Speak.layout("mp3");
        assert_eq!(audio.unit_file(unit), "chapter_04_full.mp3");
        assert_eq!(audio.part_file(unit, 2), "chapter_04_part02.mp3");
        assert_eq!(Stage::Speak.layout(".opus").part_file(unit, 1), "chapter_04_part01.opus");
    }

    #[test]
    fn test_stage_policies() {
        assert_eq!(Stage::Clean.default_policy(), FailurePolicy::KeepInput);
        assert_eq!(Stage::Summarize.default_policy(), FailurePolicy::Abandon);
        assert_eq!(Stage::Translate.default_policy(), FailurePolicy::KeepInput);
    }

    #[test]
    fn test_prepare_job_per_stage() {
        let raw = "# 第一章\n\n**重要**的内容。";
        let unit = UnitId(1);

        let job = Stage::Translate.prepare_job(unit, raw, 3000);
        assert_eq!(job.title.as_deref(), Some("# 第一章"));
        assert_eq!(job.text, "\n**重要**的内容。");

        let job = Stage::Speak.prepare_job(unit, raw, 3000);
        assert_eq!(job.title, None);
        assert_eq!(job.text, "第一章\n\n重要的内容。");

        let job = Stage::Summarize.prepare_job(unit, raw, 4);
        assert_eq!(job.text, "# 第一");
    }
}
