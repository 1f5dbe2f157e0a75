//! bookpipe - clean, translate, summarize and narrate book chapters

use anyhow::{Context, Result};
use bookpipe::chapters::{self, ChapterSelection};
use bookpipe::stages::{CleanupCall, SpeechCall, SummaryCall, TranslateCall};
use bookpipe::{
    run_speech_job, run_text_job, ChunkCall, ChunkJobRunner, FsStore, JobReport, PacedCaller,
    PipelineConfig, Stage, UnitJob, UnitReport,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use llm_client::LlmProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name under which llm-client looks up this program's default preset.
const PROGRAM_NAME: &str = "bookpipe";

#[derive(Parser, Debug)]
#[command(name = "bookpipe")]
#[command(about = "Clean, translate, summarize and narrate book chapters with resumable, rate-limited calls", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the config file (default: ~/.config/cli-programs/bookpipe.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fix extraction artifacts and add Markdown (chapter_NN.txt)
    Clean(StageArgs),
    /// Translate chapters (chapter_NN.txt -> chapter_NN_cn.md)
    Translate(StageArgs),
    /// Summarize translated chapters (chapter_NN_cn.md -> chapter_NN_summary.txt)
    Summarize(StageArgs),
    /// Narrate translated chapters (chapter_NN_cn.md -> chapter_NN_full.mp3)
    Speak(StageArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct StageArgs {
    /// Directory containing the input chapter files
    input_dir: PathBuf,

    /// Directory to write results to
    output_dir: PathBuf,

    /// Chapters to process (e.g. "1-5" or "1,3,5")
    #[arg(long)]
    chapters: Option<ChapterSelection>,

    /// Process at most N chapters
    #[arg(long)]
    max: Option<usize>,

    /// llm-client model preset for text stages
    #[arg(short, long)]
    model: Option<String>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => PipelineConfig::config_path()?,
    };

    match args.command {
        Commands::Config { action } => handle_config_command(&action, &config_path),
        Commands::Clean(stage_args) => run_stage(Stage::Clean, stage_args, &config_path, args.debug).await,
        Commands::Translate(stage_args) => {
            run_stage(Stage::Translate, stage_args, &config_path, args.debug).await
        }
        Commands::Summarize(stage_args) => {
            run_stage(Stage::Summarize, stage_args, &config_path, args.debug).await
        }
        Commands::Speak(stage_args) => run_stage(Stage::Speak, stage_args, &config_path, args.debug).await,
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Load the config file, then apply environment overrides and validate.
fn load_config(path: &Path) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_from(path).context("Failed to load configuration")?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn handle_config_command(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            PipelineConfig::default().save_to(path)?;
            eprintln!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

async fn run_stage(stage: Stage, args: StageArgs, config_path: &Path, debug: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let selection = args.chapters.clone().unwrap_or_default();
    let files = chapters::discover(&args.input_dir, stage.input_suffix())?;
    let files = chapters::select(files, &selection, args.max);
    if files.is_empty() {
        anyhow::bail!(
            "No chapter_NN*{} files selected in {}",
            stage.input_suffix(),
            args.input_dir.display()
        );
    }
    eprintln!("{}: {} chapter(s) from {}", stage.name(), files.len(), args.input_dir.display());

    let jobs = files
        .iter()
        .map(|file| Ok(stage.prepare_job(file.id, &file.read()?, config.summary_input_chars)))
        .collect::<Result<Vec<UnitJob>>>()?;

    let store = FsStore::new(&args.output_dir, stage.layout(&config.speech.extension));
    let caller = PacedCaller::realtime(config.calls_per_minute(stage)).with_backoff_base(config.backoff_base);
    let runner = ChunkJobRunner::new(
        &caller,
        &store,
        config.segment_options(stage),
        config.max_attempts,
    );

    let pb = progress_bar(jobs.len(), debug);
    let on_unit = |report: &UnitReport| {
        pb.inc(1);
        pb.set_message(format!("{} {:?}", report.unit, report.status));
    };

    let report = if stage == Stage::Speak {
        let call = speech_call(&config)?;
        run_speech_job(&runner, &jobs, &call, on_unit).await
    } else {
        let call = text_call(stage, args.model.as_deref(), &config)?;
        run_text_job(
            &runner,
            &jobs,
            call.as_ref(),
            config.failure_policy(stage),
            on_unit,
        )
        .await
    };
    pb.finish_and_clear();

    print_report(&report);
    if let Some(path) = &args.report {
        report
            .save(path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        eprintln!("Report: {}", path.display());
    }
    eprintln!("Output: {}", store.root().display());

    if report.unfinished() > 0 {
        anyhow::bail!(
            "{} chapter(s) unfinished. Run the same command again to resume.",
            report.unfinished()
        );
    }
    Ok(())
}

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn text_provider(
    stage: Stage,
    model: Option<&str>,
    config: &PipelineConfig,
) -> Result<Arc<dyn LlmProvider>> {
    let llm_config = llm_client::Config::load().context("Failed to load llm-client configuration")?;
    let preset_name = model
        .or(config.model_preset(stage))
        .unwrap_or_else(|| llm_config.get_default_for_program(PROGRAM_NAME));
    let preset = llm_config
        .get_preset(preset_name)
        .with_context(|| format!("Unknown preset: {}", preset_name))?;
    let provider = llm_client::get_provider(preset, llm_config.get_provider_config(&preset.provider))
        .with_context(|| {
            format!(
                "Failed to initialize provider '{}' for preset '{}'",
                preset.provider, preset_name
            )
        })?;

    log::info!("Using {} model {}", provider.name(), preset.model);
    Ok(Arc::from(provider))
}

fn text_call(
    stage: Stage,
    model: Option<&str>,
    config: &PipelineConfig,
) -> Result<Box<dyn ChunkCall<Output = String>>> {
    let provider = text_provider(stage, model, config)?;
    let sampling = config.sampling(stage);

    let call: Box<dyn ChunkCall<Output = String>> = match stage {
        Stage::Clean => Box::new(CleanupCall::new(provider, sampling)),
        Stage::Translate => Box::new(TranslateCall::new(provider, sampling, &config.target_language)),
        Stage::Summarize => Box::new(SummaryCall::new(provider, sampling, &config.target_language)),
        Stage::Speak => anyhow::bail!("speak is not a text stage"),
    };
    Ok(call)
}

fn speech_call(config: &PipelineConfig) -> Result<SpeechCall> {
    let llm_config = llm_client::Config::load().context("Failed to load llm-client configuration")?;
    let speech = &config.speech;
    let provider = llm_client::get_speech_provider(
        &speech.provider,
        &speech.model,
        &speech.voice,
        llm_config.get_provider_config(&speech.provider),
    )
    .with_context(|| format!("Failed to initialize speech provider '{}'", speech.provider))?;

    log::info!(
        "Using {} speech model {}, voice {}, {}/min",
        provider.name(),
        speech.model,
        speech.voice,
        config.speech_calls_per_minute
    );
    Ok(SpeechCall::new(Arc::from(provider)))
}

fn print_report(report: &JobReport) {
    for unit in &report.units {
        if unit.status.is_complete() {
            continue;
        }
        let chunks: Vec<String> = unit.failures.iter().map(|f| f.index.to_string()).collect();
        match &unit.error {
            Some(error) => eprintln!("  {}: {:?} - {}", unit.unit, unit.status, error),
            None => eprintln!(
                "  {}: {:?} (failed chunks: {})",
                unit.unit,
                unit.status,
                chunks.join(", ")
            ),
        }
    }
    eprintln!("{}", report.summary());
}
