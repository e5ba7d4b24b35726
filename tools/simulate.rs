/// Simulate — run the coaching engine and write the conversation log.
///
/// Usage: simulate [--config run.ron] [--seed N] [--weeks N] [--output-dir out]
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use coaching_engine::core::config::{NlgMode, NlgProvider, RunConfig};
use coaching_engine::core::pipeline::CoachingEngine;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    None,
    Ollama,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Off,
    Paraphrase,
    Full,
}

#[derive(Parser)]
#[command(name = "simulate")]
#[command(about = "Simulate a multi-week coaching conversation")]
#[command(version)]
struct Cli {
    /// Run config (RON). Every field is optional.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, allow_negative_numbers = true)]
    weeks: Option<i64>,

    /// Start date, YYYY-MM-DD
    #[arg(long)]
    start: Option<String>,

    /// Display timezone as a UTC offset, e.g. +08:00
    #[arg(long)]
    tz: Option<String>,

    #[arg(short, long, default_value = "out")]
    output_dir: PathBuf,

    /// Variation pools merged over the defaults
    #[arg(long)]
    pools: Option<PathBuf>,

    /// Voices merged over the defaults
    #[arg(long)]
    voices: Option<PathBuf>,

    #[arg(long, value_enum)]
    nlg_provider: Option<ProviderArg>,

    #[arg(long, value_enum)]
    nlg_mode: Option<ModeArg>,

    #[arg(long)]
    llm_model: Option<String>,

    /// Log per-week detail
    #[arg(long)]
    debug: bool,
}

fn load_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load_from_ron(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(start) = &cli.start {
        config.start_date = start.clone();
    }
    if let Some(tz) = &cli.tz {
        config.timezone = tz.clone();
    }
    if let Some(provider) = cli.nlg_provider {
        config.nlg.provider = match provider {
            ProviderArg::None => NlgProvider::None,
            ProviderArg::Ollama => NlgProvider::Ollama,
        };
    }
    if let Some(mode) = cli.nlg_mode {
        config.nlg.mode = match mode {
            ModeArg::Off => NlgMode::Off,
            ModeArg::Paraphrase => NlgMode::Paraphrase,
            ModeArg::Full => NlgMode::Full,
        };
    }
    if let Some(model) = &cli.llm_model {
        config.nlg.model = model.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    if config.nlg.enabled() {
        info!(
            model = %config.nlg.model,
            host = %config.nlg.host,
            mode = ?config.nlg.mode,
            "polishing through collaborator"
        );
    }

    let mut builder = CoachingEngine::builder().with_config(config);
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if let Some(weeks) = cli.weeks {
        builder = builder.weeks(weeks);
    }
    if let Some(path) = &cli.pools {
        builder = builder.pools_file(path);
    }
    if let Some(path) = &cli.voices {
        builder = builder.voices_file(path);
    }
    let mut engine = builder.build().context("invalid run configuration")?;

    let output = engine.run()?;
    for issue in output.validate() {
        warn!(check = issue.check, "{}", issue.message);
    }

    let (jsonl, transcript) = output
        .write_to(&cli.output_dir)
        .with_context(|| format!("writing to {}", cli.output_dir.display()))?;
    info!(
        messages = output.messages.len(),
        jsonl = %jsonl.display(),
        transcript = %transcript.display(),
        "wrote conversation"
    );
    Ok(())
}
