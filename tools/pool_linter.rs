/// Pool Linter — checks variation pools for anti-repetition and fact problems.
///
/// Usage: pool_linter [pools.ron] [--no-defaults]
use anyhow::{Context, Result};
use clap::Parser;
use coaching_engine::core::variety::{lint_pools, LintSeverity, PoolSet};
use std::path::PathBuf;
use std::process;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pool_linter")]
#[command(about = "Lint a variation-pool RON file")]
#[command(version)]
struct Cli {
    /// Pool file merged over the embedded defaults. Lints the defaults alone
    /// when omitted.
    path: Option<PathBuf>,

    /// Lint the file on its own, without the defaults.
    #[arg(long)]
    no_defaults: bool,

    #[arg(long)]
    debug: bool,
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

    let mut pools = if cli.no_defaults {
        PoolSet::default()
    } else {
        PoolSet::defaults().context("embedded default pools")?
    };
    if let Some(path) = &cli.path {
        let custom = PoolSet::load_from_ron(path)
            .with_context(|| format!("loading {}", path.display()))?;
        debug!(pools = custom.pools.len(), "loaded pool file");
        pools.merge(custom);
    }

    let variants: usize = pools.pools.values().map(|p| p.len()).sum();
    println!("Loaded {} pools, {} variants", pools.pools.len(), variants);

    let issues = lint_pools(&pools);

    println!("\n=== Pool Lint Report ===\n");
    if issues.is_empty() {
        println!("All checks passed!");
    }

    let mut errors = 0;
    let mut warnings = 0;
    for issue in &issues {
        let label = match issue.severity {
            LintSeverity::Error => {
                errors += 1;
                "ERROR"
            }
            LintSeverity::Warning => {
                warnings += 1;
                "WARNING"
            }
        };
        println!("{}: [{}] {}", label, issue.pool, issue.message);
    }

    println!("\nSummary: {} errors, {} warnings", errors, warnings);

    if errors > 0 {
        process::exit(1);
    }
    Ok(())
}
