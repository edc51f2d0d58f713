//! churnbench - allocator churn comparison
//!
//! Runs the scripted churn workload against every allocation strategy and
//! prints per-phase timings. Exits with an error if any strategy's
//! checksum differs from the plain `Box` reference.
//!
//! # Examples
//!
//! ```bash
//! # Default run: one million items, seed 1234
//! churnbench
//!
//! # Smaller run with custom block sizes, JSON output
//! churnbench --count 100000 --config alloc.toml --format json
//! ```

use anyhow::{bail, Context};
use churnpool::workload::{all_targets, run_churn, ChurnReport, DEFAULT_COUNT, DEFAULT_SEED, PHASES};
use churnpool::AllocConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compare pooled allocators under a churn workload
#[derive(Parser, Debug)]
#[command(name = "churnbench")]
#[command(version = churnpool::VERSION)]
#[command(about = "Compare pooled allocators under a churn workload", long_about = None)]
struct Cli {
    /// Number of items
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT)]
    count: usize,

    /// Seed of the random operation sequence
    #[arg(short, long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// TOML file with pool and slab settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli);

    let config = match &cli.config {
        Some(path) => AllocConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AllocConfig::default(),
    };
    info!(count = cli.count, seed = cli.seed, ?config, "Starting churn benchmark");

    let mut reports = Vec::new();
    for mut target in all_targets(cli.count, &config)? {
        reports.push(run_churn(target.as_mut(), cli.count, cli.seed));
    }

    match cli.format {
        OutputFormat::Table => print!("{}", render_table(&reports)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    check_checksums(&reports)
}

/// Setup console logging on stderr, keeping stdout for results
fn setup_logging(cli: &Cli) {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();
}

/// Markdown table: one row per phase, one column per target
fn render_table(reports: &[ChurnReport]) -> String {
    let mut out = String::new();

    out.push_str(&format!("| {:<20} |", "phase"));
    for report in reports {
        out.push_str(&format!(" {:>12} |", report.label));
    }
    out.push('\n');

    out.push_str(&format!("| {} |", "-".repeat(20)));
    for _ in reports {
        out.push_str(&format!(" {}: |", "-".repeat(11)));
    }
    out.push('\n');

    for (phase, name) in PHASES.iter().enumerate() {
        out.push_str(&format!("| {:<20} |", name));
        for report in reports {
            out.push_str(&format!(" {:>10}ms |", report.phases[phase].as_millis()));
        }
        out.push('\n');
    }

    out.push_str(&format!("| {:<20} |", "total"));
    for report in reports {
        out.push_str(&format!(" {:>10}ms |", report.total().as_millis()));
    }
    out.push('\n');
    out
}

fn check_checksums(reports: &[ChurnReport]) -> anyhow::Result<()> {
    let Some(reference) = reports.first() else {
        return Ok(());
    };

    let mismatched: Vec<_> = reports
        .iter()
        .filter(|report| report.checksum != reference.checksum)
        .collect();
    for report in &mismatched {
        error!(
            workload = %report.label,
            checksum = report.checksum,
            expected = reference.checksum,
            "Checksum mismatch"
        );
    }
    if !mismatched.is_empty() {
        bail!(
            "{} of {} targets disagree with the {} reference checksum {}",
            mismatched.len(),
            reports.len(),
            reference.label,
            reference.checksum
        );
    }

    info!(checksum = reference.checksum, "All checksums match");
    Ok(())
}
