#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a scripted evacuation session headlessly.

mod config;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::SessionConfig;
use session::Session;

#[derive(Debug, Parser)]
#[command(name = "evacuation", version, about = "Headless evacuation alert session")]
struct Cli {
    /// TOML file with [clock], [visual], [audio], [gate] and [session] sections.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulated frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Print the countdown every this many seconds. Zero disables it.
    #[arg(long, default_value_t = 30)]
    report_every: u64,
    /// Upper bound on simulated frames.
    #[arg(long, default_value_t = 100_000)]
    max_frames: u64,
    /// Tracing filter directive, overriding `RUST_LOG`.
    #[arg(long)]
    log_filter: Option<String>,
}

/// Entry point for the evacuation command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref())?;

    let config = SessionConfig::load(cli.config.as_deref())?;
    let session = Session::new(&config).context("failed to set up session")?;

    let summary = session.run(cli.fps, cli.max_frames, cli.report_every, |report| {
        println!(
            "{} {:<5} player_x={:>7.2} gate={}",
            report.time,
            report.level,
            report.player_x,
            if report.gate_open { "open" } else { "closed" }
        );
    });

    println!(
        "outcome={:?} frames={} blocked_frames={} fades={} clip={} player_x={:.2}",
        summary.outcome,
        summary.frames,
        summary.blocked_frames,
        summary.fades,
        summary.final_clip.as_deref().unwrap_or("-"),
        summary.player_x
    );
    Ok(())
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
    Ok(())
}
