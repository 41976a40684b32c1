//! genwg - WireGuard relay configuration generator
//!
//! Reads a document describing relays and their peers and writes a bundle of
//! wg-quick configs, udp2raw hooks, BIND zones and a state snapshot.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genwg::crypto::{KeyProvider, WgTool, X25519Keys};
use genwg::error::Error;
use genwg::model::ConsistencyPolicy;
use genwg::pipeline::{self, DEFAULT_OUTPUT_DIR};

/// genwg - WireGuard relay configuration generator
#[derive(Parser)]
#[command(name = "genwg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the input document (.yml/.yaml, or .toml)
    #[arg(short, long)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Output directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Write into an existing output directory
    #[arg(long)]
    force: bool,

    /// Downgrade recoverable consistency findings to warnings
    #[arg(long)]
    lenient: bool,

    /// Generate keys with the external `wg` tool instead of in-process
    #[arg(long)]
    wg_tool: bool,

    /// Validate and resolve only, write nothing
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(if cli.debug { "debug" } else { "info" });

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let keys: Box<dyn KeyProvider> = if cli.wg_tool {
        Box::new(WgTool::default())
    } else {
        Box::new(X25519Keys)
    };
    let policy = if cli.lenient {
        ConsistencyPolicy::Lenient
    } else {
        ConsistencyPolicy::Strict
    };

    let resolved = pipeline::resolve(&cli.config, keys.as_ref(), policy)?;
    let artifacts = pipeline::bundle(&resolved, &chrono::Local::now())?;

    if cli.check {
        println!("✓ Configuration is valid");
        println!("  Servers: {}", resolved.model.relays.len());
        println!("  Clients: {}", resolved.model.peer_count());
        println!("  Files:   {}", artifacts.len());
        return Ok(());
    }

    pipeline::write_bundle(&cli.output, &artifacts, cli.force)
        .with_context(|| format!("Failed to write bundle to {}", cli.output.display()))?;
    println!("✓ Wrote {} file(s) to {}", artifacts.len(), cli.output.display());
    Ok(())
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            eprintln!("✗ {} error: {:#}", e.category(), err);
            for finding in e.findings() {
                eprintln!("  {}", finding);
            }
        }
        None => eprintln!("✗ {:#}", err),
    }
}
