//! exercise-sandbox worker
//!
//! One-shot evaluation worker spawned by the process backend. Reads one
//! framed request from stdin, writes one framed response to stdout, exits.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use exercise_sandbox::worker;

#[derive(Parser, Debug)]
#[command(name = "exercise-sandbox-worker")]
#[command(about = "One-shot evaluation worker for exercise-sandbox")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for the protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(pid = std::process::id(), "Worker started");

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    worker::serve_one(&mut stdin, &mut stdout)
        .await
        .context("Failed to serve request")?;

    Ok(())
}
