//! `queuectl` — a durable, single-host job queue.
//!
//! This binary is the external collaborator the core crates are agnostic
//! to: argument parsing, the metrics HTTP server, daemonization and
//! logging all live here, wired over `queuectl-core`/`-store`/`-executor`/
//! `-worker`.

mod cli;
mod commands;
mod metrics;

use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    let exit_code = match commands::run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}
