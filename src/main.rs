use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pmtud::cli::Cli;
use pmtud::daemon;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to standard error; standard output carries only the
    // per-packet lines.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    daemon::run(&cli).with_context(|| format!("pmtud on {:?} failed", cli.iface))
}
