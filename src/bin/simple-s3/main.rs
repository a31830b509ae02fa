// simple-s3 - bucket and object operations for S3 compatible storage

mod cli;
mod commands;

use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use simple_s3::{SimpleS3, SimpleS3Config};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,simple_s3={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration; a missing default file falls back to the SDK defaults
fn load_config(cli: &Cli) -> Result<SimpleS3Config> {
    let path = SimpleS3Config::resolve_path(cli.config.as_deref())?;

    let mut config = if path.exists() {
        SimpleS3Config::load(&path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?
    } else if cli.config.is_some() {
        return Err(anyhow!("Config file not found: {}", path.display()));
    } else {
        SimpleS3Config::default()
    };

    if cli.timeout.is_some() {
        config.operation_timeout = cli.timeout;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let client = SimpleS3::connect(config)
        .await
        .context("Failed to create S3 client")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let ctx = client.context_with(cancel);
    commands::execute(&cli.command, &client, &ctx).await
}
