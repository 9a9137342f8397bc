use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use clouds_pipeline::logging::console_dispatch;
use clouds_pipeline::store::store_from_endpoint;
use predict_app::{App, get_config};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "predict_app")]
#[command(about = "Predict the cloud class with a published model")]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let console = console_dispatch();
    let _guard = tracing::dispatcher::set_default(&console);

    let config = get_config(&args.config)
        .with_context(|| format!("no usable configuration at {}", args.config.display()))?;
    let endpoint = config.aws.endpoint().context("aws.endpoint is required")?;
    let store = store_from_endpoint(endpoint).context("opening the object store")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    App::new(stdin.lock(), stdout.lock(), store.as_ref(), &config.aws).run()?;
    Ok(())
}
