use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use clouds_pipeline::config::{Args, LoadedConfig};
use clouds_pipeline::logging::console_dispatch;
use clouds_pipeline::pipeline::{error_chain, run};

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout only until the run directory exists
    let console = console_dispatch();
    let _guard = tracing::dispatcher::set_default(&console);

    let loaded = LoadedConfig::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    info!("Configuration loaded from {}.", args.config.display());

    match run(&loaded) {
        Ok(summary) => {
            info!("Artifacts saved to {}.", summary.run_dir.display());
            if !summary.uploaded.is_empty() {
                info!("{} artifacts uploaded.", summary.uploaded.len());
            }
            Ok(())
        }
        Err(failure) => {
            error!("{}", error_chain(&failure));
            let code = failure.exit_code(loaded.config.run_config.exit_nonzero_on_failure);
            process::exit(code);
        }
    }
}
