//! Start command - load the config, merge flags, and run the sidecar.

use crate::cli::Cli;
use crate::core::config::Config;
use crate::core::runtime::Runtime;
use crate::telemetry;
use anyhow::Result;

pub async fn run_start(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    cli.apply_to(&mut config);
    config.resolve_defaults();

    telemetry::init_tracing(&config.log_level)?;

    let runtime = Runtime::new(config)?;
    runtime.run().await
}
