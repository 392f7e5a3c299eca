#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

//! Sieve - unified CLI entrypoint.
//!
//! Usage:
//!   sieve -c config/sieve.yaml
//!   sieve -i sensors.raw --attr temperature:float --attr location:string
//!   sieve --generate-schema sample.bin -f msgpack

use anyhow::Result;
use clap::Parser;
use sieve::cli::commands::{run_generate_schema, run_start};
use sieve::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Schema generation mode: decode one sample and print an
    // attributes block, no config or broker required.
    if let Some(sample) = &cli.generate_schema {
        return run_generate_schema(sample, cli.format.unwrap_or_default());
    }

    run_start(&cli).await
}
