//! Schema generation mode - no config file or NATS connection needed.

use crate::bridge::infer::generate_schema;
use crate::core::config::BinaryFormat;
use anyhow::Result;
use std::path::Path;

pub fn run_generate_schema(sample: &Path, format: BinaryFormat) -> Result<()> {
    let block = generate_schema(sample, format)?;
    print!("{block}");
    Ok(())
}
