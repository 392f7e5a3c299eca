//! Schema inference for the `--generate-schema` mode: read one sample
//! payload and print an `attributes:` block ready to paste into a config
//! file. Shares the decoders with the matching pipeline but is otherwise
//! independent of it.

use crate::bridge::decode::{decode_map, Value};
use crate::core::config::BinaryFormat;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Infer an `attributes:` YAML block from a sample payload file.
pub fn generate_schema(path: &Path, format: BinaryFormat) -> Result<String> {
    let payload =
        std::fs::read(path).with_context(|| format!("cannot read sample {}", path.display()))?;
    let fields = decode_map(format, &payload)
        .with_context(|| format!("cannot decode sample as {}", format.name()))?;
    Ok(render_attributes(&fields))
}

fn infer_type(key: &str, value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "float",
        Value::Str(_) => "string",
        Value::Array(items) => match items.first() {
            Some(Value::Int(_)) => "integer_list",
            _ => "string_list",
        },
        Value::Other => {
            warn!(field = key, "null or unknown field, defaulting to string");
            "string"
        }
    }
}

fn render_attributes(fields: &[(String, Value)]) -> String {
    let mut out = String::from("attributes:\n");
    for (key, value) in fields {
        out.push_str(&format!(
            "  - name: {key}\n    type: {}\n",
            infer_type(key, value)
        ));
    }
    out
}
