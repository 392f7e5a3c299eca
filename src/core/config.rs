use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SUBSCRIBE_SUBJECT_DEFAULT: &str = "sieve.subscribe";
const UNSUBSCRIBE_SUBJECT_DEFAULT: &str = "sieve.unsubscribe";
const LEASE_BUCKET_DEFAULT: &str = "sieve-leases";

/// Attribute value types understood by the expression engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "double")]
    Float,
    #[serde(alias = "str")]
    String,
    StringList,
    #[serde(alias = "int_list")]
    IntegerList,
}

impl AttributeType {
    /// Canonical spelling, as accepted in config files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::StringList => "string_list",
            Self::IntegerList => "integer_list",
        }
    }
}

impl FromStr for AttributeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" | "bool" => Ok(Self::Boolean),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "double" => Ok(Self::Float),
            "string" | "str" => Ok(Self::String),
            "string_list" => Ok(Self::StringList),
            "integer_list" | "int_list" => Ok(Self::IntegerList),
            other => bail!("invalid attribute type {}", other),
        }
    }
}

/// One declared attribute of the record schema.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

/// Binary serialization formats accepted on the input subject.
///
/// The root of every payload must be a map of string-keyed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryFormat {
    #[default]
    MsgPack,
    Cbor,
    FlexBuffers,
    Json,
}

impl BinaryFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::MsgPack => "msgpack",
            Self::Cbor => "cbor",
            Self::FlexBuffers => "flexbuffers",
            Self::Json => "json",
        }
    }
}

impl FromStr for BinaryFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msgpack" => Ok(Self::MsgPack),
            "cbor" => Ok(Self::Cbor),
            "flexbuffers" => Ok(Self::FlexBuffers),
            "json" => Ok(Self::Json),
            other => bail!("invalid format {}", other),
        }
    }
}

/// Top-level configuration for the sidecar.
///
/// Every field has a default except `input_subject` and `attributes`,
/// which must be supplied via the config file or flags; `validate`
/// enforces both after the flag merge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nats_address: String,
    pub nats_port: u16,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub tls_ca: Option<PathBuf>,

    /// Inbound data subject (required).
    pub input_subject: String,
    pub format: BinaryFormat,
    /// Optional queue group for load-balancing across sidecars.
    pub input_queue_group: Option<String>,

    /// Matched messages go to `<output_prefix>.<id>`. Empty means
    /// "same as input_subject".
    pub output_prefix: String,

    pub subscribe_subject: String,
    pub unsubscribe_subject: String,

    pub lease_bucket: String,
    pub lease_ttl_seconds: u32,
    pub lease_check_interval_seconds: u32,

    /// Attribute schema (required, non-empty).
    pub attributes: Vec<AttributeDef>,

    /// Worker thread count; 0 means hardware concurrency.
    pub worker_threads: usize,

    pub stats_interval_seconds: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nats_address: "127.0.0.1".to_string(),
            nats_port: 4222,
            tls_cert: None,
            tls_key: None,
            tls_ca: None,
            input_subject: String::new(),
            format: BinaryFormat::default(),
            input_queue_group: None,
            output_prefix: String::new(),
            subscribe_subject: SUBSCRIBE_SUBJECT_DEFAULT.to_string(),
            unsubscribe_subject: UNSUBSCRIBE_SUBJECT_DEFAULT.to_string(),
            lease_bucket: LEASE_BUCKET_DEFAULT.to_string(),
            lease_ttl_seconds: 3600,
            lease_check_interval_seconds: 60,
            attributes: Vec::new(),
            worker_threads: 0,
            stats_interval_seconds: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        serde_yaml::from_str(&data)
            .with_context(|| format!("invalid YAML config {}", path_ref.display()))
    }

    /// Fill in defaults that depend on other fields. Called once after
    /// the flag merge.
    pub fn resolve_defaults(&mut self) {
        if self.output_prefix.is_empty() {
            self.output_prefix = self.input_subject.clone();
        }
    }

    /// Validate schema-level invariants before startup.
    pub fn validate(&self) -> Result<()> {
        if self.input_subject.is_empty() {
            bail!("input_subject is required (via config file or --input-subject)");
        }
        if self.attributes.is_empty() {
            bail!("at least one attribute is required (via config file or --attr)");
        }
        let mut seen = HashSet::new();
        for attr in &self.attributes {
            if attr.name.is_empty() {
                bail!("attribute names must be non-empty");
            }
            if !seen.insert(attr.name.as_str()) {
                bail!("duplicate attribute {}", attr.name);
            }
        }
        Ok(())
    }

    /// Worker count after resolving 0 to the machine's parallelism.
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }
}
