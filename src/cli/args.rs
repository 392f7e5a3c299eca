//! CLI argument definitions using clap.

use crate::core::config::{AttributeDef, AttributeType, BinaryFormat, Config};
use clap::Parser;
use std::path::PathBuf;

/// Parse a NAME:TYPE attribute pair.
fn parse_attr(s: &str) -> Result<AttributeDef, String> {
    let (name, type_str) = s
        .split_once(':')
        .ok_or_else(|| "expected NAME:TYPE".to_string())?;
    if name.is_empty() {
        return Err("attribute name may not be empty".into());
    }
    let kind = type_str
        .parse::<AttributeType>()
        .map_err(|e| e.to_string())?;
    Ok(AttributeDef {
        name: name.to_string(),
        kind,
    })
}

/// Content-based filtering sidecar for NATS.
///
/// Flags override config-file values. `--generate-schema` switches to a
/// one-shot mode that infers an `attributes:` block from a sample
/// payload and exits.
#[derive(Parser)]
#[command(name = "sieve")]
#[command(version)]
#[command(about = "Content-based filtering sidecar for NATS")]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// NATS server address
    #[arg(short, long)]
    pub address: Option<String>,

    /// NATS server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Input NATS subject
    #[arg(short = 'i', long)]
    pub input_subject: Option<String>,

    /// Binary format (msgpack|cbor|flexbuffers|json)
    #[arg(short, long)]
    pub format: Option<BinaryFormat>,

    /// Output subject prefix (defaults to the input subject)
    #[arg(long)]
    pub output_prefix: Option<String>,

    /// Input queue group for load balancing across sidecars
    #[arg(long)]
    pub queue_group: Option<String>,

    /// Subscription request subject
    #[arg(long)]
    pub subscribe_subject: Option<String>,

    /// Unsubscription request subject
    #[arg(long)]
    pub unsubscribe_subject: Option<String>,

    /// NATS KV lease bucket name
    #[arg(long)]
    pub lease_bucket: Option<String>,

    /// Lease TTL in seconds
    #[arg(long = "lease-ttl")]
    pub lease_ttl_seconds: Option<u32>,

    /// Lease check interval in seconds
    #[arg(long = "lease-check-interval")]
    pub lease_check_interval_seconds: Option<u32>,

    /// Attribute as NAME:TYPE (repeatable, appended to config attributes)
    #[arg(long = "attr", value_name = "NAME:TYPE", value_parser = parse_attr)]
    pub attributes: Vec<AttributeDef>,

    /// Worker thread count (0 = hardware concurrency)
    #[arg(long = "workers")]
    pub worker_threads: Option<usize>,

    /// TLS certificate path
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS key path
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// TLS CA certificate path
    #[arg(long)]
    pub tls_ca: Option<PathBuf>,

    /// Stats log interval in seconds
    #[arg(long = "stats-interval")]
    pub stats_interval_seconds: Option<u64>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Infer an attributes block from a sample payload file and exit
    #[arg(long, value_name = "PATH")]
    pub generate_schema: Option<PathBuf>,
}

impl Cli {
    /// Apply flag overrides on top of the loaded config. Flags win;
    /// `--attr` pairs are appended to config-defined attributes.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.nats_address = address.clone();
        }
        if let Some(port) = self.port {
            config.nats_port = port;
        }
        if let Some(subject) = &self.input_subject {
            config.input_subject = subject.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(prefix) = &self.output_prefix {
            config.output_prefix = prefix.clone();
        }
        if let Some(group) = &self.queue_group {
            config.input_queue_group = Some(group.clone());
        }
        if let Some(subject) = &self.subscribe_subject {
            config.subscribe_subject = subject.clone();
        }
        if let Some(subject) = &self.unsubscribe_subject {
            config.unsubscribe_subject = subject.clone();
        }
        if let Some(bucket) = &self.lease_bucket {
            config.lease_bucket = bucket.clone();
        }
        if let Some(ttl) = self.lease_ttl_seconds {
            config.lease_ttl_seconds = ttl;
        }
        if let Some(interval) = self.lease_check_interval_seconds {
            config.lease_check_interval_seconds = interval;
        }
        config.attributes.extend(self.attributes.iter().cloned());
        if let Some(workers) = self.worker_threads {
            config.worker_threads = workers;
        }
        if let Some(cert) = &self.tls_cert {
            config.tls_cert = Some(cert.clone());
        }
        if let Some(key) = &self.tls_key {
            config.tls_key = Some(key.clone());
        }
        if let Some(ca) = &self.tls_ca {
            config.tls_ca = Some(ca.clone());
        }
        if let Some(interval) = self.stats_interval_seconds {
            config.stats_interval_seconds = interval;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let cli = Cli::parse_from([
            "sieve",
            "-a",
            "nats.example",
            "-p",
            "4223",
            "-i",
            "flag.subject",
            "-f",
            "cbor",
            "--attr",
            "severity:int",
            "-v",
        ]);

        let mut config = Config {
            input_subject: "file.subject".to_string(),
            ..Config::default()
        };
        cli.apply_to(&mut config);

        assert_eq!(config.nats_address, "nats.example");
        assert_eq!(config.nats_port, 4223);
        assert_eq!(config.input_subject, "flag.subject");
        assert_eq!(config.format, BinaryFormat::Cbor);
        assert_eq!(config.attributes.len(), 1);
        assert_eq!(config.attributes[0].name, "severity");
        assert_eq!(config.attributes[0].kind, AttributeType::Integer);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn attrs_append_to_config_attributes() {
        let cli = Cli::parse_from(["sieve", "--attr", "location:string"]);
        let mut config = Config {
            attributes: vec![AttributeDef {
                name: "severity".to_string(),
                kind: AttributeType::Integer,
            }],
            ..Config::default()
        };
        cli.apply_to(&mut config);
        assert_eq!(config.attributes.len(), 2);
        assert_eq!(config.attributes[1].name, "location");
    }

    #[test]
    fn attr_parser_rejects_bad_shapes() {
        assert!(parse_attr("severity:int").is_ok());
        assert!(parse_attr("noseparator").is_err());
        assert!(parse_attr(":int").is_err());
        assert!(parse_attr("severity:nonsense").is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
