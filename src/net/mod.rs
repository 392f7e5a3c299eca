//! NATS connection setup: server address, optional mTLS material, and
//! connection event logging.

use crate::core::config::Config;
use anyhow::{Context, Result};
use async_nats::{Client, ConnectOptions, Event};
use tracing::{debug, info, warn};

pub async fn connect(config: &Config) -> Result<Client> {
    let url = format!("nats://{}:{}", config.nats_address, config.nats_port);

    let mut options = ConnectOptions::new().event_callback(|event| async move {
        match event {
            Event::Connected => info!("connected to NATS"),
            Event::Disconnected => warn!("disconnected from NATS"),
            other => debug!(event = %other, "NATS client event"),
        }
    });

    if let Some(ca) = &config.tls_ca {
        options = options.add_root_certificates(ca.clone());
    }
    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        options = options
            .add_client_certificate(cert.clone(), key.clone())
            .require_tls(true);
    }

    options
        .connect(url.as_str())
        .await
        .with_context(|| format!("cannot connect to NATS at {url}"))
}
