//! Soft-state lease reconciliation.
//!
//! Clients install and refresh their own leases in a JetStream KV
//! bucket keyed `<id>.<client_id>`; the bucket's server-side TTL is the
//! only expiry mechanism. The sidecar never writes to the bucket - it
//! watches for deletions and drops the corresponding lease holder.

use crate::matching::manager::SubscriptionManager;
use anyhow::{Context, Result};
use async_nats::jetstream;
use async_nats::jetstream::kv::Operation;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Compose a lease key. The value stored under it is opaque; presence
/// means "alive".
pub fn make_lease_key(id: u64, client_id: &str) -> String {
    format!("{id}.{client_id}")
}

/// Split a lease key at its first `.` into `(subscription_id,
/// client_id)`. Keys without that exact shape are rejected.
pub fn parse_lease_key(key: &str) -> Option<(u64, &str)> {
    let (id_part, client_id) = key.split_once('.')?;
    if id_part.is_empty() || client_id.is_empty() {
        return None;
    }
    let id = id_part.parse::<u64>().ok()?;
    Some((id, client_id))
}

/// Watches the lease bucket and reconciles expirations with the
/// subscription manager.
pub struct LeaseManager {
    bucket: String,
    manager: Arc<SubscriptionManager>,
}

impl LeaseManager {
    pub fn new(bucket: &str, manager: Arc<SubscriptionManager>) -> Self {
        Self {
            bucket: bucket.to_string(),
            manager,
        }
    }

    /// Open a watch over the entire bucket and spawn the reconcile
    /// task. An error here leaves the sidecar running without
    /// soft-state cleanup; the caller decides how loudly to say so.
    pub async fn start(&self, client: &async_nats::Client) -> Result<JoinHandle<()>> {
        let js = jetstream::new(client.clone());
        let store = js
            .get_key_value(&self.bucket)
            .await
            .with_context(|| format!("cannot open lease bucket {}", self.bucket))?;
        let mut watcher = store
            .watch_all()
            .await
            .with_context(|| format!("cannot watch lease bucket {}", self.bucket))?;
        info!(bucket = %self.bucket, "watching lease bucket");

        let manager = Arc::clone(&self.manager);
        let bucket = self.bucket.clone();
        Ok(tokio::spawn(async move {
            while let Some(entry) = watcher.next().await {
                match entry {
                    Ok(entry) => on_lease_event(&manager, &entry.key, entry.operation),
                    Err(err) => warn!(%bucket, error = %err, "lease watch error"),
                }
            }
            debug!(%bucket, "lease watch ended");
        }))
    }
}

/// Apply one KV entry to the subscription set. Puts are informational
/// (the client installed or refreshed a lease); deletes and purges mean
/// the lease is gone.
pub fn on_lease_event(manager: &SubscriptionManager, key: &str, operation: Operation) {
    match operation {
        Operation::Put => {
            debug!(key, "lease installed or refreshed");
        }
        Operation::Delete | Operation::Purge => {
            let Some((id, client_id)) = parse_lease_key(key) else {
                warn!(key, "ignoring malformed lease key");
                return;
            };
            info!(id, client = client_id, "lease expired or dropped");
            if manager.remove_lease(id, client_id) {
                info!(id, "subscription fully removed, no active leases");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AttributeDef, AttributeType};

    #[test]
    fn lease_key_round_trips() {
        for (id, client) in [
            (1u64, "client-a"),
            (7, "client-x"),
            (u64::MAX, "c"),
            (42, "dotted.client.id"),
        ] {
            let key = make_lease_key(id, client);
            assert_eq!(parse_lease_key(&key), Some((id, client)));
        }
    }

    #[test]
    fn malformed_lease_keys_are_rejected() {
        for key in ["", "noperiod", ".leading", "trailing.", "notanumber.client"] {
            assert_eq!(parse_lease_key(key), None, "key {key:?}");
        }
    }

    #[test]
    fn delete_event_removes_the_lease() {
        let attributes = vec![AttributeDef {
            name: "severity".to_string(),
            kind: AttributeType::Integer,
        }];
        let manager = SubscriptionManager::new(&attributes, "out").unwrap();
        let id = manager.subscribe("severity = 5", "client-x").unwrap();

        on_lease_event(&manager, &make_lease_key(id, "client-x"), Operation::Delete);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn put_and_malformed_events_are_ignored() {
        let attributes = vec![AttributeDef {
            name: "severity".to_string(),
            kind: AttributeType::Integer,
        }];
        let manager = SubscriptionManager::new(&attributes, "out").unwrap();
        let id = manager.subscribe("severity = 5", "client-x").unwrap();

        on_lease_event(&manager, &make_lease_key(id, "client-x"), Operation::Put);
        assert_eq!(manager.active_count(), 1);

        on_lease_event(&manager, "garbage-key", Operation::Delete);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn purge_of_one_lease_keeps_other_holders() {
        let attributes = vec![AttributeDef {
            name: "severity".to_string(),
            kind: AttributeType::Integer,
        }];
        let manager = SubscriptionManager::new(&attributes, "out").unwrap();
        let id = manager.subscribe("severity = 5", "c1").unwrap();
        manager.subscribe("severity = 5", "c2").unwrap();

        on_lease_event(&manager, &make_lease_key(id, "c1"), Operation::Purge);
        assert_eq!(manager.active_count(), 1);
        assert_eq!(
            manager.get_subscription(id).unwrap().lease_holders.len(),
            1
        );
    }
}
