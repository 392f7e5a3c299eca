//! Control-plane flows exercised through the public handler functions:
//! subscribe/unsubscribe request handling and lease-event reconciliation.

use async_nats::jetstream::kv::Operation;
use sieve::config::{AttributeDef, AttributeType, Config};
use sieve::control::{handle_subscribe, handle_unsubscribe, SubscribeReply, UnsubscribeReply};
use sieve::leases::on_lease_event;
use sieve::manager::SubscriptionManager;

fn fixture() -> (SubscriptionManager, Config) {
    let mut config = Config {
        input_subject: "sensors.raw".to_string(),
        output_prefix: "sensors.filtered".to_string(),
        lease_bucket: "sieve-leases".to_string(),
        attributes: vec![
            AttributeDef {
                name: "temperature".to_string(),
                kind: AttributeType::Float,
            },
            AttributeDef {
                name: "severity".to_string(),
                kind: AttributeType::Integer,
            },
        ],
        ..Config::default()
    };
    config.resolve_defaults();
    let manager = SubscriptionManager::new(&config.attributes, &config.output_prefix).unwrap();
    (manager, config)
}

fn subscribe(manager: &SubscriptionManager, config: &Config, expr: &str, client: &str) -> SubscribeReply {
    let payload = serde_json::json!({ "expression": expr, "client_id": client });
    let reply = handle_subscribe(manager, config, &serde_json::to_vec(&payload).unwrap());
    serde_json::from_slice(&reply).expect("subscribe reply")
}

#[test]
fn two_clients_share_one_subscription_with_distinct_leases() {
    let (manager, config) = fixture();

    let first = subscribe(&manager, &config, "temperature > 30.0", "c1");
    let second = subscribe(&manager, &config, "temperature > 30.0", "c2");

    assert_eq!(first.id, second.id);
    assert_eq!(first.topic, second.topic);
    assert_eq!(first.topic, format!("sensors.filtered.{}", first.id));
    assert_eq!(first.lease_key, format!("{}.c1", first.id));
    assert_eq!(second.lease_key, format!("{}.c2", first.id));
    assert_eq!(manager.active_count(), 1);

    let holders = manager.get_subscription(first.id).unwrap().lease_holders;
    assert_eq!(holders.len(), 2);
}

#[test]
fn unsubscribe_round_trip_through_the_handlers() {
    let (manager, config) = fixture();
    let reply = subscribe(&manager, &config, "severity = 5", "c1");
    subscribe(&manager, &config, "severity = 5", "c2");

    let request = serde_json::json!({ "id": reply.id, "client_id": "c1" });
    let out = handle_unsubscribe(&manager, &serde_json::to_vec(&request).unwrap());
    let out: UnsubscribeReply = serde_json::from_slice(&out).unwrap();
    assert!(!out.removed);
    assert_eq!(manager.active_count(), 1);

    let request = serde_json::json!({ "id": reply.id, "client_id": "c2" });
    let out = handle_unsubscribe(&manager, &serde_json::to_vec(&request).unwrap());
    let out: UnsubscribeReply = serde_json::from_slice(&out).unwrap();
    assert!(out.removed);
    assert_eq!(manager.active_count(), 0);
}

#[test]
fn kv_deletion_drives_lease_removal() {
    let (manager, config) = fixture();
    let first = subscribe(&manager, &config, "temperature > 30.0", "c1");
    let second = subscribe(&manager, &config, "temperature > 30.0", "c2");

    // The advertised lease key is exactly what the bucket will report
    // back on expiry.
    on_lease_event(&manager, &first.lease_key, Operation::Delete);
    assert_eq!(manager.active_count(), 1);

    on_lease_event(&manager, &second.lease_key, Operation::Purge);
    assert_eq!(manager.active_count(), 0);
}

#[test]
fn expired_lease_for_a_vanished_subscription_is_harmless() {
    let (manager, _) = fixture();
    on_lease_event(&manager, "7.client-x", Operation::Delete);
    assert_eq!(manager.active_count(), 0);
}
