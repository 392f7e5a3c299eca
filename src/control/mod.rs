//! Subscribe/unsubscribe request handling.
//!
//! Requests arrive as JSON on dedicated request/reply subjects; the
//! handlers here are pure functions from request bytes to reply bytes so
//! they can be exercised without a bus connection.

use crate::core::config::Config;
use crate::leases::make_lease_key;
use crate::matching::manager::SubscriptionManager;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub expression: String,
    pub client_id: String,
}

/// Successful subscribe reply: where to listen and how to keep the
/// subscription alive.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeReply {
    pub id: u64,
    pub topic: String,
    pub lease_bucket: String,
    pub lease_key: String,
    pub lease_ttl_seconds: u32,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub id: u64,
    pub client_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeReply {
    pub id: u64,
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Handle a subscribe request, returning the encoded JSON reply.
pub fn handle_subscribe(manager: &SubscriptionManager, config: &Config, payload: &[u8]) -> Vec<u8> {
    let request = match serde_json::from_slice::<SubscribeRequest>(payload) {
        Ok(request) => request,
        Err(err) => {
            return encode_reply(&ErrorReply {
                error: format!("Bad request: {err}"),
            })
        }
    };

    match manager.subscribe(&request.expression, &request.client_id) {
        Ok(id) => encode_reply(&SubscribeReply {
            id,
            topic: format!("{}.{id}", config.output_prefix),
            lease_bucket: config.lease_bucket.clone(),
            lease_key: make_lease_key(id, &request.client_id),
            lease_ttl_seconds: config.lease_ttl_seconds,
        }),
        Err(err) => encode_reply(&ErrorReply {
            error: err.to_string(),
        }),
    }
}

/// Handle an unsubscribe request, returning the encoded JSON reply.
pub fn handle_unsubscribe(manager: &SubscriptionManager, payload: &[u8]) -> Vec<u8> {
    match serde_json::from_slice::<UnsubscribeRequest>(payload) {
        Ok(request) => {
            let removed = manager.remove_lease(request.id, &request.client_id);
            encode_reply(&UnsubscribeReply {
                id: request.id,
                removed,
            })
        }
        Err(err) => encode_reply(&ErrorReply {
            error: format!("Bad request: {err}"),
        }),
    }
}

fn encode_reply<T: Serialize>(reply: &T) -> Vec<u8> {
    serde_json::to_vec(reply).unwrap_or_else(|err| {
        warn!(error = %err, "failed to encode control reply");
        br#"{"error":"internal error"}"#.to_vec()
    })
}
