use crate::core::config::{AttributeDef, AttributeType};
use crate::matching::snapshot::TreeSnapshot;
use a_tree::{ATree, AttributeDefinition};
use anyhow::anyhow;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The expression engine rejected the predicate text.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
}

/// A live subscription: one expression, one output subject, and the set
/// of clients holding leases on it.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    pub id: u64,
    pub expression: String,
    pub lease_holders: HashSet<String>,
}

/// Writer-side state, touched only under the write mutex.
struct WriterState {
    next_id: u64,
    expr_to_id: HashMap<String, u64>,
    subscriptions: HashMap<u64, SubscriptionInfo>,
}

/// Owns the mutable subscription set and publishes compiled snapshots.
///
/// RCU-style: writers serialize on a mutex and publish whole
/// `TreeSnapshot`s into an atomic slot; readers take one atomic load and
/// are never blocked. Every expression-set change rebuilds the tree from
/// scratch - the system is optimised for many matches per change, not
/// many changes.
pub struct SubscriptionManager {
    attributes: Vec<AttributeDef>,
    output_prefix: String,
    state: Mutex<WriterState>,
    snapshot: ArcSwap<TreeSnapshot>,
}

impl SubscriptionManager {
    pub fn new(attributes: &[AttributeDef], output_prefix: &str) -> anyhow::Result<Self> {
        let state = WriterState {
            next_id: 1,
            expr_to_id: HashMap::new(),
            subscriptions: HashMap::new(),
        };
        let initial = build_snapshot(attributes, output_prefix, &state.subscriptions)
            .map_err(|e| anyhow!("cannot build expression index: {e}"))?;
        Ok(Self {
            attributes: attributes.to_vec(),
            output_prefix: output_prefix.to_string(),
            state: Mutex::new(state),
            snapshot: ArcSwap::from_pointee(initial),
        })
    }

    /// Register a boolean expression for `client_id` and return the
    /// subscription id. Idempotent on the expression: a duplicate only
    /// adds a lease holder and does not republish the snapshot, since
    /// the compiled index is unchanged.
    pub fn subscribe(&self, expression: &str, client_id: &str) -> Result<u64, SubscribeError> {
        let mut state = self.state.lock();

        if let Some(&id) = state.expr_to_id.get(expression) {
            if let Some(sub) = state.subscriptions.get_mut(&id) {
                sub.lease_holders.insert(client_id.to_string());
            }
            info!(
                id,
                client = client_id,
                expression,
                "reused subscription for existing expression"
            );
            return Ok(id);
        }

        let id = state.next_id;
        state.next_id += 1;

        let mut lease_holders = HashSet::new();
        lease_holders.insert(client_id.to_string());
        state.subscriptions.insert(
            id,
            SubscriptionInfo {
                id,
                expression: expression.to_string(),
                lease_holders,
            },
        );
        state.expr_to_id.insert(expression.to_string(), id);

        // The rebuild validates the new expression; roll the tentative
        // entries back if it is rejected.
        match build_snapshot(&self.attributes, &self.output_prefix, &state.subscriptions) {
            Ok(snap) => {
                self.snapshot.store(Arc::new(snap));
                info!(id, client = client_id, expression, "new subscription");
                Ok(id)
            }
            Err(message) => {
                state.subscriptions.remove(&id);
                state.expr_to_id.remove(expression);
                state.next_id -= 1;
                Err(SubscribeError::InvalidExpression(message))
            }
        }
    }

    /// Drop `client_id`'s lease on a subscription. Returns `true` only
    /// if this removed the last lease and the subscription is gone.
    pub fn remove_lease(&self, id: u64, client_id: &str) -> bool {
        let mut state = self.state.lock();

        let Some(sub) = state.subscriptions.get_mut(&id) else {
            return false;
        };
        sub.lease_holders.remove(client_id);

        if !sub.lease_holders.is_empty() {
            debug!(
                id,
                client = client_id,
                remaining = sub.lease_holders.len(),
                "removed lease, subscription stays"
            );
            return false;
        }

        let expression = sub.expression.clone();
        state.expr_to_id.remove(&expression);
        state.subscriptions.remove(&id);
        info!(id, %expression, "removed subscription, no active leases");
        self.republish(&state);
        true
    }

    /// Force-delete a subscription regardless of remaining lease
    /// holders. Returns `true` if it existed.
    pub fn remove_subscription(&self, id: u64) -> bool {
        let mut state = self.state.lock();

        let Some(sub) = state.subscriptions.get(&id) else {
            return false;
        };
        let expression = sub.expression.clone();
        state.expr_to_id.remove(&expression);
        state.subscriptions.remove(&id);
        info!(id, %expression, "force-removed subscription");
        self.republish(&state);
        true
    }

    pub fn get_subscription(&self, id: u64) -> Option<SubscriptionInfo> {
        self.state.lock().subscriptions.get(&id).cloned()
    }

    pub fn find_by_expression(&self, expression: &str) -> Option<u64> {
        self.state.lock().expr_to_id.get(expression).copied()
    }

    /// Current snapshot, one atomic load. Callers keep the `Arc` for the
    /// duration of their work.
    pub fn snapshot(&self) -> Arc<TreeSnapshot> {
        self.snapshot.load_full()
    }

    pub fn active_count(&self) -> usize {
        self.snapshot.load().active_count
    }

    fn republish(&self, state: &WriterState) {
        // Every remaining expression already passed a rebuild, so this
        // cannot reject; keep the old snapshot if it somehow does.
        match build_snapshot(&self.attributes, &self.output_prefix, &state.subscriptions) {
            Ok(snap) => self.snapshot.store(Arc::new(snap)),
            Err(err) => error!(error = %err, "snapshot rebuild failed, keeping previous"),
        }
    }
}

fn attribute_definition(def: &AttributeDef) -> AttributeDefinition {
    match def.kind {
        AttributeType::Boolean => AttributeDefinition::boolean(&def.name),
        AttributeType::Integer => AttributeDefinition::integer(&def.name),
        AttributeType::Float => AttributeDefinition::float(&def.name),
        AttributeType::String => AttributeDefinition::string(&def.name),
        AttributeType::StringList => AttributeDefinition::string_list(&def.name),
        AttributeType::IntegerList => AttributeDefinition::integer_list(&def.name),
    }
}

/// Build a fresh tree from every current expression and compose the
/// immutable snapshot around it.
fn build_snapshot(
    attributes: &[AttributeDef],
    output_prefix: &str,
    subscriptions: &HashMap<u64, SubscriptionInfo>,
) -> Result<TreeSnapshot, String> {
    let definitions: Vec<AttributeDefinition> =
        attributes.iter().map(attribute_definition).collect();
    let mut tree = ATree::new(&definitions).map_err(|e| e.to_string())?;

    for (id, sub) in subscriptions {
        tree.insert(id, &sub.expression).map_err(|e| e.to_string())?;
    }

    let output_subjects = subscriptions
        .keys()
        .map(|&id| (id, format!("{output_prefix}.{id}")))
        .collect();

    Ok(TreeSnapshot {
        tree,
        output_subjects,
        active_count: subscriptions.len(),
    })
}
