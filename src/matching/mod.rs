//! Subscription matching: the compiled expression index, its immutable
//! snapshots, and the manager that owns the mutable subscription set.

pub mod manager;
pub mod schema;
pub mod snapshot;

pub use manager::{SubscribeError, SubscriptionInfo, SubscriptionManager};
pub use schema::Schema;
pub use snapshot::TreeSnapshot;
