#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Variable naming: domain terms often similar
#![allow(clippy::similar_names)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Numeric casts: intentional in decode code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
// Control flow style
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
// Option/Result patterns
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Import style
#![allow(clippy::wildcard_imports)]
// Control flow style
#![allow(clippy::items_after_statements)]
// Struct field patterns
#![allow(clippy::struct_field_names)]
// Large types
#![allow(clippy::large_futures)]

//! Sieve - content-based filtering sidecar for NATS.
//!
//! Sieve subscribes to one inbound subject carrying binary-encoded map
//! records, evaluates each record against a dynamic set of boolean
//! expressions compiled into an A-Tree, and republishes the original
//! payload to `<output_prefix>.<id>` for every matching subscription.
//! Subscriptions are soft state: clients keep them alive with leases in a
//! JetStream KV bucket, and lease expiry garbage-collects them.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Runtime orchestration and shutdown ordering
//!
//! ## Matching
//! - `matching::schema` - Attribute name to type lookup
//! - `matching::snapshot` - Immutable compiled-tree snapshot
//! - `matching::manager` - Subscription set and snapshot publication
//!
//! ## Pipeline
//! - `bridge` - Payload decoding and event projection
//! - `workers` - Worker pool draining the inbound queue
//!
//! ## Control
//! - `control` - Subscribe/unsubscribe request handling
//! - `leases` - KV lease watch and reconciliation
//!
//! ## Networking
//! - `net` - NATS connection setup (TLS, event logging)
//!
//! ## Operations
//! - `ops::telemetry` - Structured logging setup
//!
//! ## CLI
//! - `cli` - Argument parsing and command dispatch

// Core infrastructure
pub mod core;

// Matching pipeline
pub mod bridge;
pub mod matching;
pub mod workers;

// Control plane
pub mod control;
pub mod leases;

// Networking
pub mod net;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime};
pub use matching::{manager, schema, snapshot};
pub use ops::telemetry;
