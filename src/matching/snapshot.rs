use a_tree::ATree;
use std::collections::HashMap;

/// Immutable snapshot of the compiled expression index and associated
/// metadata, shared with worker threads as `Arc<TreeSnapshot>`.
///
/// Output subjects are precomputed at snapshot build time so the hot
/// path never allocates a subject string. A published snapshot is never
/// mutated; readers hold their `Arc` for the full match-and-publish and
/// old snapshots stay valid until the last reader drops them.
pub struct TreeSnapshot {
    pub tree: ATree<u64>,

    /// subscription id -> precomputed output subject
    /// (e.g. `sensors.filtered.42`).
    pub output_subjects: HashMap<u64, String>,

    pub active_count: usize,
}
