use serde::{Deserialize, Serialize};

/// Engine behaviour knobs. The defaults describe a forest with cascading
/// deletes, id-ordered rebuilds and a post-write audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// When false, at most one root may exist.
    pub allow_multiple_roots: bool,
    pub delete_policy: DeletePolicy,
    pub rebuild_order: RebuildOrder,
    pub move_target: MoveTarget,
    /// Repair stale group flags and audit every invariant before committing
    /// a mutation.
    pub verify_after_write: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            allow_multiple_roots: true,
            delete_policy: DeletePolicy::Cascade,
            rebuild_order: RebuildOrder::Id,
            move_target: MoveTarget::Derived,
            verify_after_write: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Remove the node and every descendant.
    #[default]
    Cascade,
    /// Refuse to remove a node that still has children.
    Restrict,
}

/// Sibling order used when numbering from parent pointers.
///
/// Any order yields a valid tree; this only picks which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildOrder {
    /// Ascending id.
    #[default]
    Id,
    /// Current `left`, then unindexed rows by id.
    Existing,
}

/// How a move finds the new parent's `right` once the source gap is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    /// Subtract the moved width from the pre-move value when the parent sat
    /// after the subtree.
    #[default]
    Derived,
    /// Read the parent row again.
    Reread,
}
