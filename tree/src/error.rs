use displaydoc::Display;
use nestset_store::Interval;
use std::error::Error;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error, Display)]
pub enum TreeError {
    /// Node {id} not found
    NodeNotFound { id: String },

    /// Node {id} has no interval yet
    NotIndexed { id: String },

    /// Node {id} is already indexed at {interval}
    AlreadyIndexed { id: String, interval: Interval },

    /// Cannot place {id} under {parent}: {parent} is {id} or one of its descendants
    Cycle { id: String, parent: String },

    /// Cannot add root {id}: tree already has root {existing}
    MultipleRoots { id: String, existing: String },

    /// Cannot delete {id}: it still has {descendants} descendants
    HasChildren { id: String, descendants: i64 },

    /// Interval invariant violated: {0}
    InvariantViolation(#[from] Violation),

    /// Store operation failed
    Store(#[source] BoxError),
}

impl TreeError {
    pub fn store(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(error))
    }

    pub fn not_found(id: impl ToString) -> Self {
        Self::NodeNotFound { id: id.to_string() }
    }

    pub fn not_indexed(id: impl ToString) -> Self {
        Self::NotIndexed { id: id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound { .. })
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Failures that point at a bug, a concurrent writer or a broken store,
    /// as opposed to a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Store(_))
    }
}

/// A broken nested-set invariant, found by [`crate::audit`].
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum Violation {
    /// node {id} has left >= right at {interval}
    EmptyInterval { id: String, interval: Interval },

    /// node {id} is still quarantined at {interval}
    Quarantined { id: String, interval: Interval },

    /// nodes {outer} {outer_interval} and {inner} {inner_interval} partially overlap
    PartialOverlap {
        outer: String,
        outer_interval: Interval,
        inner: String,
        inner_interval: Interval,
    },

    /// ordinal {value} is used by both {first} and {second}
    DuplicateOrdinal {
        value: i64,
        first: String,
        second: String,
    },

    /// ordinal {value} is unused, [1, {max}] must be fully covered
    MissingOrdinal { value: i64, max: i64 },

    /// node {id} stores is_group = {stored} for interval {interval}
    GroupFlag {
        id: String,
        stored: bool,
        interval: Interval,
    },
}
