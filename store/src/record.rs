use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

/// Caller-defined record identifier. The engine never generates ids.
pub trait NodeKey: Clone + Ord + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> NodeKey for T where T: Clone + Ord + Hash + Debug + Display + Send + Sync + 'static {}

/// A `(left, right)` pair in the shared ordinal space.
///
/// Containment of intervals encodes ancestry: `a` is an ancestor of `b` iff
/// `a.left < b.left && b.right < a.right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub left: i64,
    pub right: i64,
}

impl Interval {
    pub const fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Interval of a fresh leaf starting at `left`.
    pub const fn leaf(left: i64) -> Self {
        Self::new(left, left + 1)
    }

    /// Number of ordinals occupied by the subtree: `2 * descendants + 2`.
    pub const fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    pub const fn has_children(&self) -> bool {
        self.right - self.left > 1
    }

    pub const fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    /// Strict containment: `other` lies inside `self` and is not `self`.
    pub const fn contains(&self, other: &Interval) -> bool {
        self.left < other.left && other.right < self.right
    }

    pub const fn encloses_or_equals(&self, other: &Interval) -> bool {
        self.left <= other.left && other.right <= self.right
    }

    pub const fn is_disjoint(&self, other: &Interval) -> bool {
        self.right < other.left || other.right < self.left
    }

    /// Rows are quarantined during a move by negating both coordinates.
    pub const fn is_quarantined(&self) -> bool {
        self.left < 0 || self.right < 0
    }

    pub const fn negated(&self) -> Self {
        Self::new(-self.left, -self.right)
    }

    pub const fn offset(&self, delta: i64) -> Self {
        Self::new(self.left + delta, self.right + delta)
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// One row of the backing store, as seen by the engine.
///
/// `parent` is owned by the persistence layer. `interval` is `None` until the
/// engine indexes the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord<Id> {
    pub id: Id,
    pub parent: Option<Id>,
    pub interval: Option<Interval>,
    pub is_group: bool,
}

impl<Id> NodeRecord<Id> {
    pub fn new(id: Id, parent: Option<Id>) -> Self {
        Self {
            id,
            parent,
            interval: None,
            is_group: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_indexed(&self) -> bool {
        self.interval.is_some()
    }

    /// The group flag as implied by the interval, ignoring the stored flag.
    pub fn derived_group(&self) -> bool {
        self.interval.is_some_and(|interval| interval.has_children())
    }

    pub fn left(&self) -> Option<i64> {
        self.interval.map(|interval| interval.left)
    }

    pub fn right(&self) -> Option<i64> {
        self.interval.map(|interval| interval.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_width_and_descendants() {
        let interval = Interval::new(1, 8);
        assert_eq!(interval.width(), 8);
        assert_eq!(interval.descendant_count(), 3);
        assert!(interval.has_children());
        assert!(!Interval::leaf(4).has_children());
    }

    #[test]
    fn test_interval_containment_is_strict() {
        let outer = Interval::new(1, 8);
        let inner = Interval::new(2, 5);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outer));
        assert!(outer.encloses_or_equals(&outer));
        assert!(inner.is_disjoint(&Interval::new(6, 7)));
    }

    #[test]
    fn test_derived_group_ignores_stored_flag() {
        let mut record = NodeRecord::new("a", None);
        record.is_group = true;
        assert!(!record.derived_group());
        record.interval = Some(Interval::new(1, 4));
        assert!(record.derived_group());
    }
}
