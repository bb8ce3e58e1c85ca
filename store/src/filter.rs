use std::fmt::Display;

use crate::record::{Interval, NodeRecord};

/// Interval column targeted by a range-shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Left,
    Right,
}

impl Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Column::Left => write!(f, "left"),
            Column::Right => write!(f, "right"),
        }
    }
}

/// Range predicate of a shift: `column > v` or `column >= v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Above(i64),
    AtLeast(i64),
}

impl Threshold {
    pub const fn matches(&self, value: i64) -> bool {
        match *self {
            Threshold::Above(threshold) => value > threshold,
            Threshold::AtLeast(threshold) => value >= threshold,
        }
    }
}

impl Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Threshold::Above(value) => write!(f, "> {value}"),
            Threshold::AtLeast(value) => write!(f, ">= {value}"),
        }
    }
}

/// Read predicates used by traversal queries and rebuild.
///
/// Executors return matching rows ordered by `left` ascending, unindexed rows
/// last, ties broken by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter<Id> {
    All,
    Indexed,
    /// Rows whose parent reference equals the given id (`None` selects roots).
    ChildrenOf(Option<Id>),
    /// `left < i.left AND right > i.right`
    Enclosing(Interval),
    /// `left > i.left AND right < i.right`
    Enclosed(Interval),
    /// `right == left + 1`
    Leaves,
}

impl<Id: PartialEq> RowFilter<Id> {
    pub fn matches(&self, record: &NodeRecord<Id>) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Indexed => record.interval.is_some(),
            RowFilter::ChildrenOf(parent) => record.parent.as_ref() == parent.as_ref(),
            RowFilter::Enclosing(target) => record
                .interval
                .is_some_and(|interval| interval.contains(target)),
            RowFilter::Enclosed(target) => record
                .interval
                .is_some_and(|interval| target.contains(&interval)),
            RowFilter::Leaves => record
                .interval
                .is_some_and(|interval| interval.right == interval.left + 1),
        }
    }
}
