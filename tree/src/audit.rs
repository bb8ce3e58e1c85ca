use nestset_store::{Interval, NodeKey, NodeRecord};
use std::collections::BTreeMap;

use crate::error::Violation;

/// Check every nested-set invariant over the indexed rows of one table.
///
/// Rows without an interval are skipped. The first violation found is
/// returned; checks run cheapest first.
pub fn audit<Id: NodeKey>(rows: &[NodeRecord<Id>]) -> Result<(), Violation> {
    let mut indexed: Vec<(&Id, Interval, bool)> = rows
        .iter()
        .filter_map(|record| {
            record
                .interval
                .map(|interval| (&record.id, interval, record.is_group))
        })
        .collect();

    for (id, interval, is_group) in &indexed {
        if interval.is_quarantined() {
            return Err(Violation::Quarantined {
                id: id.to_string(),
                interval: *interval,
            });
        }
        if interval.left >= interval.right {
            return Err(Violation::EmptyInterval {
                id: id.to_string(),
                interval: *interval,
            });
        }
        if *is_group != interval.has_children() {
            return Err(Violation::GroupFlag {
                id: id.to_string(),
                stored: *is_group,
                interval: *interval,
            });
        }
    }

    check_ordinals(&indexed)?;

    indexed.sort_by_key(|(_, interval, _)| interval.left);
    check_nesting(&indexed)
}

// Every ordinal in [1, 2N] is used exactly once.
fn check_ordinals<Id: NodeKey>(indexed: &[(&Id, Interval, bool)]) -> Result<(), Violation> {
    let mut owners: BTreeMap<i64, &Id> = BTreeMap::new();
    for (id, interval, _) in indexed {
        for value in [interval.left, interval.right] {
            if let Some(first) = owners.insert(value, id) {
                return Err(Violation::DuplicateOrdinal {
                    value,
                    first: first.to_string(),
                    second: id.to_string(),
                });
            }
        }
    }

    let max = i64::try_from(indexed.len() * 2).unwrap_or(i64::MAX);
    if let Some(value) = (1..=max).find(|value| !owners.contains_key(value)) {
        return Err(Violation::MissingOrdinal { value, max });
    }
    Ok(())
}

// Intervals sorted by left must nest like brackets.
fn check_nesting<Id: NodeKey>(sorted: &[(&Id, Interval, bool)]) -> Result<(), Violation> {
    let mut open: Vec<(&Id, Interval)> = Vec::new();
    for (id, interval, _) in sorted {
        while open
            .last()
            .is_some_and(|(_, outer)| outer.right < interval.left)
        {
            open.pop();
        }
        if let Some((outer, outer_interval)) = open.last()
            && interval.right > outer_interval.right
        {
            return Err(Violation::PartialOverlap {
                outer: outer.to_string(),
                outer_interval: *outer_interval,
                inner: id.to_string(),
                inner_interval: *interval,
            });
        }
        open.push((id, *interval));
    }
    Ok(())
}
