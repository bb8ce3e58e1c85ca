use async_trait::async_trait;
use displaydoc::Display;
use std::{cmp::Ordering, collections::BTreeMap, mem};
use thiserror::Error;

use crate::{
    NodeStore,
    filter::{Column, RowFilter, Threshold},
    record::{Interval, NodeKey, NodeRecord},
};

#[derive(Debug, Error, Display, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// A transaction is already open
    TransactionOpen,
    /// No transaction is open
    NoTransaction,
    /// Row {id} not found
    RowNotFound { id: String },
    /// Row {id} already exists
    DuplicateRecord { id: String },
}

/// In-process node table.
///
/// `begin` snapshots the whole table and `rollback` swaps the snapshot back,
/// so a failed or abandoned operation leaves no partial shift behind.
#[derive(Debug, Clone)]
pub struct MemoryStore<Id> {
    rows: BTreeMap<Id, NodeRecord<Id>>,
    snapshot: Option<BTreeMap<Id, NodeRecord<Id>>>,
}

impl<Id: NodeKey> Default for MemoryStore<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: NodeKey> MemoryStore<Id> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            snapshot: None,
        }
    }

    /// Seed the table with pre-built rows, e.g. an import.
    pub fn from_records(records: impl IntoIterator<Item = NodeRecord<Id>>) -> Self {
        Self {
            rows: records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            snapshot: None,
        }
    }

    /// Create an unindexed row, as the persistence layer does before it calls
    /// the creation hook.
    pub fn put_record(&mut self, id: Id, parent: Option<Id>) -> Result<(), MemoryStoreError> {
        if self.rows.contains_key(&id) {
            return Err(MemoryStoreError::DuplicateRecord { id: id.to_string() });
        }
        self.rows.insert(id.clone(), NodeRecord::new(id, parent));
        Ok(())
    }

    /// Update the parent reference field, leaving the interval untouched.
    pub fn set_parent(&mut self, id: &Id, parent: Option<Id>) -> Result<(), MemoryStoreError> {
        let record = self.row_mut(id)?;
        record.parent = parent;
        Ok(())
    }

    /// Drop a single row without touching any interval.
    pub fn remove_record(&mut self, id: &Id) -> Option<NodeRecord<Id>> {
        self.rows.remove(id)
    }

    pub fn record(&self, id: &Id) -> Option<&NodeRecord<Id>> {
        self.rows.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeRecord<Id>> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn row_mut(&mut self, id: &Id) -> Result<&mut NodeRecord<Id>, MemoryStoreError> {
        self.rows
            .get_mut(id)
            .ok_or_else(|| MemoryStoreError::RowNotFound { id: id.to_string() })
    }

    fn indexed_mut(&mut self) -> impl Iterator<Item = (&Id, &mut Interval)> {
        self.rows
            .iter_mut()
            .filter_map(|(id, record)| record.interval.as_mut().map(|interval| (id, interval)))
    }
}

fn by_left<Id: Ord>(a: &NodeRecord<Id>, b: &NodeRecord<Id>) -> Ordering {
    match (a.left(), b.left()) {
        (Some(a_left), Some(b_left)) => a_left.cmp(&b_left).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl<Id: NodeKey> NodeStore for MemoryStore<Id> {
    type Id = Id;
    type Error = MemoryStoreError;

    async fn begin(&mut self) -> Result<(), Self::Error> {
        if self.snapshot.is_some() {
            return Err(MemoryStoreError::TransactionOpen);
        }
        self.snapshot = Some(self.rows.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Self::Error> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or(MemoryStoreError::NoTransaction)
    }

    async fn rollback(&mut self) -> Result<(), Self::Error> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or(MemoryStoreError::NoTransaction)?;
        let discarded = mem::replace(&mut self.rows, snapshot);
        tracing::trace!("Rolled back memory store ({} rows discarded)", discarded.len());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    async fn get(&self, id: &Id) -> Result<Option<NodeRecord<Id>>, Self::Error> {
        Ok(self.rows.get(id).cloned())
    }

    async fn select(&self, filter: RowFilter<Id>) -> Result<Vec<NodeRecord<Id>>, Self::Error> {
        let mut rows: Vec<_> = self
            .rows
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        rows.sort_by(by_left);
        Ok(rows)
    }

    async fn max_right(&self) -> Result<Option<i64>, Self::Error> {
        Ok(self
            .rows
            .values()
            .filter_map(|record| record.right())
            .filter(|right| *right > 0)
            .max())
    }

    async fn shift(
        &mut self,
        column: Column,
        threshold: Threshold,
        delta: i64,
    ) -> Result<u64, Self::Error> {
        let mut touched = 0;
        for (_, interval) in self.indexed_mut() {
            let value = match column {
                Column::Left => &mut interval.left,
                Column::Right => &mut interval.right,
            };
            if threshold.matches(*value) {
                *value += delta;
                touched += 1;
            }
        }
        tracing::trace!("shift {column} {threshold} by {delta}: {touched} rows");
        Ok(touched)
    }

    async fn negate_within(&mut self, span: Interval) -> Result<u64, Self::Error> {
        let mut touched = 0;
        for (_, interval) in self.indexed_mut() {
            if span.encloses_or_equals(interval) {
                *interval = interval.negated();
                touched += 1;
            }
        }
        tracing::trace!("negate within {span}: {touched} rows");
        Ok(touched)
    }

    async fn restore_negated(&mut self, offset: i64) -> Result<u64, Self::Error> {
        let mut touched = 0;
        for (_, interval) in self.indexed_mut() {
            if interval.is_quarantined() {
                *interval = interval.negated().offset(offset);
                touched += 1;
            }
        }
        tracing::trace!("restore negated with offset {offset}: {touched} rows");
        Ok(touched)
    }

    async fn delete_within(&mut self, span: Interval) -> Result<Vec<Id>, Self::Error> {
        let doomed: Vec<Id> = self
            .rows
            .values()
            .filter(|record| {
                record
                    .interval
                    .is_some_and(|interval| span.encloses_or_equals(&interval))
            })
            .map(|record| record.id.clone())
            .collect();
        for id in &doomed {
            self.rows.remove(id);
        }
        tracing::trace!("delete within {span}: {} rows", doomed.len());
        Ok(doomed)
    }

    async fn set_interval(&mut self, id: &Id, interval: Interval) -> Result<(), Self::Error> {
        self.row_mut(id)?.interval = Some(interval);
        Ok(())
    }

    async fn set_group(&mut self, id: &Id, is_group: bool) -> Result<(), Self::Error> {
        self.row_mut(id)?.is_group = is_group;
        Ok(())
    }
}
