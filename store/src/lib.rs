//! Record-store boundary for the nested-set engine.
//!
//! The engine never talks to storage directly. It issues point lookups,
//! range-shift updates, range deletes and an aggregate max through
//! [`NodeStore`], all inside one `begin`/`commit` scope per operation.

mod filter;
mod memory;
mod record;

use async_trait::async_trait;
use std::error::Error;

pub use crate::filter::{Column, RowFilter, Threshold};
pub use crate::memory::{MemoryStore, MemoryStoreError};
pub use crate::record::{Interval, NodeKey, NodeRecord};

/// Executor over the node table of one tree.
///
/// Every mutating statement affects indexed rows only; rows with no interval
/// are never matched by a range predicate. Quarantined (negated) rows fall out
/// of every positive threshold naturally.
#[async_trait]
pub trait NodeStore: Send + Sync {
    type Id: NodeKey;
    type Error: Error + Send + Sync + 'static;

    /// Open the atomic scope for one structural operation.
    async fn begin(&mut self) -> Result<(), Self::Error>;

    async fn commit(&mut self) -> Result<(), Self::Error>;

    /// Discard every statement since `begin`, restoring the prior state.
    async fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Whether a scope is open. A scope left open by an interrupted caller
    /// must be rolled back before the table is read again.
    fn in_transaction(&self) -> bool;

    async fn get(&self, id: &Self::Id) -> Result<Option<NodeRecord<Self::Id>>, Self::Error>;

    async fn select(
        &self,
        filter: RowFilter<Self::Id>,
    ) -> Result<Vec<NodeRecord<Self::Id>>, Self::Error>;

    /// Maximum `right` over indexed, non-quarantined rows.
    async fn max_right(&self) -> Result<Option<i64>, Self::Error>;

    /// `SET column = column + delta WHERE column <threshold>`
    async fn shift(
        &mut self,
        column: Column,
        threshold: Threshold,
        delta: i64,
    ) -> Result<u64, Self::Error>;

    /// Negate both coordinates of every row enclosed by (or equal to) `span`.
    async fn negate_within(&mut self, span: Interval) -> Result<u64, Self::Error>;

    /// Restore every negated row to `abs(coordinate) + offset`.
    async fn restore_negated(&mut self, offset: i64) -> Result<u64, Self::Error>;

    /// Delete every row enclosed by (or equal to) `span`, returning their ids.
    async fn delete_within(&mut self, span: Interval) -> Result<Vec<Self::Id>, Self::Error>;

    async fn set_interval(&mut self, id: &Self::Id, interval: Interval)
    -> Result<(), Self::Error>;

    async fn set_group(&mut self, id: &Self::Id, is_group: bool) -> Result<(), Self::Error>;
}
