//! Interval index core: nested-set maintenance over a [`NodeStore`].
//!
//! Every public operation runs inside one store transaction. Either every
//! range-shift lands and the audit passes, or the store is rolled back to
//! where it was before the call.

mod audit;
mod config;
mod error;
mod rebuild;

use nestset_store::{Column, Interval, NodeKey, NodeRecord, NodeStore, RowFilter, Threshold};

pub use crate::audit::audit;
pub use crate::config::{DeletePolicy, MoveTarget, RebuildOrder, TreeConfig};
pub use crate::error::{BoxError, TreeError, Violation};
use crate::rebuild::FlatForest;

/// Borrowed view of one tree's node table with the mutating primitives.
///
/// The caller must hold exclusive access to the table for the lifetime of
/// this value; `&mut S` is that guarantee within one process.
pub struct IntervalIndex<'s, S: NodeStore> {
    store: &'s mut S,
    config: &'s TreeConfig,
}

impl<'s, S: NodeStore> IntervalIndex<'s, S> {
    pub fn new(store: &'s mut S, config: &'s TreeConfig) -> Self {
        Self { store, config }
    }

    /// Append `id` as a new top-level interval after every existing one.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn insert_root(&mut self, id: &S::Id) -> Result<Interval, TreeError> {
        self.begin().await?;
        let result = self.insert_root_inner(id).await;
        self.finish(result).await
    }

    /// Insert `id` as the last child of `parent`.
    #[tracing::instrument(skip_all, fields(id = %id, parent = %parent))]
    pub async fn insert_child(
        &mut self,
        id: &S::Id,
        parent: &S::Id,
    ) -> Result<Interval, TreeError> {
        self.begin().await?;
        let result = self.insert_child_inner(id, parent).await;
        self.finish(result).await
    }

    /// Reparent the subtree rooted at `id` as the last child of `new_parent`,
    /// or as a trailing root when `new_parent` is `None`.
    #[tracing::instrument(skip_all, fields(id = %id, new_parent = ?new_parent))]
    pub async fn move_subtree(
        &mut self,
        id: &S::Id,
        new_parent: Option<&S::Id>,
    ) -> Result<Interval, TreeError> {
        self.begin().await?;
        let result = self.move_subtree_inner(id, new_parent).await;
        self.finish(result).await
    }

    /// Remove `id` and every descendant, closing the gap they leave.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn delete_subtree(&mut self, id: &S::Id) -> Result<Vec<S::Id>, TreeError> {
        self.begin().await?;
        let result = self.delete_subtree_inner(id).await;
        self.finish(result).await
    }

    /// Renumber every row from its parent reference alone.
    ///
    /// Sibling order follows [`TreeConfig::rebuild_order`]; any order yields
    /// the same containment relationships.
    #[tracing::instrument(skip_all)]
    pub async fn rebuild_from_parent_pointers(&mut self) -> Result<usize, TreeError> {
        self.begin().await?;
        let result = self.rebuild_inner().await;
        self.finish(result).await
    }

    /// Audit the whole table without changing it.
    pub async fn audit(&self) -> Result<(), TreeError> {
        let rows = self
            .store
            .select(RowFilter::Indexed)
            .await
            .map_err(TreeError::store)?;
        audit(&rows).map_err(TreeError::from)
    }

    async fn insert_root_inner(&mut self, id: &S::Id) -> Result<Interval, TreeError> {
        self.fetch_unindexed(id).await?;
        self.ensure_root_slot(id).await?;

        let max = self.store.max_right().await.map_err(TreeError::store)?;
        let interval = Interval::leaf(max.unwrap_or(0) + 1);
        self.store
            .set_interval(id, interval)
            .await
            .map_err(TreeError::store)?;
        self.store
            .set_group(id, false)
            .await
            .map_err(TreeError::store)?;

        tracing::debug!("Inserted root at {interval}");
        Ok(interval)
    }

    async fn insert_child_inner(
        &mut self,
        id: &S::Id,
        parent: &S::Id,
    ) -> Result<Interval, TreeError> {
        self.fetch_unindexed(id).await?;
        let (parent_record, parent_interval) = self.fetch_indexed(parent).await?;
        let anchor = parent_interval.right;

        self.shift(Column::Left, Threshold::Above(anchor), 2).await?;
        self.shift(Column::Right, Threshold::AtLeast(anchor), 2)
            .await?;

        let interval = Interval::leaf(anchor);
        self.store
            .set_interval(id, interval)
            .await
            .map_err(TreeError::store)?;
        self.store
            .set_group(id, false)
            .await
            .map_err(TreeError::store)?;
        if !parent_record.is_group {
            self.store
                .set_group(parent, true)
                .await
                .map_err(TreeError::store)?;
        }

        tracing::debug!("Inserted child at {interval}");
        Ok(interval)
    }

    async fn move_subtree_inner(
        &mut self,
        id: &S::Id,
        new_parent: Option<&S::Id>,
    ) -> Result<Interval, TreeError> {
        let (_, source) = self.fetch_indexed(id).await?;
        let destination = match new_parent {
            Some(parent) => {
                let (_, parent_interval) = self.fetch_indexed(parent).await?;
                if source.encloses_or_equals(&parent_interval) {
                    return Err(TreeError::Cycle {
                        id: id.to_string(),
                        parent: parent.to_string(),
                    });
                }
                Some((parent, parent_interval))
            }
            None => {
                self.ensure_root_slot(id).await?;
                None
            }
        };
        let old_parent = self.enclosing_parent(source).await?;
        let width = source.width();

        // quarantine
        let quarantined = self
            .store
            .negate_within(source)
            .await
            .map_err(TreeError::store)?;
        tracing::debug!("Quarantined {quarantined} rows of width {width}");

        // close the source gap
        self.shift(Column::Right, Threshold::Above(source.right), -width)
            .await?;
        self.shift(Column::Left, Threshold::Above(source.right), -width)
            .await?;

        // open the destination gap
        let target = match destination {
            Some((parent, parent_interval)) => {
                self.move_target(parent, parent_interval, source).await?
            }
            None => {
                let max = self.store.max_right().await.map_err(TreeError::store)?;
                max.unwrap_or(0) + 1
            }
        };
        self.shift(Column::Left, Threshold::AtLeast(target), width)
            .await?;
        self.shift(Column::Right, Threshold::AtLeast(target), width)
            .await?;
        if let Some((parent, _)) = destination {
            self.store
                .set_group(parent, true)
                .await
                .map_err(TreeError::store)?;
        }

        // re-attach
        let offset = target - source.left;
        self.store
            .restore_negated(offset)
            .await
            .map_err(TreeError::store)?;

        if let Some(old_parent) = old_parent {
            self.refresh_group(&old_parent).await?;
        }

        let moved = source.offset(offset);
        tracing::debug!("Moved subtree from {source} to {moved}");
        Ok(moved)
    }

    async fn move_target(
        &self,
        parent: &S::Id,
        before: Interval,
        source: Interval,
    ) -> Result<i64, TreeError> {
        match self.config.move_target {
            MoveTarget::Derived if before.right > source.right => Ok(before.right - source.width()),
            MoveTarget::Derived => Ok(before.right),
            MoveTarget::Reread => {
                let (_, interval) = self.fetch_indexed(parent).await?;
                Ok(interval.right)
            }
        }
    }

    async fn delete_subtree_inner(&mut self, id: &S::Id) -> Result<Vec<S::Id>, TreeError> {
        let (_, interval) = self.fetch_indexed(id).await?;
        if self.config.delete_policy == DeletePolicy::Restrict && interval.has_children() {
            return Err(TreeError::HasChildren {
                id: id.to_string(),
                descendants: interval.descendant_count(),
            });
        }
        let old_parent = self.enclosing_parent(interval).await?;
        let width = interval.width();

        let removed = self
            .store
            .delete_within(interval)
            .await
            .map_err(TreeError::store)?;
        self.shift(Column::Right, Threshold::Above(interval.right), -width)
            .await?;
        self.shift(Column::Left, Threshold::Above(interval.right), -width)
            .await?;

        if let Some(old_parent) = old_parent {
            self.refresh_group(&old_parent).await?;
        }

        tracing::debug!("Deleted {} rows at {interval}", removed.len());
        Ok(removed)
    }

    async fn rebuild_inner(&mut self) -> Result<usize, TreeError> {
        let rows = self
            .store
            .select(RowFilter::All)
            .await
            .map_err(TreeError::store)?;
        let forest = FlatForest::from_parent_pointers(rows, self.config.rebuild_order)?;
        if !self.config.allow_multiple_roots {
            let mut roots = forest.roots();
            if let (Some(existing), Some(id)) = (roots.next(), roots.next()) {
                return Err(TreeError::MultipleRoots {
                    id: id.to_string(),
                    existing: existing.to_string(),
                });
            }
        }
        tracing::debug!("Numbering {} rows", forest.len());

        let numbered = forest.number()?;
        for (id, interval) in &numbered {
            self.store
                .set_interval(id, *interval)
                .await
                .map_err(TreeError::store)?;
            self.store
                .set_group(id, interval.has_children())
                .await
                .map_err(TreeError::store)?;
        }
        Ok(numbered.len())
    }

    async fn begin(&mut self) -> Result<(), TreeError> {
        self.store.begin().await.map_err(TreeError::store)
    }

    async fn finish<T>(&mut self, result: Result<T, TreeError>) -> Result<T, TreeError> {
        let result = match result {
            Ok(value) if self.config.verify_after_write => self.verify().await.map(|()| value),
            result => result,
        };

        match result {
            Ok(value) => {
                self.store.commit().await.map_err(TreeError::store)?;
                Ok(value)
            }
            Err(error) => {
                if error.is_fatal() {
                    tracing::error!("Rolling back: {error}");
                } else {
                    tracing::debug!("Rolling back: {error}");
                }
                if let Err(rollback) = self.store.rollback().await {
                    tracing::error!("Rollback failed: {rollback}");
                }
                Err(error)
            }
        }
    }

    // The stored group flag is only a cache, so drifted flags are repaired
    // inside the transaction before the structural audit runs.
    async fn verify(&mut self) -> Result<(), TreeError> {
        let mut rows = self
            .store
            .select(RowFilter::Indexed)
            .await
            .map_err(TreeError::store)?;
        for record in &mut rows {
            let derived = record.derived_group();
            if record.is_group != derived {
                tracing::warn!(
                    id = %record.id,
                    stored = record.is_group,
                    "Repairing stale group flag"
                );
                self.store
                    .set_group(&record.id, derived)
                    .await
                    .map_err(TreeError::store)?;
                record.is_group = derived;
            }
        }
        audit(&rows).map_err(TreeError::from)
    }

    async fn shift(
        &mut self,
        column: Column,
        threshold: Threshold,
        delta: i64,
    ) -> Result<u64, TreeError> {
        let touched = self
            .store
            .shift(column, threshold, delta)
            .await
            .map_err(TreeError::store)?;
        tracing::trace!("{column} {threshold} += {delta} ({touched} rows)");
        Ok(touched)
    }

    async fn fetch(&self, id: &S::Id) -> Result<NodeRecord<S::Id>, TreeError> {
        self.store
            .get(id)
            .await
            .map_err(TreeError::store)?
            .ok_or_else(|| TreeError::not_found(id))
    }

    async fn fetch_indexed(
        &self,
        id: &S::Id,
    ) -> Result<(NodeRecord<S::Id>, Interval), TreeError> {
        let record = self.fetch(id).await?;
        match record.interval {
            Some(interval) => Ok((record, interval)),
            None => Err(TreeError::not_indexed(id)),
        }
    }

    async fn fetch_unindexed(&self, id: &S::Id) -> Result<NodeRecord<S::Id>, TreeError> {
        let record = self.fetch(id).await?;
        match record.interval {
            Some(interval) => Err(TreeError::AlreadyIndexed {
                id: id.to_string(),
                interval,
            }),
            None => Ok(record),
        }
    }

    // A new root is allowed unless the tree is single-rooted and some other
    // row already holds a top-level interval.
    async fn ensure_root_slot(&self, id: &S::Id) -> Result<(), TreeError> {
        if self.config.allow_multiple_roots {
            return Ok(());
        }
        let roots = top_level(
            self.store
                .select(RowFilter::Indexed)
                .await
                .map_err(TreeError::store)?,
        );
        match roots.into_iter().find(|root| &root.id != id) {
            Some(existing) => Err(TreeError::MultipleRoots {
                id: id.to_string(),
                existing: existing.id.to_string(),
            }),
            None => Ok(()),
        }
    }

    // Deepest row whose interval strictly contains `interval`.
    async fn enclosing_parent(&self, interval: Interval) -> Result<Option<S::Id>, TreeError> {
        let ancestors = self
            .store
            .select(RowFilter::Enclosing(interval))
            .await
            .map_err(TreeError::store)?;
        Ok(ancestors.into_iter().last().map(|record| record.id))
    }

    async fn refresh_group(&mut self, id: &S::Id) -> Result<(), TreeError> {
        let (record, interval) = self.fetch_indexed(id).await?;
        let is_group = interval.has_children();
        if record.is_group != is_group {
            self.store
                .set_group(id, is_group)
                .await
                .map_err(TreeError::store)?;
        }
        Ok(())
    }
}

/// Rows not contained by any other row, in `left` order.
fn top_level<Id: NodeKey>(sorted: Vec<NodeRecord<Id>>) -> Vec<NodeRecord<Id>> {
    let mut roots: Vec<NodeRecord<Id>> = Vec::new();
    let mut reach = 0;
    for record in sorted {
        let Some(interval) = record.interval else {
            continue;
        };
        if interval.left > reach {
            reach = interval.right;
            roots.push(record);
        }
    }
    roots
}
