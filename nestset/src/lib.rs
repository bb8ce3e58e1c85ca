//! Nested-set tree maintenance for a flat record table.
//!
//! A persistence layer owns the records and their parent reference. After it
//! creates, reparents or removes a record it calls the matching hook on
//! [`Tree`], which keeps the `(left, right)` intervals and group flags in step.
//! Traversal queries are pure interval comparisons over the same table.

mod query;

use nestset_tree::IntervalIndex;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use nestset_store::{
    Column, Interval, MemoryStore, MemoryStoreError, NodeKey, NodeRecord, NodeStore, RowFilter,
    Threshold,
};
pub use nestset_tree::{
    BoxError, DeletePolicy, MoveTarget, RebuildOrder, TreeConfig, TreeError, Violation, audit,
};

/// One tree over one node table.
///
/// Mutations hold the write lock for their whole transaction, so no two
/// structural changes ever interleave and readers never observe a half-shifted
/// table. Reads share the lock.
#[derive(Debug)]
pub struct Tree<S> {
    store: RwLock<S>,
    config: TreeConfig,
}

impl<S: NodeStore> Tree<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, TreeConfig::default())
    }

    pub fn with_config(store: S, config: TreeConfig) -> Self {
        Self {
            store: RwLock::new(store),
            config,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn into_inner(self) -> S {
        self.store.into_inner()
    }

    /// Run `f` against the store under the write lock, e.g. to create or
    /// update records on behalf of the persistence layer.
    pub async fn with_store<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, TreeError> {
        let mut store = self.write().await?;
        Ok(f(&mut *store))
    }

    /// Index a freshly created record as a root or as the last child of
    /// `parent`.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn on_record_created(
        &self,
        id: &S::Id,
        parent: Option<&S::Id>,
    ) -> Result<Interval, TreeError> {
        let mut store = self.write().await?;
        let mut index = IntervalIndex::new(&mut *store, &self.config);
        match parent {
            Some(parent) => index.insert_child(id, parent).await,
            None => index.insert_root(id).await,
        }
    }

    /// Follow a change of the parent reference. Returns the subtree's new
    /// interval, or `None` when the reference did not actually change.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn on_parent_changed(
        &self,
        id: &S::Id,
        old_parent: Option<&S::Id>,
        new_parent: Option<&S::Id>,
    ) -> Result<Option<Interval>, TreeError> {
        if old_parent == new_parent {
            tracing::trace!("Parent unchanged");
            return Ok(None);
        }
        let mut store = self.write().await?;
        IntervalIndex::new(&mut *store, &self.config)
            .move_subtree(id, new_parent)
            .await
            .map(Some)
    }

    /// Drop the intervals of a record and its whole subtree. Returns the ids
    /// of every removed row.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn on_record_removed(&self, id: &S::Id) -> Result<Vec<S::Id>, TreeError> {
        let mut store = self.write().await?;
        IntervalIndex::new(&mut *store, &self.config)
            .delete_subtree(id)
            .await
    }

    /// Renumber the whole table from parent references.
    #[tracing::instrument(skip_all)]
    pub async fn rebuild(&self) -> Result<usize, TreeError> {
        let mut store = self.write().await?;
        IntervalIndex::new(&mut *store, &self.config)
            .rebuild_from_parent_pointers()
            .await
    }

    /// Check every nested-set invariant without changing anything.
    #[tracing::instrument(skip_all)]
    pub async fn audit(&self) -> Result<(), TreeError> {
        let store = self.read().await?;
        let rows = store
            .select(RowFilter::Indexed)
            .await
            .map_err(TreeError::store)?;
        audit(&rows).map_err(TreeError::from)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, S>, TreeError> {
        let mut store = self.store.write().await;
        ensure_recovered(&mut *store).await?;
        Ok(store)
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, S>, TreeError> {
        {
            let store = self.store.read().await;
            if !store.in_transaction() {
                return Ok(store);
            }
        }
        drop(self.write().await?);
        Ok(self.store.read().await)
    }
}

// A transaction still open when the lock is taken belongs to an operation
// whose future was dropped mid-flight.
async fn ensure_recovered<S: NodeStore>(store: &mut S) -> Result<(), TreeError> {
    if store.in_transaction() {
        tracing::warn!("Rolling back a transaction left open by an interrupted operation");
        store.rollback().await.map_err(TreeError::store)?;
    }
    Ok(())
}
