use nestset_store::{Interval, NodeKey, NodeRecord, NodeStore, RowFilter};
use nestset_tree::TreeError;

use crate::Tree;

// The stored group flag is a cache; the interval is the truth.
fn normalize<Id: NodeKey>(mut record: NodeRecord<Id>) -> NodeRecord<Id> {
    let derived = record.derived_group();
    if record.is_group != derived {
        tracing::warn!(
            id = %record.id,
            stored = record.is_group,
            "Stored group flag disagrees with interval"
        );
        record.is_group = derived;
    }
    record
}

fn normalize_all<Id: NodeKey>(records: Vec<NodeRecord<Id>>) -> Vec<NodeRecord<Id>> {
    records.into_iter().map(normalize).collect()
}

impl<S: NodeStore> Tree<S> {
    /// Point lookup. `None` when the record does not exist.
    pub async fn get(&self, id: &S::Id) -> Result<Option<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let record = store.get(id).await.map_err(TreeError::store)?;
        Ok(record.map(normalize))
    }

    /// Indexed rows whose parent reference is `parent` (roots for `None`),
    /// in `left` order. Rows still awaiting their creation hook are left out.
    pub async fn children(
        &self,
        parent: Option<&S::Id>,
    ) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        let mut children = self.select(RowFilter::ChildrenOf(parent.cloned())).await?;
        children.retain(NodeRecord::is_indexed);
        Ok(children)
    }

    /// The row named by `id`'s parent reference, `None` for a root.
    pub async fn parent(&self, id: &S::Id) -> Result<Option<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let record = fetch(&*store, id).await?;
        let Some(parent) = record.parent else {
            return Ok(None);
        };
        let parent = fetch(&*store, &parent).await?;
        Ok(Some(normalize(parent)))
    }

    /// Every row enclosing `id`, root first.
    pub async fn ancestors(&self, id: &S::Id) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        self.select_around(id, RowFilter::Enclosing).await
    }

    /// Every row enclosed by `id`, in pre-order.
    pub async fn descendants(&self, id: &S::Id) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        self.select_around(id, RowFilter::Enclosed).await
    }

    /// Children of `id`'s parent, without `id` itself.
    pub async fn siblings(&self, id: &S::Id) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let parent = fetch(&*store, id).await?.parent;
        let mut siblings = store
            .select(RowFilter::ChildrenOf(parent))
            .await
            .map_err(TreeError::store)?;
        siblings.retain(|record| record.is_indexed() && &record.id != id);
        Ok(normalize_all(siblings))
    }

    /// Ancestors followed by the row itself.
    pub async fn path(&self, id: &S::Id) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let (record, interval) = fetch_indexed(&*store, id).await?;
        let mut path = store
            .select(RowFilter::Enclosing(interval))
            .await
            .map_err(TreeError::store)?;
        path.push(record);
        Ok(normalize_all(path))
    }

    pub async fn leaves(&self) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        self.select(RowFilter::Leaves).await
    }

    pub async fn roots(&self) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        self.children(None).await
    }

    /// Outermost ancestor of `id`, or `id` itself when it is top-level.
    pub async fn root_of(&self, id: &S::Id) -> Result<NodeRecord<S::Id>, TreeError> {
        let mut path = self.path(id).await?;
        // path always ends with `id`, so it is never empty
        Ok(path.swap_remove(0))
    }

    /// Number of ancestors; a root has depth 0.
    pub async fn depth(&self, id: &S::Id) -> Result<usize, TreeError> {
        Ok(self.ancestors(id).await?.len())
    }

    /// Number of rows below `id`, read off its width alone.
    pub async fn descendant_count(&self, id: &S::Id) -> Result<u64, TreeError> {
        let interval = self.anchor(id).await?;
        Ok(u64::try_from(interval.descendant_count()).unwrap_or_default())
    }

    /// Whether `ancestor` strictly encloses `descendant`.
    pub async fn is_ancestor_of(
        &self,
        ancestor: &S::Id,
        descendant: &S::Id,
    ) -> Result<bool, TreeError> {
        let store = self.read().await?;
        let (_, outer) = fetch_indexed(&*store, ancestor).await?;
        let (_, inner) = fetch_indexed(&*store, descendant).await?;
        Ok(outer.contains(&inner))
    }

    pub async fn is_descendant_of(
        &self,
        descendant: &S::Id,
        ancestor: &S::Id,
    ) -> Result<bool, TreeError> {
        self.is_ancestor_of(ancestor, descendant).await
    }

    async fn select(
        &self,
        filter: RowFilter<S::Id>,
    ) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let records = store.select(filter).await.map_err(TreeError::store)?;
        Ok(normalize_all(records))
    }

    // Rows related to `id` by interval, read under one lock.
    async fn select_around(
        &self,
        id: &S::Id,
        filter: impl FnOnce(Interval) -> RowFilter<S::Id>,
    ) -> Result<Vec<NodeRecord<S::Id>>, TreeError> {
        let store = self.read().await?;
        let (_, interval) = fetch_indexed(&*store, id).await?;
        let records = store
            .select(filter(interval))
            .await
            .map_err(TreeError::store)?;
        Ok(normalize_all(records))
    }

    async fn anchor(&self, id: &S::Id) -> Result<Interval, TreeError> {
        let store = self.read().await?;
        let (_, interval) = fetch_indexed(&*store, id).await?;
        Ok(interval)
    }
}

async fn fetch<S: NodeStore>(store: &S, id: &S::Id) -> Result<NodeRecord<S::Id>, TreeError> {
    store
        .get(id)
        .await
        .map_err(TreeError::store)?
        .ok_or_else(|| TreeError::not_found(id))
}

async fn fetch_indexed<S: NodeStore>(
    store: &S,
    id: &S::Id,
) -> Result<(NodeRecord<S::Id>, Interval), TreeError> {
    let record = fetch(store, id).await?;
    match record.interval {
        Some(interval) => Ok((record, interval)),
        None => Err(TreeError::not_indexed(id)),
    }
}
