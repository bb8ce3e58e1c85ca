#![allow(dead_code)]

use nestset_store::{Interval, MemoryStore, NodeKey, NodeStore};
use nestset_tree::{IntervalIndex, TreeConfig};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Create the row the way the persistence layer would, then index it.
pub async fn create<Id: NodeKey>(
    store: &mut MemoryStore<Id>,
    config: &TreeConfig,
    id: Id,
    parent: Option<Id>,
) -> Interval {
    store.put_record(id.clone(), parent.clone()).unwrap();
    let mut index = IntervalIndex::new(store, config);
    match parent {
        Some(parent) => index.insert_child(&id, &parent).await.unwrap(),
        None => index.insert_root(&id).await.unwrap(),
    }
}

pub fn interval<Id: NodeKey>(store: &MemoryStore<Id>, id: &Id) -> Interval {
    store.record(id).and_then(|record| record.interval).unwrap()
}

pub fn intervals<Id: NodeKey>(store: &MemoryStore<Id>) -> Vec<(Id, Interval)> {
    store
        .records()
        .filter_map(|record| record.interval.map(|interval| (record.id.clone(), interval)))
        .collect()
}

/// R(A(C), B), the tree after scenario 2.
pub async fn scenario_two(config: &TreeConfig) -> MemoryStore<&'static str> {
    let mut store = MemoryStore::new();
    create(&mut store, config, "R", None).await;
    create(&mut store, config, "A", Some("R")).await;
    create(&mut store, config, "B", Some("R")).await;
    create(&mut store, config, "C", Some("A")).await;
    assert!(!store.in_transaction());
    store
}
