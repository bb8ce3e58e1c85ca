mod common;

use nestset_store::{MemoryStore, NodeRecord};
use nestset_tree::{IntervalIndex, MoveTarget, RebuildOrder, TreeConfig, audit};
use proptest::prelude::*;

use crate::common::{init_tracing, intervals};

#[derive(Debug, Clone)]
enum Op {
    Create { parent: Option<usize> },
    Move { node: usize, parent: Option<usize> },
    Delete { node: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => proptest::option::of(any::<usize>()).prop_map(|parent| Op::Create { parent }),
        3 => (any::<usize>(), proptest::option::of(any::<usize>()))
            .prop_map(|(node, parent)| Op::Move { node, parent }),
        1 => any::<usize>().prop_map(|node| Op::Delete { node }),
    ]
}

fn arb_move_target() -> impl Strategy<Value = MoveTarget> {
    prop_oneof![Just(MoveTarget::Derived), Just(MoveTarget::Reread)]
}

fn rows(store: &MemoryStore<u32>) -> Vec<NodeRecord<u32>> {
    store.records().cloned().collect()
}

fn descendants(rows: &[NodeRecord<u32>], id: u32) -> Vec<u32> {
    let Some(outer) = rows.iter().find(|r| r.id == id).and_then(|r| r.interval) else {
        return Vec::new();
    };
    rows.iter()
        .filter(|r| r.interval.is_some_and(|inner| outer.contains(&inner)))
        .map(|r| r.id)
        .collect()
}

fn interval_ancestors(rows: &[NodeRecord<u32>], id: u32) -> Vec<u32> {
    let Some(inner) = rows.iter().find(|r| r.id == id).and_then(|r| r.interval) else {
        return Vec::new();
    };
    let mut ancestors: Vec<_> = rows
        .iter()
        .filter_map(|r| r.interval.filter(|outer| outer.contains(&inner)).map(|outer| (outer.left, r.id)))
        .collect();
    ancestors.sort();
    ancestors.into_iter().map(|(_, id)| id).collect()
}

fn parent_chain(rows: &[NodeRecord<u32>], id: u32) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut current = rows.iter().find(|r| r.id == id).and_then(|r| r.parent);
    while let Some(parent) = current {
        chain.push(parent);
        current = rows.iter().find(|r| r.id == parent).and_then(|r| r.parent);
    }
    chain.reverse();
    chain
}

struct Harness {
    store: MemoryStore<u32>,
    config: TreeConfig,
    next_id: u32,
}

impl Harness {
    fn new(config: TreeConfig) -> Self {
        Self {
            store: MemoryStore::new(),
            config,
            next_id: 0,
        }
    }

    fn pick(&self, choice: usize) -> Option<u32> {
        let live: Vec<u32> = self.store.records().map(|r| r.id).collect();
        (!live.is_empty()).then(|| live[choice % live.len()])
    }

    async fn apply(&mut self, op: &Op) -> Result<(), TestCaseError> {
        match *op {
            Op::Create { parent } => {
                let id = self.next_id;
                self.next_id += 1;
                let parent = parent.and_then(|choice| self.pick(choice));
                self.store.put_record(id, parent).unwrap();
                let mut index = IntervalIndex::new(&mut self.store, &self.config);
                let result = match parent {
                    Some(parent) => index.insert_child(&id, &parent).await,
                    None => index.insert_root(&id).await,
                };
                prop_assert!(result.is_ok(), "create failed: {result:?}");
            }
            Op::Move { node, parent } => {
                let Some(node) = self.pick(node) else {
                    return Ok(());
                };
                let parent = parent.and_then(|choice| self.pick(choice));
                let before = rows(&self.store);
                let mut subtree = descendants(&before, node);
                subtree.sort_unstable();
                let cyclic = parent.is_some_and(|p| p == node || subtree.contains(&p));

                let result = IntervalIndex::new(&mut self.store, &self.config)
                    .move_subtree(&node, parent.as_ref())
                    .await;

                if cyclic {
                    prop_assert!(result.is_err_and(|error| error.is_cycle()));
                    prop_assert_eq!(rows(&self.store), before);
                } else {
                    let moved = result.map_err(|error| TestCaseError::fail(error.to_string()))?;
                    self.store.set_parent(&node, parent).unwrap();
                    let after = rows(&self.store);
                    let mut moved_subtree = descendants(&after, node);
                    moved_subtree.sort_unstable();
                    prop_assert_eq!(&moved_subtree, &subtree);
                    let count = i64::try_from(subtree.len()).unwrap();
                    prop_assert_eq!(moved.right - moved.left, 2 * count + 1);
                }
            }
            Op::Delete { node } => {
                let Some(node) = self.pick(node) else {
                    return Ok(());
                };
                let mut doomed = descendants(&rows(&self.store), node);
                doomed.push(node);
                doomed.sort_unstable();

                let mut removed = IntervalIndex::new(&mut self.store, &self.config)
                    .delete_subtree(&node)
                    .await
                    .map_err(|error| TestCaseError::fail(error.to_string()))?;
                removed.sort_unstable();
                prop_assert_eq!(removed, doomed);
            }
        }
        self.check()
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let rows = rows(&self.store);
        prop_assert_eq!(audit(&rows), Ok(()));
        prop_assert!(!self.store.records().any(|r| r.interval.is_none()));
        for record in &rows {
            prop_assert_eq!(
                interval_ancestors(&rows, record.id),
                parent_chain(&rows, record.id)
            );
        }
        Ok(())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn invariants_hold_after_every_operation(
        ops in prop::collection::vec(arb_op(), 1..40),
        move_target in arb_move_target(),
    ) {
        init_tracing();
        runtime().block_on(async {
            let mut harness = Harness::new(TreeConfig { move_target, ..TreeConfig::default() });
            for op in &ops {
                harness.apply(op).await?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn rebuild_reproduces_containment(ops in prop::collection::vec(arb_op(), 1..40)) {
        init_tracing();
        runtime().block_on(async {
            let mut harness = Harness::new(TreeConfig::default());
            for op in &ops {
                harness.apply(op).await?;
            }
            let original = rows(&harness.store);

            let mut raw = MemoryStore::from_records(
                original.iter().map(|r| NodeRecord::new(r.id, r.parent)),
            );
            let config = TreeConfig::default();
            let count = IntervalIndex::new(&mut raw, &config)
                .rebuild_from_parent_pointers()
                .await
                .map_err(|error| TestCaseError::fail(error.to_string()))?;
            prop_assert_eq!(count, original.len());

            let rebuilt = rows(&raw);
            prop_assert_eq!(audit(&rebuilt), Ok(()));
            for record in &original {
                let mut expected = descendants(&original, record.id);
                let mut actual = descendants(&rebuilt, record.id);
                expected.sort_unstable();
                actual.sort_unstable();
                prop_assert_eq!(actual, expected);
                prop_assert_eq!(
                    interval_ancestors(&rebuilt, record.id),
                    interval_ancestors(&original, record.id)
                );
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn rebuild_in_existing_order_is_identity(ops in prop::collection::vec(arb_op(), 1..40)) {
        init_tracing();
        runtime().block_on(async {
            let mut harness = Harness::new(TreeConfig::default());
            for op in &ops {
                harness.apply(op).await?;
            }
            let before = intervals(&harness.store);

            let config = TreeConfig { rebuild_order: RebuildOrder::Existing, ..TreeConfig::default() };
            IntervalIndex::new(&mut harness.store, &config)
                .rebuild_from_parent_pointers()
                .await
                .map_err(|error| TestCaseError::fail(error.to_string()))?;

            prop_assert_eq!(intervals(&harness.store), before);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
