use nestset_store::{Interval, NodeKey, NodeRecord};
use std::collections::HashMap;

use crate::{config::RebuildOrder, error::TreeError};

#[derive(Debug, Clone)]
struct FlatNode<Id> {
    id: Id,
    parent: Option<Id>,
    children: Vec<usize>,
}

/// Arena of rows linked by child indices, built from parent references only.
#[derive(Debug, Clone)]
pub(crate) struct FlatForest<Id> {
    nodes: Vec<FlatNode<Id>>,
    roots: Vec<usize>,
}

impl<Id: NodeKey> FlatForest<Id> {
    /// Link rows by their parent reference. Siblings keep the order given by
    /// `order`; rows arrive from the store sorted by `left`.
    pub(crate) fn from_parent_pointers(
        mut rows: Vec<NodeRecord<Id>>,
        order: RebuildOrder,
    ) -> Result<Self, TreeError> {
        match order {
            RebuildOrder::Id => rows.sort_by(|a, b| a.id.cmp(&b.id)),
            RebuildOrder::Existing => {}
        }

        let positions: HashMap<Id, usize> = rows
            .iter()
            .enumerate()
            .map(|(index, record)| (record.id.clone(), index))
            .collect();

        let mut nodes: Vec<FlatNode<Id>> = rows
            .into_iter()
            .map(|record| FlatNode {
                id: record.id,
                parent: record.parent,
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for index in 0..nodes.len() {
            let Some(parent) = nodes[index].parent.clone() else {
                roots.push(index);
                continue;
            };
            if parent == nodes[index].id {
                return Err(TreeError::Cycle {
                    id: parent.to_string(),
                    parent: parent.to_string(),
                });
            }
            let parent_index = *positions
                .get(&parent)
                .ok_or_else(|| TreeError::not_found(&parent))?;
            nodes[parent_index].children.push(index);
        }

        Ok(Self { nodes, roots })
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Ids of the rows with no parent reference, in sibling order.
    pub(crate) fn roots(&self) -> impl Iterator<Item = &Id> {
        self.roots.iter().map(|&index| &self.nodes[index].id)
    }

    /// Depth-first numbering from 1, pre-order on `left`, post-order on
    /// `right`. Iterative, so depth is bounded by the heap.
    pub(crate) fn number(self) -> Result<Vec<(Id, Interval)>, TreeError> {
        let mut lefts: Vec<Option<i64>> = vec![None; self.nodes.len()];
        let mut assigned: Vec<(usize, Interval)> = Vec::with_capacity(self.nodes.len());
        let mut counter: i64 = 1;
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for &root in &self.roots {
            lefts[root] = Some(counter);
            counter += 1;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (node, position) = *top;
                top.1 += 1;
                match self.nodes[node].children.get(position) {
                    Some(&child) => {
                        lefts[child] = Some(counter);
                        counter += 1;
                        stack.push((child, 0));
                    }
                    None => {
                        stack.pop();
                        let left = lefts[node].unwrap_or_default();
                        assigned.push((node, Interval::new(left, counter)));
                        counter += 1;
                    }
                }
            }
        }

        // Anything not reached from a root hangs off a parent-pointer loop.
        if let Some(stranded) = lefts.iter().position(Option::is_none) {
            let node = &self.nodes[stranded];
            return Err(TreeError::Cycle {
                id: node.id.to_string(),
                parent: node
                    .parent
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            });
        }

        assigned.sort_by_key(|(_, interval)| interval.left);
        let mut nodes: Vec<Option<FlatNode<Id>>> = self.nodes.into_iter().map(Some).collect();
        Ok(assigned
            .into_iter()
            .filter_map(|(index, interval)| nodes[index].take().map(|node| (node.id, interval)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&'static str, Option<&'static str>)]) -> Vec<NodeRecord<&'static str>> {
        pairs
            .iter()
            .map(|(id, parent)| NodeRecord::new(*id, *parent))
            .collect()
    }

    #[test]
    fn test_number_by_id() {
        let forest = FlatForest::from_parent_pointers(
            rows(&[("c", Some("a")), ("b", None), ("a", None), ("d", Some("a"))]),
            RebuildOrder::Id,
        )
        .unwrap();
        assert_eq!(forest.len(), 4);
        assert_eq!(forest.roots().collect::<Vec<_>>(), vec![&"a", &"b"]);

        let numbered = forest.number().unwrap();

        assert_eq!(
            numbered,
            vec![
                ("a", Interval::new(1, 6)),
                ("c", Interval::new(2, 3)),
                ("d", Interval::new(4, 5)),
                ("b", Interval::new(7, 8)),
            ]
        );
    }

    #[test]
    fn test_existing_order_is_kept() {
        let forest = FlatForest::from_parent_pointers(
            rows(&[("r", None), ("z", Some("r")), ("a", Some("r"))]),
            RebuildOrder::Existing,
        )
        .unwrap();

        let numbered = forest.number().unwrap();

        assert_eq!(numbered[1], ("z", Interval::new(2, 3)));
        assert_eq!(numbered[2], ("a", Interval::new(4, 5)));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let ids: Vec<u32> = (0..50_000).collect();
        let records = ids
            .iter()
            .map(|id| NodeRecord::new(*id, id.checked_sub(1)))
            .collect();
        let numbered = FlatForest::from_parent_pointers(records, RebuildOrder::Id)
            .unwrap()
            .number()
            .unwrap();

        assert_eq!(numbered[0], (0, Interval::new(1, 100_000)));
        assert_eq!(numbered[49_999], (49_999, Interval::new(50_000, 50_001)));
    }

    #[test]
    fn test_orphan_parent_is_not_found() {
        let error = FlatForest::from_parent_pointers(rows(&[("a", Some("ghost"))]), RebuildOrder::Id)
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_parent_loop_is_cycle() {
        let forest = FlatForest::from_parent_pointers(
            rows(&[("root", None), ("a", Some("b")), ("b", Some("a"))]),
            RebuildOrder::Id,
        )
        .unwrap();
        assert!(forest.number().unwrap_err().is_cycle());

        let error = FlatForest::from_parent_pointers(rows(&[("a", Some("a"))]), RebuildOrder::Id)
            .unwrap_err();
        assert!(error.is_cycle());
    }
}
