//! Leaf-to-ancestor rollup over materialized paths.
//!
//! # Responsibility
//! - Turn per-leaf direct values into per-node subtree sums.
//! - Stay generic over the summed value (plain counts or per-label tallies).
//!
//! # Invariants
//! - `rollup(N)` equals the sum of direct values of N and every node below
//!   it; each `path_id` contributes once even if listed twice.
//! - Pure computation: no I/O, no suspension.

use crate::model::node::NodeId;
use crate::path::split_ancestors;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Value that can be summed up an ancestor chain.
pub trait Tally: Default + Clone {
    fn absorb(&mut self, other: &Self);
}

impl Tally for i64 {
    fn absorb(&mut self, other: &Self) {
        *self += *other;
    }
}

/// Classified-field tally: overall total plus a per-label breakdown.
///
/// Counts without a label only contribute to `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTally {
    pub total: i64,
    pub by_label: BTreeMap<String, i64>,
}

impl LabelTally {
    pub fn single(count: i64, label_id: Option<&str>) -> Self {
        let mut tally = Self {
            total: count,
            by_label: BTreeMap::new(),
        };
        if let Some(label_id) = label_id {
            tally.by_label.insert(label_id.to_string(), count);
        }
        tally
    }
}

impl Tally for LabelTally {
    fn absorb(&mut self, other: &Self) {
        self.total += other.total;
        for (label_id, count) in &other.by_label {
            *self.by_label.entry(label_id.clone()).or_default() += count;
        }
    }
}

/// Rolls direct values up every ancestor chain.
///
/// Each `path_id` is split into its ID chain; the direct value of the last
/// segment is added to that node and to every strict ancestor. Every node
/// in `path_ids` gets an entry, zero when nothing below it has a value.
pub fn summarize<'p, V, I>(path_ids: I, direct: &HashMap<NodeId, V>) -> HashMap<String, V>
where
    V: Tally,
    I: IntoIterator<Item = &'p str>,
{
    let mut seen = HashSet::new();
    let mut acc: HashMap<String, V> = HashMap::new();

    for path_id in path_ids {
        if !seen.insert(path_id) {
            continue;
        }
        let chain = split_ancestors(path_id);
        let Some((own_id, _)) = chain.split_last() else {
            continue;
        };

        match direct.get(*own_id) {
            Some(value) => {
                for segment in &chain {
                    acc.entry((*segment).to_string()).or_default().absorb(value);
                }
            }
            None => {
                acc.entry((*own_id).to_string()).or_default();
            }
        }
    }
    acc
}

/// Rolls direct values up to root ancestors only.
///
/// `root_of` maps every node ID to its top-level group ID. Leaves missing
/// from the relation are ignored.
pub fn summarize_to_roots<V>(
    direct: &HashMap<NodeId, V>,
    root_of: &HashMap<NodeId, NodeId>,
) -> HashMap<String, V>
where
    V: Tally,
{
    let mut acc: HashMap<String, V> = HashMap::new();
    for (leaf_id, value) in direct {
        if let Some(root_id) = root_of.get(leaf_id) {
            acc.entry(root_id.to_string()).or_default().absorb(value);
        }
    }
    acc
}
