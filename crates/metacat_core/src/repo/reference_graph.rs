//! Business-object reference cycle detection.
//!
//! # Invariants
//! - Each node is expanded at most once per check.
//! - One repository round-trip per BFS layer.
//! - Run against a repository bound to a write transaction, the check sees
//!   exactly the edges that transaction will commit against.

use crate::model::node::NodeId;
use super::node_repo::{NodeRepoResult, NodeRepository};
use std::collections::HashSet;

/// Read-only view over reference edges stored in the node repository.
pub struct ReferenceGraph<'r, R: NodeRepository + ?Sized> {
    repo: &'r R,
}

impl<'r, R: NodeRepository + ?Sized> ReferenceGraph<'r, R> {
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Returns whether pointing `node_id` at `candidates` would close a cycle.
    ///
    /// True iff `node_id` is reachable from any candidate by following
    /// stored `ref_ids` edges, including `node_id` being a candidate itself.
    pub fn would_cycle(&self, node_id: &NodeId, candidates: &[NodeId]) -> NodeRepoResult<bool> {
        if candidates.contains(node_id) {
            return Ok(true);
        }

        let mut visited: HashSet<NodeId> = candidates.iter().cloned().collect();
        let mut frontier: Vec<NodeId> = visited.iter().cloned().collect();

        while !frontier.is_empty() {
            let edges = self.repo.ref_ids_of(&frontier)?;
            let mut next = Vec::new();
            for target in edges.into_values().flatten() {
                if &target == node_id {
                    return Ok(true);
                }
                if visited.insert(target.clone()) {
                    next.push(target);
                }
            }
            frontier = next;
        }
        Ok(false)
    }
}
