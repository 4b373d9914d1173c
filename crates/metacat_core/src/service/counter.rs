//! Linked-resource count rollup.
//!
//! # Responsibility
//! - Fetch direct per-leaf counts from every registered count service in
//!   one best-effort fan-out pass.
//! - Roll them up to subtree nodes or to top-level groups.
//!
//! # Invariants
//! - A failing count service zeroes its own kind only.
//! - Only leaf IDs of a kind are sent to that kind's service.

use crate::config::ListConfig;
use crate::external::{CountService, ExternalServiceError, ResourceKind};
use crate::fanout::{fanout_task, FanoutRunner, FanoutTask};
use crate::model::node::{CatalogNode, NodeId};
use crate::repo::node_repo::{NodeListQuery, NodePage, NodeRepoError, NodeRepoResult, NodeRepository};
use crate::rollup::{summarize, summarize_to_roots};
use log::{info, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Rolled-up counts of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub views: i64,
    pub indicators: i64,
    pub interfaces: i64,
}

impl NodeCounts {
    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::View => self.views,
            ResourceKind::Indicator => self.indicators,
            ResourceKind::InterfaceService => self.interfaces,
        }
    }

    fn set(&mut self, kind: ResourceKind, value: i64) {
        match kind {
            ResourceKind::View => self.views = value,
            ResourceKind::Indicator => self.indicators = value,
            ResourceKind::InterfaceService => self.interfaces = value,
        }
    }
}

/// Listed node annotated with rolled-up counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedNode {
    pub node: CatalogNode,
    pub has_child: bool,
    pub counts: NodeCounts,
}

enum Scope<'a> {
    Subtree(&'a [CatalogNode]),
    Global,
}

impl Scope<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Subtree(_) => "subtree",
            Self::Global => "global",
        }
    }
}

/// Resource count aggregator.
pub struct Counter<'r, R: NodeRepository> {
    repo: &'r R,
    runner: FanoutRunner,
    services: Vec<(ResourceKind, Arc<dyn CountService>)>,
}

impl<'r, R: NodeRepository> Counter<'r, R> {
    pub fn new(repo: &'r R, runner: FanoutRunner) -> Self {
        Self {
            repo,
            runner,
            services: Vec::new(),
        }
    }

    /// Registers the count service of one kind, replacing any earlier one.
    pub fn with_service(mut self, kind: ResourceKind, service: Arc<dyn CountService>) -> Self {
        self.services.retain(|(registered, _)| *registered != kind);
        self.services.push((kind, service));
        self
    }

    /// Counts for every node of the top-level group containing `group_id`.
    pub fn subtree_counts(&self, group_id: &NodeId) -> NodeRepoResult<HashMap<NodeId, NodeCounts>> {
        let started_at = Instant::now();
        let group = self
            .repo
            .get_by_id(group_id)?
            .ok_or_else(|| NodeRepoError::NodeNotFound(group_id.clone()))?;
        let nodes = self.repo.get_subtree(group.root_id())?;

        let direct = self.fetch_direct(Scope::Subtree(&nodes));
        let mut counts: HashMap<NodeId, NodeCounts> = nodes
            .iter()
            .map(|node| (node.id.clone(), NodeCounts::default()))
            .collect();
        for (kind, values) in &direct {
            let sums = summarize(nodes.iter().map(|node| node.path_id.as_str()), values);
            for (id, node_counts) in counts.iter_mut() {
                node_counts.set(*kind, sums.get(id.as_str()).copied().unwrap_or_default());
            }
        }

        info!(
            "event=count_rollup module=counter status=ok scope=subtree root_id={} nodes={} duration_ms={}",
            group.root_id(),
            nodes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(counts)
    }

    /// Counts for every top-level group, from process-wide leaf counts.
    pub fn root_counts(&self) -> NodeRepoResult<HashMap<NodeId, NodeCounts>> {
        let started_at = Instant::now();
        let roots = self.repo.get_children(None, true)?;
        let root_of = self.repo.root_relation()?;

        let direct = self.fetch_direct(Scope::Global);
        let mut counts: HashMap<NodeId, NodeCounts> = roots
            .iter()
            .map(|root| (root.id.clone(), NodeCounts::default()))
            .collect();
        for (kind, values) in &direct {
            let sums = summarize_to_roots(values, &root_of);
            for (id, node_counts) in counts.iter_mut() {
                node_counts.set(*kind, sums.get(id.as_str()).copied().unwrap_or_default());
            }
        }

        info!(
            "event=count_rollup module=counter status=ok scope=global roots={} duration_ms={}",
            roots.len(),
            started_at.elapsed().as_millis()
        );
        Ok(counts)
    }

    /// One listing page with rolled-up counts per row.
    ///
    /// A page made only of top-level groups uses the global scope; any
    /// other page is counted per distinct root subtree.
    pub fn list_nodes_with_counts(
        &self,
        query: &NodeListQuery,
        list: &ListConfig,
    ) -> NodeRepoResult<NodePage<CountedNode>> {
        let query = NodeListQuery {
            limit: Some(list.clamp_limit(query.limit)),
            ..query.clone()
        };
        let page = self.repo.list_nodes(&query)?;
        if page.items.is_empty() {
            return Ok(NodePage {
                items: Vec::new(),
                total: page.total,
            });
        }

        let counts = if page.items.iter().all(|item| item.node.is_root()) {
            self.root_counts()?
        } else {
            let roots: BTreeSet<&str> = page.items.iter().map(|item| item.node.root_id()).collect();
            let mut merged = HashMap::new();
            for root in roots {
                let root_id = NodeId::parse(root)?;
                merged.extend(self.subtree_counts(&root_id)?);
            }
            merged
        };

        let items = page
            .items
            .into_iter()
            .map(|item| CountedNode {
                counts: counts.get(&item.node.id).copied().unwrap_or_default(),
                node: item.node,
                has_child: item.has_child,
            })
            .collect();
        Ok(NodePage {
            items,
            total: page.total,
        })
    }

    fn fetch_direct(&self, scope: Scope<'_>) -> Vec<(ResourceKind, HashMap<NodeId, i64>)> {
        let mut slots: Vec<(ResourceKind, HashMap<NodeId, i64>)> = self
            .services
            .iter()
            .map(|(kind, _)| (*kind, HashMap::new()))
            .collect();

        let leaf_ids: HashMap<ResourceKind, Vec<NodeId>> = match &scope {
            Scope::Subtree(nodes) => self
                .services
                .iter()
                .map(|(kind, _)| {
                    let ids = nodes
                        .iter()
                        .filter(|node| node.node_type == kind.leaf_type())
                        .map(|node| node.id.clone())
                        .collect();
                    (*kind, ids)
                })
                .collect(),
            Scope::Global => HashMap::new(),
        };

        let global = matches!(scope, Scope::Global);
        let tasks: Vec<FanoutTask<'_, ExternalServiceError>> = slots
            .iter_mut()
            .zip(&self.services)
            .map(|((kind, slot), (_, service))| {
                let kind = *kind;
                let ids = leaf_ids.get(&kind);
                fanout_task(move |_| {
                    let values = if global {
                        service.query_count_all()?
                    } else {
                        match ids {
                            Some(ids) if !ids.is_empty() => service.query_count_by_ids(ids)?,
                            _ => HashMap::new(),
                        }
                    };
                    info!(
                        "event=count_fetch module=counter status=ok kind={} leaves={}",
                        kind.as_str(),
                        values.len()
                    );
                    *slot = values;
                    Ok(())
                })
            })
            .collect();

        let report = self.runner.run_best_effort(scope.label(), tasks);
        if report.failed > 0 {
            warn!(
                "event=count_fetch module=counter status=degraded scope={} failed_kinds={}",
                scope.label(),
                report.failed
            );
        }
        slots
    }
}
