//! Classification-label aggregation.
//!
//! # Responsibility
//! - Roll up classified-field counts per node, optionally per label.
//! - Shape the result as a flat list or as a tree.
//!
//! # Invariants
//! - Output shape is selected by `(root given, hierarchy enabled)`:
//!   groups only, direct children of the root, or the root plus every
//!   descendant.
//! - Tree display with a root always yields one tree rooted there.
//! - `total` always equals the sum of the label buckets when labels are
//!   requested; counts of unknown labels land in the unclassified bucket.
//! - Collaborator failures degrade the result and are never returned as
//!   errors.

use crate::config::ClassificationConfig;
use crate::external::{ClassificationService, LabelMeta};
use crate::model::node::{CatalogNode, NodeId, NodeType};
use crate::repo::node_repo::{NodeRepoError, NodeRepoResult, NodeRepository};
use crate::rollup::{summarize, LabelTally, Tally};
use log::{info, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassificationDisplay {
    #[default]
    Flat,
    Tree,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationQuery {
    pub root_id: Option<NodeId>,
    /// Per-label breakdown instead of plain totals.
    pub hierarchy: bool,
    pub display: ClassificationDisplay,
}

/// One label bucket of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    /// `None` for the unclassified bucket.
    pub label_id: Option<String>,
    pub name: String,
    pub color: String,
    pub sort_weight: i64,
    pub count: i64,
}

/// Aggregated classification figures of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub name: String,
    pub node_type: NodeType,
    pub path_id: String,
    pub path: String,
    pub total: i64,
    pub labels: Vec<LabelCount>,
    /// Filled only by tree display.
    pub children: Vec<ClassificationNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub nodes: Vec<ClassificationNode>,
    /// A collaborator call failed and part of the figures are missing.
    pub degraded: bool,
}

pub struct ClassificationAggregator<'r, R: NodeRepository> {
    repo: &'r R,
    service: Arc<dyn ClassificationService>,
    config: ClassificationConfig,
}

impl<'r, R: NodeRepository> ClassificationAggregator<'r, R> {
    pub fn new(
        repo: &'r R,
        service: Arc<dyn ClassificationService>,
        config: &ClassificationConfig,
    ) -> Self {
        Self {
            repo,
            service,
            config: config.clone(),
        }
    }

    pub fn query(&self, query: &ClassificationQuery) -> NodeRepoResult<ClassificationResult> {
        let started_at = Instant::now();
        let root = match &query.root_id {
            Some(root_id) => Some(
                self.repo
                    .get_by_id(root_id)?
                    .ok_or_else(|| NodeRepoError::NodeNotFound(root_id.clone()))?,
            ),
            None => None,
        };

        let scope = match (root, query.hierarchy) {
            (None, _) => self.repo.get_children(None, true)?,
            (Some(root), false) => {
                let children = self.repo.get_children(Some(root.path_id.as_str()), true)?;
                // Tree display hangs the direct children under the root.
                match query.display {
                    ClassificationDisplay::Flat => children,
                    ClassificationDisplay::Tree => {
                        std::iter::once(root).chain(children).collect()
                    }
                }
            }
            (Some(root), true) => self.repo.get_subtree(&root.path_id)?,
        };

        let mut degraded = false;
        let rows = match self
            .service
            .query_raw_classification(query.root_id.as_ref(), query.hierarchy)
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!("event=classification_query module=classification status=degraded stage=raw error={err}");
                degraded = true;
                Vec::new()
            }
        };

        let mut direct: HashMap<NodeId, LabelTally> = HashMap::new();
        for row in &rows {
            let label = if query.hierarchy {
                row.label_id.as_deref()
            } else {
                None
            };
            direct
                .entry(row.node_id.clone())
                .or_default()
                .absorb(&LabelTally::single(row.classified_count, label));
        }
        let sums = summarize(rows.iter().map(|row| row.path_id.as_str()), &direct);

        let meta = if query.hierarchy {
            let label_ids: Vec<String> = sums
                .values()
                .flat_map(|tally| tally.by_label.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            self.load_label_meta(&label_ids, &mut degraded)
        } else {
            HashMap::new()
        };

        let nodes: Vec<ClassificationNode> = scope
            .into_iter()
            .map(|node| {
                let tally = sums.get(node.id.as_str()).cloned().unwrap_or_default();
                let labels = if query.hierarchy {
                    self.label_buckets(&tally, &meta)
                } else {
                    Vec::new()
                };
                to_classification_node(node, tally.total, labels)
            })
            .collect();

        let node_count = nodes.len();
        let nodes = match query.display {
            ClassificationDisplay::Flat => nodes,
            ClassificationDisplay::Tree => assemble_tree(nodes, query.root_id.as_ref()),
        };

        info!(
            "event=classification_query module=classification status={} rows={} nodes={} duration_ms={}",
            if degraded { "degraded" } else { "ok" },
            rows.len(),
            node_count,
            started_at.elapsed().as_millis()
        );
        Ok(ClassificationResult { nodes, degraded })
    }

    fn load_label_meta(&self, label_ids: &[String], degraded: &mut bool) -> HashMap<String, LabelMeta> {
        if label_ids.is_empty() {
            return HashMap::new();
        }
        match self.service.query_label_meta(label_ids) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("event=classification_query module=classification status=degraded stage=label_meta error={err}");
                *degraded = true;
                HashMap::new()
            }
        }
    }

    /// Known labels sorted by weight then name, then the unclassified
    /// remainder if any.
    fn label_buckets(&self, tally: &LabelTally, meta: &HashMap<String, LabelMeta>) -> Vec<LabelCount> {
        let mut buckets: Vec<LabelCount> = tally
            .by_label
            .iter()
            .filter_map(|(label_id, count)| {
                meta.get(label_id).map(|meta| LabelCount {
                    label_id: Some(label_id.clone()),
                    name: meta.name.clone(),
                    color: meta.color.clone(),
                    sort_weight: meta.sort_weight,
                    count: *count,
                })
            })
            .collect();
        buckets.sort_by(|a, b| {
            a.sort_weight
                .cmp(&b.sort_weight)
                .then_with(|| a.name.cmp(&b.name))
        });

        let known: i64 = buckets.iter().map(|bucket| bucket.count).sum();
        if tally.total > known {
            buckets.push(LabelCount {
                label_id: None,
                name: self.config.unclassified_name.clone(),
                color: self.config.unclassified_color.clone(),
                sort_weight: i64::MAX,
                count: tally.total - known,
            });
        }
        buckets
    }
}

fn to_classification_node(node: CatalogNode, total: i64, labels: Vec<LabelCount>) -> ClassificationNode {
    let parent_id = node
        .parent_path_id()
        .map(crate::path::last_segment)
        .and_then(|id| NodeId::parse(id).ok());
    ClassificationNode {
        id: node.id,
        parent_id,
        name: node.name,
        node_type: node.node_type,
        path_id: node.path_id,
        path: node.path,
        total,
        labels,
        children: Vec::new(),
    }
}

/// Groups a flat list under parents by `parent_id`.
///
/// Nodes whose parent is not in the list become roots. With `root_id` set,
/// only the tree rooted at that node is returned. Sibling order follows
/// the input order.
pub fn assemble_tree(
    nodes: Vec<ClassificationNode>,
    root_id: Option<&NodeId>,
) -> Vec<ClassificationNode> {
    let index_of: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.clone(), index))
        .collect();
    let parent_index: Vec<Option<usize>> = nodes
        .iter()
        .map(|node| {
            node.parent_id
                .as_ref()
                .and_then(|parent| index_of.get(parent).copied())
        })
        .collect();

    // Deepest first so every subtree is complete before it is attached.
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|a, b| {
        crate::path::level(&nodes[*b].path_id)
            .cmp(&crate::path::level(&nodes[*a].path_id))
            .then_with(|| b.cmp(a))
    });

    let mut slots: Vec<Option<ClassificationNode>> = nodes.into_iter().map(Some).collect();
    for index in order {
        let Some(parent) = parent_index[index] else {
            continue;
        };
        if let Some(mut node) = slots[index].take() {
            node.children.reverse();
            if let Some(parent) = slots[parent].as_mut() {
                parent.children.push(node);
            }
        }
    }

    let mut roots: Vec<ClassificationNode> = slots
        .into_iter()
        .flatten()
        .map(|mut node| {
            node.children.reverse();
            node
        })
        .collect();
    if let Some(root_id) = root_id {
        roots.retain(|node| &node.id == root_id);
    }
    roots
}
