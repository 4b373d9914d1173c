//! Catalog tree use-case service.
//!
//! # Responsibility
//! - Enforce taxonomy invariants above the repository layer.
//! - Provide insert, update, delete, reference and content-replacement
//!   operations on the five-level tree.
//!
//! # Invariants
//! - A child's type must sit exactly one level below its parent's type.
//! - `path_id` never changes after insert; renames rewrite `path` only.
//! - Relation cleaners are notified after the delete has committed; their
//!   failures never roll back the delete.

use crate::config::ListConfig;
use crate::external::RelationCleaner;
use crate::model::node::{
    ensure_child_allowed, normalize_name, CatalogNode, EntityDraft, NodeDraft, NodeId, NodeType,
    NodeUpdate, NodeValidationError,
};
use crate::path;
use crate::repo::node_repo::{
    ListedNode, NodeListQuery, NodePage, NodeRepoError, NodeRepository,
};
use crate::repo::reference_graph::ReferenceGraph;
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Errors from catalog tree service operations.
#[derive(Debug)]
pub enum TreeServiceError {
    /// Node model rule violation.
    Validation(NodeValidationError),
    /// A direct sibling already uses this name.
    NameRepeat { name: String },
    /// A node with the caller-provided ID already exists.
    NodeExists(NodeId),
    /// Type change outside the allowed transition table.
    UnsupportedUpdateType { from: NodeType, to: NodeType },
    ParentNotFound(NodeId),
    NodeNotFound(NodeId),
    /// Reference target is missing or not a business object/activity.
    InvalidReference(NodeId),
    /// Node kind cannot carry references.
    ReferenceNotAllowed(NodeId),
    /// New references would make the node reach itself.
    CircularReference(NodeId),
    /// The logic entity already has a unique attribute.
    UniqueAttributeExists { entity_id: NodeId },
    /// Repository-level failure.
    Repo(NodeRepoError),
}

impl Display for TreeServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NameRepeat { name } => write!(f, "name `{name}` already used by a sibling"),
            Self::NodeExists(id) => write!(f, "catalog node already exists: {id}"),
            Self::UnsupportedUpdateType { from, to } => {
                write!(f, "node type cannot change from {from} to {to}")
            }
            Self::ParentNotFound(id) => write!(f, "parent node not found: {id}"),
            Self::NodeNotFound(id) => write!(f, "catalog node not found: {id}"),
            Self::InvalidReference(id) => {
                write!(f, "reference target must be a business object or activity: {id}")
            }
            Self::ReferenceNotAllowed(id) => {
                write!(f, "only business objects and activities carry references: {id}")
            }
            Self::CircularReference(id) => write!(f, "references would form a cycle at {id}"),
            Self::UniqueAttributeExists { entity_id } => {
                write!(f, "logic entity {entity_id} already has a unique attribute")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TreeServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeRepoError> for TreeServiceError {
    fn from(value: NodeRepoError) -> Self {
        match value {
            NodeRepoError::NodeNotFound(id) => Self::NodeNotFound(id),
            NodeRepoError::DuplicateName { name, .. } => Self::NameRepeat { name },
            NodeRepoError::UniqueAttributeTaken { entity_id } => {
                Self::UniqueAttributeExists { entity_id }
            }
            NodeRepoError::CircularReference(id) => Self::CircularReference(id),
            NodeRepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<NodeValidationError> for TreeServiceError {
    fn from(value: NodeValidationError) -> Self {
        Self::Validation(value)
    }
}

pub type TreeServiceResult<T> = Result<T, TreeServiceError>;

/// Catalog tree service facade.
pub struct TreeService<R: NodeRepository> {
    repo: R,
    cleaners: Vec<Arc<dyn RelationCleaner>>,
}

impl<R: NodeRepository> TreeService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            cleaners: Vec::new(),
        }
    }

    /// Registers a downstream service to notify about deleted entities.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn RelationCleaner>) -> Self {
        self.cleaners.push(cleaner);
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn get_node(&self, id: &NodeId) -> TreeServiceResult<CatalogNode> {
        self.load_node(id)
    }

    /// Direct children of `parent_id`, or top-level groups when `None`.
    pub fn list_children(&self, parent_id: Option<&NodeId>) -> TreeServiceResult<Vec<CatalogNode>> {
        let parent = self.load_parent(parent_id)?;
        self.repo
            .get_children(parent.as_ref().map(|p| p.path_id.as_str()), true)
            .map_err(Into::into)
    }

    /// One page of nodes; the page size is clamped by `list`.
    pub fn list_nodes(
        &self,
        query: &NodeListQuery,
        list: &ListConfig,
    ) -> TreeServiceResult<NodePage<ListedNode>> {
        let query = NodeListQuery {
            limit: Some(list.clamp_limit(query.limit)),
            ..query.clone()
        };
        self.repo.list_nodes(&query).map_err(|err| match err {
            NodeRepoError::NodeNotFound(id) => TreeServiceError::ParentNotFound(id),
            other => other.into(),
        })
    }

    /// Creates one node under `parent_id` (top level when `None`).
    pub fn insert(
        &self,
        parent_id: Option<&NodeId>,
        draft: NodeDraft,
        actor: &str,
    ) -> TreeServiceResult<CatalogNode> {
        let started_at = Instant::now();
        let parent = self.load_parent(parent_id)?;
        ensure_child_allowed(parent.as_ref().map(|p| p.node_type), draft.node_type)?;

        let draft = NodeDraft {
            name: normalize_name(&draft.name)?,
            ..draft
        };
        if let Some(id) = &draft.id {
            if self.repo.get_by_id(id)?.is_some() {
                return Err(TreeServiceError::NodeExists(id.clone()));
            }
        }

        let parent_path_id = parent.as_ref().map(|p| p.path_id.as_str());
        if self.repo.name_exists(parent_path_id, None, &draft.name)? {
            return Err(TreeServiceError::NameRepeat { name: draft.name });
        }

        let node = CatalogNode::from_draft(&draft, parent.as_ref(), actor);
        node.validate()?;
        self.repo.insert(&node)?;

        info!(
            "event=node_insert module=tree status=ok node_id={} node_type={} level={} duration_ms={}",
            node.id,
            node.node_type,
            node.level(),
            started_at.elapsed().as_millis()
        );
        self.load_node(&node.id)
    }

    /// Applies a partial update; a rename rewrites every descendant `path`.
    pub fn update(
        &self,
        id: &NodeId,
        update: NodeUpdate,
        actor: &str,
    ) -> TreeServiceResult<CatalogNode> {
        let started_at = Instant::now();
        let mut node = self.load_node(id)?;

        if let Some(to) = update.node_type {
            if !node.node_type.can_transition_to(to) {
                return Err(TreeServiceError::UnsupportedUpdateType {
                    from: node.node_type,
                    to,
                });
            }
            node.node_type = to;
        }

        let mut descendants = Vec::new();
        if let Some(name) = update.name {
            let name = normalize_name(&name)?;
            if name != node.name {
                if self
                    .repo
                    .name_exists(node.parent_path_id(), Some(&node.id), &name)?
                {
                    return Err(TreeServiceError::NameRepeat { name });
                }
                descendants = self.repo.get_children(Some(node.path_id.as_str()), false)?;
                path::rename_cascade(
                    &node.path,
                    &name,
                    descendants.iter_mut().map(|child| &mut child.path),
                );
                node.path = path::replace_last_segment(&node.path, &name);
                node.name = name;
            }
        }

        if let Some(description) = update.description {
            node.description = description;
        }
        if let Some(owner) = update.owner {
            node.owner = owner;
        }
        if let Some(standard_id) = update.standard_id {
            node.standard_id = standard_id;
        }
        if let Some(label_id) = update.label_id {
            node.label_id = label_id;
        }
        if let Some(unique) = update.unique {
            node.unique = unique;
        }

        node.updated_by = actor.to_string();
        node.validate()?;
        self.repo.update_with_descendants(&node, &descendants)?;

        info!(
            "event=node_update module=tree status=ok node_id={} renamed_descendants={} duration_ms={}",
            node.id,
            descendants.len(),
            started_at.elapsed().as_millis()
        );
        self.load_node(&node.id)
    }

    /// Deletes the node and its subtree; returns every deleted ID.
    pub fn delete(&self, id: &NodeId) -> TreeServiceResult<Vec<NodeId>> {
        let started_at = Instant::now();
        let node = self.load_node(id)?;
        let deleted = self.repo.delete_by_path_prefix(&node.path_id)?;

        info!(
            "event=node_delete module=tree status=ok node_id={} deleted={} duration_ms={}",
            node.id,
            deleted.len(),
            started_at.elapsed().as_millis()
        );
        self.notify_cleaners(&deleted);
        Ok(deleted.into_iter().map(|node| node.id).collect())
    }

    /// Returns whether `name` is already used by a direct child of
    /// `parent_id` (top level when `None`), ignoring `exclude_id`.
    pub fn check_name_repeat(
        &self,
        parent_id: Option<&NodeId>,
        name: &str,
        exclude_id: Option<&NodeId>,
    ) -> TreeServiceResult<bool> {
        let parent = self.load_parent(parent_id)?;
        self.repo
            .name_exists(
                parent.as_ref().map(|p| p.path_id.as_str()),
                exclude_id,
                name.trim(),
            )
            .map_err(Into::into)
    }

    /// Returns whether `id` would reach itself through `candidates`.
    pub fn check_circular_reference(
        &self,
        id: &NodeId,
        candidates: &[NodeId],
    ) -> TreeServiceResult<bool> {
        ReferenceGraph::new(&self.repo)
            .would_cycle(id, candidates)
            .map_err(Into::into)
    }

    /// Replaces the outgoing references of a business object/activity.
    pub fn set_references(
        &self,
        id: &NodeId,
        ref_ids: &[NodeId],
        actor: &str,
    ) -> TreeServiceResult<CatalogNode> {
        let node = self.load_node(id)?;
        if !node.node_type.is_business_object() {
            return Err(TreeServiceError::ReferenceNotAllowed(node.id));
        }

        let mut seen = HashSet::new();
        let targets: Vec<NodeId> = ref_ids
            .iter()
            .filter(|ref_id| seen.insert(*ref_id))
            .cloned()
            .collect();

        let found = self.repo.get_by_ids(&targets)?;
        for target in &targets {
            let valid = found
                .iter()
                .any(|candidate| &candidate.id == target && candidate.node_type.is_business_object());
            if !valid {
                return Err(TreeServiceError::InvalidReference(target.clone()));
            }
        }

        if let Err(err) = self.repo.replace_ref_ids(&node.id, &targets, actor) {
            if matches!(err, NodeRepoError::CircularReference(_)) {
                warn!(
                    "event=node_refs module=tree status=error node_id={} error=circular_reference",
                    node.id
                );
            }
            return Err(err.into());
        }
        info!(
            "event=node_refs module=tree status=ok node_id={} refs={}",
            node.id,
            targets.len()
        );
        self.load_node(&node.id)
    }

    /// Replaces every logic entity (and its attributes) under a business
    /// object/activity with `entities`, in one transaction.
    ///
    /// Returns the stored replacement nodes, entities before attributes.
    pub fn replace_business_object_content(
        &self,
        object_id: &NodeId,
        entities: Vec<EntityDraft>,
        actor: &str,
    ) -> TreeServiceResult<Vec<CatalogNode>> {
        let started_at = Instant::now();
        let object = self.load_node(object_id)?;
        if !object.node_type.is_business_object() {
            return Err(NodeValidationError::ChildTypeNotAllowed {
                parent: Some(object.node_type),
                child: NodeType::LogicEntity,
            }
            .into());
        }

        let mut batch_ids = HashSet::new();
        let mut entity_names = HashSet::new();
        let mut nodes = Vec::new();

        for draft in entities {
            ensure_child_allowed(Some(object.node_type), draft.entity.node_type)?;
            let entity_draft = NodeDraft {
                name: normalize_name(&draft.entity.name)?,
                ..draft.entity
            };
            if !entity_names.insert(entity_draft.name.clone()) {
                return Err(TreeServiceError::NameRepeat {
                    name: entity_draft.name,
                });
            }
            let entity = CatalogNode::from_draft(&entity_draft, Some(&object), actor);
            self.claim_batch_id(&object, &entity.id, &mut batch_ids)?;

            let mut attribute_names = HashSet::new();
            let mut unique_seen = false;
            let mut attributes = Vec::with_capacity(draft.attributes.len());
            for attribute_draft in draft.attributes {
                ensure_child_allowed(Some(entity.node_type), attribute_draft.node_type)?;
                let attribute_draft = NodeDraft {
                    name: normalize_name(&attribute_draft.name)?,
                    ..attribute_draft
                };
                if !attribute_names.insert(attribute_draft.name.clone()) {
                    return Err(TreeServiceError::NameRepeat {
                        name: attribute_draft.name,
                    });
                }
                if attribute_draft.unique {
                    if unique_seen {
                        return Err(TreeServiceError::UniqueAttributeExists {
                            entity_id: entity.id.clone(),
                        });
                    }
                    unique_seen = true;
                }
                let attribute = CatalogNode::from_draft(&attribute_draft, Some(&entity), actor);
                self.claim_batch_id(&object, &attribute.id, &mut batch_ids)?;
                attribute.validate()?;
                attributes.push(attribute);
            }

            entity.validate()?;
            nodes.push(entity);
            nodes.extend(attributes);
        }

        let removed = self.repo.replace_children(&object.path_id, &nodes)?;
        info!(
            "event=object_content_replace module=tree status=ok node_id={} removed={} inserted={} duration_ms={}",
            object.id,
            removed.len(),
            nodes.len(),
            started_at.elapsed().as_millis()
        );
        self.notify_cleaners(&removed);

        let mut stored = self.repo.get_children(Some(object.path_id.as_str()), false)?;
        stored.sort_by_key(|node| node.level());
        Ok(stored)
    }

    fn claim_batch_id(
        &self,
        object: &CatalogNode,
        id: &NodeId,
        batch_ids: &mut HashSet<NodeId>,
    ) -> TreeServiceResult<()> {
        if !batch_ids.insert(id.clone()) {
            return Err(TreeServiceError::NodeExists(id.clone()));
        }
        // IDs currently below the object are about to be removed and may be reused.
        if let Some(existing) = self.repo.get_by_id(id)? {
            if !path::is_descendant(&existing.path_id, &object.path_id) {
                return Err(TreeServiceError::NodeExists(id.clone()));
            }
        }
        Ok(())
    }

    fn notify_cleaners(&self, removed: &[CatalogNode]) {
        let entity_ids: Vec<NodeId> = removed
            .iter()
            .filter(|node| node.node_type == NodeType::LogicEntity)
            .map(|node| node.id.clone())
            .collect();
        if entity_ids.is_empty() {
            return;
        }

        for cleaner in &self.cleaners {
            match cleaner.remove_entity_relations(&entity_ids) {
                Ok(()) => info!(
                    "event=relation_cleanup module=tree status=ok cleaner={} entities={}",
                    cleaner.name(),
                    entity_ids.len()
                ),
                Err(err) => warn!(
                    "event=relation_cleanup module=tree status=degraded cleaner={} entities={} error={}",
                    cleaner.name(),
                    entity_ids.len(),
                    err
                ),
            }
        }
    }

    fn load_node(&self, id: &NodeId) -> TreeServiceResult<CatalogNode> {
        self.repo
            .get_by_id(id)?
            .ok_or_else(|| TreeServiceError::NodeNotFound(id.clone()))
    }

    fn load_parent(&self, parent_id: Option<&NodeId>) -> TreeServiceResult<Option<CatalogNode>> {
        let Some(parent_id) = parent_id else {
            return Ok(None);
        };
        self.repo
            .get_by_id(parent_id)?
            .map(Some)
            .ok_or_else(|| TreeServiceError::ParentNotFound(parent_id.clone()))
    }
}
