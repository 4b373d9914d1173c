//! Capability contracts for external collaborators.
//!
//! # Responsibility
//! - Declare one trait per external service the core consumes.
//! - Keep core logic independent from concrete clients so tests can
//!   substitute in-memory doubles.
//!
//! # Invariants
//! - Implementations are `Send + Sync`; aggregation calls them from
//!   fan-out worker threads.
//! - A failed call is reported as `ExternalServiceError`, never a panic.

use crate::model::node::{NodeId, NodeType};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ExternalResult<T> = Result<T, ExternalServiceError>;

/// Failure of one external service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalServiceError {
    /// Short service name, e.g. `view_count`.
    pub service: String,
    pub message: String,
}

impl ExternalServiceError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl Display for ExternalServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} call failed: {}", self.service, self.message)
    }
}

impl Error for ExternalServiceError {}

/// Linked-resource kinds counted per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    View,
    Indicator,
    InterfaceService,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::View,
        ResourceKind::Indicator,
        ResourceKind::InterfaceService,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Indicator => "indicator",
            Self::InterfaceService => "interface_service",
        }
    }

    /// Level whose nodes carry direct counts for this kind.
    pub fn leaf_type(self) -> NodeType {
        match self {
            Self::View | Self::Indicator | Self::InterfaceService => NodeType::LogicEntity,
        }
    }
}

/// Count service for one resource kind.
pub trait CountService: Send + Sync {
    /// Direct counts for the given leaf IDs. IDs without resources may be
    /// absent from the result.
    fn query_count_by_ids(&self, ids: &[NodeId]) -> ExternalResult<HashMap<NodeId, i64>>;
    /// Direct counts for every leaf known to the service.
    fn query_count_all(&self) -> ExternalResult<HashMap<NodeId, i64>>;
}

/// One raw classification row: classified fields of one node, optionally
/// bucketed by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRow {
    pub node_id: NodeId,
    pub path_id: String,
    pub path_name: String,
    pub classified_count: i64,
    pub label_id: Option<String>,
}

/// Display metadata of one classification label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMeta {
    pub name: String,
    pub color: String,
    pub sort_weight: i64,
}

/// Classification/grade-label service.
pub trait ClassificationService: Send + Sync {
    /// Raw classified-field rows for one output shape.
    ///
    /// `root_id = None` covers every top-level group; `hierarchy` asks for
    /// per-label rows instead of plain totals.
    fn query_raw_classification(
        &self,
        root_id: Option<&NodeId>,
        hierarchy: bool,
    ) -> ExternalResult<Vec<ClassificationRow>>;
    /// Label metadata by label ID. Unknown IDs are absent from the result.
    fn query_label_meta(&self, label_ids: &[String]) -> ExternalResult<HashMap<String, LabelMeta>>;
}

/// Downstream service holding relations to logic entities (view or
/// indicator links) that must be dropped when entities are deleted.
pub trait RelationCleaner: Send + Sync {
    fn name(&self) -> &str;
    fn remove_entity_relations(&self, entity_ids: &[NodeId]) -> ExternalResult<()>;
}
