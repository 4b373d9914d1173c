//! Core domain logic for the metadata catalog.
//! This crate is the single source of truth for taxonomy invariants.

pub mod config;
pub mod db;
pub mod external;
pub mod fanout;
pub mod logging;
pub mod model;
pub mod path;
pub mod repo;
pub mod rollup;
pub mod service;

pub use config::{CatalogConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbResult};
pub use external::{
    ClassificationRow, ClassificationService, CountService, ExternalResult, ExternalServiceError,
    LabelMeta, RelationCleaner, ResourceKind,
};
pub use fanout::{fanout_task, CancelToken, FanoutError, FanoutReport, FanoutRunner, FanoutTask};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::node::{
    CatalogNode, EntityDraft, NodeDraft, NodeId, NodeType, NodeUpdate, NodeValidationError,
};
pub use repo::node_repo::{
    ListedNode, NodeListQuery, NodePage, NodeRepoError, NodeRepoResult, NodeRepository,
    SortDirection, SortField, SqliteNodeRepository,
};
pub use repo::reference_graph::ReferenceGraph;
pub use service::classification::{
    ClassificationAggregator, ClassificationDisplay, ClassificationNode, ClassificationQuery,
    ClassificationResult, LabelCount,
};
pub use service::counter::{CountedNode, Counter, NodeCounts};
pub use service::tree_service::{TreeService, TreeServiceError, TreeServiceResult};
