//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the catalog node data-access contract.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes run `CatalogNode::validate()` before persistence.
//! - Repository APIs return semantic errors (`NodeNotFound`,
//!   `DuplicateName`, `UniqueAttributeTaken`, `CircularReference`) in
//!   addition to DB transport errors.

pub mod node_repo;
pub mod reference_graph;
