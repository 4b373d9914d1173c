//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Combine tree data with external collaborator figures.

pub mod classification;
pub mod counter;
pub mod tree_service;
