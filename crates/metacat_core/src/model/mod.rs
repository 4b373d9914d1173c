//! Core domain model types.
//!
//! # Responsibility
//! - Define the canonical catalog node shared by every layer.
//! - Keep field-level invariants close to the types.

pub mod node;
