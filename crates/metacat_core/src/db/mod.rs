//! Catalog database: connection setup and schema.
//!
//! The schema holds two tables. `catalog_nodes` stores one row per taxonomy
//! node keyed by `id`, with the materialized `path_id` (unique) and the
//! display `path`. `catalog_node_refs` stores business-object reference
//! edges `node_id -> ref_id`; both ends cascade on node delete, so removing
//! a subtree also drops every edge pointing into it.
//!
//! Connections run with `foreign_keys = ON` and are migrated on open.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with};

pub type DbResult<T> = Result<T, DbError>;

/// Tables and columns the catalog repositories read and write.
pub const CATALOG_SCHEMA: &[(&str, &[&str])] = &[
    (
        "catalog_nodes",
        &[
            "id",
            "name",
            "description",
            "node_type",
            "path_id",
            "path",
            "owner",
            "standard_id",
            "label_id",
            "is_unique",
            "created_at",
            "created_by",
            "updated_at",
            "updated_by",
        ],
    ),
    ("catalog_node_refs", &["node_id", "ref_id"]),
];

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "catalog schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
