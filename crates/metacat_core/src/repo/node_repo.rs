//! Catalog node repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist the five-level node tree and business-object reference edges.
//! - Answer subtree/children queries through `path_id` prefixes.
//!
//! # Invariants
//! - Prefix matching is separator-bounded and never uses `LIKE`, so `_`
//!   and `%` inside IDs are literal.
//! - Every write method runs in one `IMMEDIATE` transaction.
//! - Sibling names are unique among direct children of one parent, and a
//!   logic entity has at most one unique attribute; both checks run inside
//!   the writing transaction.
//! - Reference edges are cycle-checked inside the transaction that
//!   replaces them.
//! - Listing order is deterministic: requested sort column, then `id ASC`.

use crate::db::migrations::latest_version;
use crate::db::{DbError, CATALOG_SCHEMA};
use crate::model::node::{CatalogNode, NodeId, NodeType, NodeValidationError};
use crate::path::{self, PATH_SEPARATOR};
use crate::repo::reference_graph::ReferenceGraph;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const NODE_SELECT_SQL: &str = "SELECT
    n.id AS id,
    n.name AS name,
    n.description AS description,
    n.node_type AS node_type,
    n.path_id AS path_id,
    n.path AS path,
    n.owner AS owner,
    n.standard_id AS standard_id,
    n.label_id AS label_id,
    n.is_unique AS is_unique,
    n.created_at AS created_at,
    n.created_by AS created_by,
    n.updated_at AS updated_at,
    n.updated_by AS updated_by,
    (SELECT group_concat(r.ref_id, '/')
     FROM catalog_node_refs r
     WHERE r.node_id = n.id) AS ref_ids
FROM catalog_nodes n";

const HAS_CHILD_SQL: &str = "EXISTS(
    SELECT 1
    FROM catalog_nodes c
    WHERE substr(c.path_id, 1, length(n.path_id) + 1) = n.path_id || '/'
) AS has_child";

/// Self-or-descendant of `?1`.
const SUBTREE_FILTER: &str = "(n.path_id = ?1
    OR substr(n.path_id, 1, length(?1) + 1) = ?1 || '/')";

/// Strict descendants of `?1`.
const DESCENDANT_FILTER: &str = "substr(n.path_id, 1, length(?1) + 1) = ?1 || '/'";

/// Direct children of `?1`.
const DIRECT_CHILD_FILTER: &str = "substr(n.path_id, 1, length(?1) + 1) = ?1 || '/'
    AND instr(substr(n.path_id, length(?1) + 2), '/') = 0";

const ROOT_FILTER: &str = "instr(n.path_id, '/') = 0";

/// Keeps `IN (...)` lists well below SQLite's bound-parameter limit.
const ID_CHUNK_SIZE: usize = 500;

pub type NodeRepoResult<T> = Result<T, NodeRepoError>;

/// Errors from catalog node repository operations.
#[derive(Debug)]
pub enum NodeRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target node does not exist.
    NodeNotFound(NodeId),
    /// A direct sibling already uses this name.
    DuplicateName {
        parent_path_id: Option<String>,
        name: String,
    },
    /// The logic entity already has a unique attribute.
    UniqueAttributeTaken { entity_id: NodeId },
    /// New reference edges would let the node reach itself.
    CircularReference(NodeId),
    /// Node failed model validation before a write.
    Validation(NodeValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for NodeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "catalog node not found: {id}"),
            Self::DuplicateName {
                parent_path_id,
                name,
            } => match parent_path_id {
                Some(parent) => write!(f, "name `{name}` already used under `{parent}`"),
                None => write!(f, "name `{name}` already used at top level"),
            },
            Self::UniqueAttributeTaken { entity_id } => {
                write!(f, "logic entity {entity_id} already has a unique attribute")
            }
            Self::CircularReference(id) => write!(f, "references would form a cycle at {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "catalog repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid catalog data: {message}"),
        }
    }
}

impl Error for NodeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for NodeRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for NodeRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NodeValidationError> for NodeRepoError {
    fn from(value: NodeValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Sort column for node listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Name,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            Self::Name => "n.name",
            Self::CreatedAt => "n.created_at",
            Self::UpdatedAt => "n.updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Typed filters for node listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeListQuery {
    /// Direct children of this node. When absent, top-level groups are
    /// listed unless `keyword` or `node_type` is set, which search the
    /// whole tree.
    pub parent_id: Option<NodeId>,
    pub node_type: Option<NodeType>,
    /// Case-insensitive literal substring of `name`.
    pub keyword: Option<String>,
    pub offset: u32,
    /// Page size. `None` returns every row after `offset`.
    pub limit: Option<u32>,
    pub sort: SortField,
    pub direction: SortDirection,
}

/// One page of a listing plus the unpaged row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Listed node with its `hasChild` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedNode {
    pub node: CatalogNode,
    pub has_child: bool,
}

/// Repository interface for the catalog node tree.
pub trait NodeRepository {
    fn get_by_id(&self, id: &NodeId) -> NodeRepoResult<Option<CatalogNode>>;
    fn get_by_ids(&self, ids: &[NodeId]) -> NodeRepoResult<Vec<CatalogNode>>;
    /// Children of `parent_path_id` (top-level groups when `None`);
    /// `direct_only = false` returns the whole subtree below the parent.
    fn get_children(
        &self,
        parent_path_id: Option<&str>,
        direct_only: bool,
    ) -> NodeRepoResult<Vec<CatalogNode>>;
    /// The node at `path_id` and every node below it.
    fn get_subtree(&self, path_id: &str) -> NodeRepoResult<Vec<CatalogNode>>;
    /// Inserts one node after checking sibling-name and unique-attribute
    /// constraints.
    fn insert(&self, node: &CatalogNode) -> NodeRepoResult<()>;
    /// Inserts several nodes atomically, parents before children.
    fn insert_batch(&self, nodes: &[CatalogNode]) -> NodeRepoResult<()>;
    /// Deletes the node at `path_id` and its subtree; returns deleted rows.
    fn delete_by_path_prefix(&self, path_id: &str) -> NodeRepoResult<Vec<CatalogNode>>;
    /// Persists one node and rewritten descendant name paths atomically.
    fn update_with_descendants(
        &self,
        node: &CatalogNode,
        descendants: &[CatalogNode],
    ) -> NodeRepoResult<()>;
    fn name_exists(
        &self,
        parent_path_id: Option<&str>,
        exclude_id: Option<&NodeId>,
        name: &str,
    ) -> NodeRepoResult<bool>;
    /// `node id -> top-level group id` for every node.
    fn root_relation(&self) -> NodeRepoResult<HashMap<NodeId, NodeId>>;
    /// Outgoing reference edges for each requested node that has any.
    fn ref_ids_of(&self, ids: &[NodeId]) -> NodeRepoResult<HashMap<NodeId, Vec<NodeId>>>;
    /// Replaces all outgoing reference edges of one node; fails with
    /// `CircularReference` when the new edges would close a cycle.
    fn replace_ref_ids(&self, node_id: &NodeId, ref_ids: &[NodeId], actor: &str)
        -> NodeRepoResult<()>;
    /// Deletes everything below `parent_path_id` and inserts `nodes` in
    /// one transaction; returns the deleted rows.
    fn replace_children(
        &self,
        parent_path_id: &str,
        nodes: &[CatalogNode],
    ) -> NodeRepoResult<Vec<CatalogNode>>;
    fn list_nodes(&self, query: &NodeListQuery) -> NodeRepoResult<NodePage<ListedNode>>;
}

/// SQLite-backed catalog node repository.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> NodeRepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NodeRepository for SqliteNodeRepository<'_> {
    fn get_by_id(&self, id: &NodeId) -> NodeRepoResult<Option<CatalogNode>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_SELECT_SQL} WHERE n.id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn get_by_ids(&self, ids: &[NodeId]) -> NodeRepoResult<Vec<CatalogNode>> {
        let mut nodes = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let sql = format!(
                "{NODE_SELECT_SQL} WHERE n.id IN ({}) ORDER BY n.path_id ASC;",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk.iter().map(NodeId::as_str)))?;
            while let Some(row) = rows.next()? {
                nodes.push(parse_node_row(row)?);
            }
        }
        Ok(nodes)
    }

    fn get_children(
        &self,
        parent_path_id: Option<&str>,
        direct_only: bool,
    ) -> NodeRepoResult<Vec<CatalogNode>> {
        match (parent_path_id, direct_only) {
            (None, true) => query_nodes(
                self.conn,
                &format!("{NODE_SELECT_SQL} WHERE {ROOT_FILTER} ORDER BY n.path_id ASC;"),
                params![],
            ),
            (None, false) => query_nodes(
                self.conn,
                &format!("{NODE_SELECT_SQL} ORDER BY n.path_id ASC;"),
                params![],
            ),
            (Some(parent), true) => query_nodes(
                self.conn,
                &format!("{NODE_SELECT_SQL} WHERE {DIRECT_CHILD_FILTER} ORDER BY n.path_id ASC;"),
                [parent],
            ),
            (Some(parent), false) => query_nodes(
                self.conn,
                &format!("{NODE_SELECT_SQL} WHERE {DESCENDANT_FILTER} ORDER BY n.path_id ASC;"),
                [parent],
            ),
        }
    }

    fn get_subtree(&self, path_id: &str) -> NodeRepoResult<Vec<CatalogNode>> {
        load_subtree(self.conn, path_id)
    }

    fn insert(&self, node: &CatalogNode) -> NodeRepoResult<()> {
        node.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_node_row(&tx, node)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_batch(&self, nodes: &[CatalogNode]) -> NodeRepoResult<()> {
        for node in nodes {
            node.validate()?;
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for node in nodes {
            insert_node_row(&tx, node)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_by_path_prefix(&self, path_id: &str) -> NodeRepoResult<Vec<CatalogNode>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let deleted = load_subtree(&tx, path_id)?;
        tx.execute(
            &format!("DELETE FROM catalog_nodes AS n WHERE {SUBTREE_FILTER};"),
            [path_id],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn update_with_descendants(
        &self,
        node: &CatalogNode,
        descendants: &[CatalogNode],
    ) -> NodeRepoResult<()> {
        node.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_name_free(&tx, node.parent_path_id(), Some(&node.id), &node.name)?;
        ensure_unique_slot_free(&tx, node)?;

        let changed = tx.execute(
            "UPDATE catalog_nodes
             SET name = ?2,
                 description = ?3,
                 node_type = ?4,
                 path = ?5,
                 owner = ?6,
                 standard_id = ?7,
                 label_id = ?8,
                 is_unique = ?9,
                 updated_by = ?10,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND path_id = ?11;",
            params![
                node.id.as_str(),
                node.name.as_str(),
                node.description.as_str(),
                node.node_type.as_str(),
                node.path.as_str(),
                node.owner.as_deref(),
                node.standard_id.as_deref(),
                node.label_id.as_deref(),
                bool_to_int(node.unique),
                node.updated_by.as_str(),
                node.path_id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(node.id.clone()));
        }

        for descendant in descendants {
            if !path::is_descendant(&descendant.path_id, &node.path_id) {
                return Err(NodeRepoError::InvalidData(format!(
                    "node {} is not below {}",
                    descendant.id, node.id
                )));
            }
            tx.execute(
                "UPDATE catalog_nodes
                 SET path = ?2,
                     updated_by = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    descendant.id.as_str(),
                    descendant.path.as_str(),
                    node.updated_by.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn name_exists(
        &self,
        parent_path_id: Option<&str>,
        exclude_id: Option<&NodeId>,
        name: &str,
    ) -> NodeRepoResult<bool> {
        sibling_name_taken(self.conn, parent_path_id, exclude_id, name)
    }

    fn root_relation(&self) -> NodeRepoResult<HashMap<NodeId, NodeId>> {
        let mut stmt = self.conn.prepare("SELECT id, path_id FROM catalog_nodes;")?;
        let mut rows = stmt.query([])?;
        let mut relation = HashMap::new();
        while let Some(row) = rows.next()? {
            let id = parse_node_id(&row.get::<_, String>(0)?, "catalog_nodes.id")?;
            let path_id: String = row.get(1)?;
            let root = path::root_segment(&path_id).ok_or_else(|| {
                NodeRepoError::InvalidData(format!("empty path_id for node {id}"))
            })?;
            let root = parse_node_id(root, "catalog_nodes.path_id")?;
            relation.insert(id, root);
        }
        Ok(relation)
    }

    fn ref_ids_of(&self, ids: &[NodeId]) -> NodeRepoResult<HashMap<NodeId, Vec<NodeId>>> {
        let mut edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let sql = format!(
                "SELECT node_id, ref_id
                 FROM catalog_node_refs
                 WHERE node_id IN ({})
                 ORDER BY node_id ASC, ref_id ASC;",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk.iter().map(NodeId::as_str)))?;
            while let Some(row) = rows.next()? {
                let node_id =
                    parse_node_id(&row.get::<_, String>(0)?, "catalog_node_refs.node_id")?;
                let ref_id = parse_node_id(&row.get::<_, String>(1)?, "catalog_node_refs.ref_id")?;
                edges.entry(node_id).or_default().push(ref_id);
            }
        }
        Ok(edges)
    }

    fn replace_ref_ids(
        &self,
        node_id: &NodeId,
        ref_ids: &[NodeId],
        actor: &str,
    ) -> NodeRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE catalog_nodes
             SET updated_by = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![node_id.as_str(), actor],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(node_id.clone()));
        }

        let scoped = SqliteNodeRepository { conn: &*tx };
        if ReferenceGraph::new(&scoped).would_cycle(node_id, ref_ids)? {
            return Err(NodeRepoError::CircularReference(node_id.clone()));
        }

        tx.execute(
            "DELETE FROM catalog_node_refs WHERE node_id = ?1;",
            [node_id.as_str()],
        )?;
        insert_ref_rows(&tx, node_id, ref_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_children(
        &self,
        parent_path_id: &str,
        nodes: &[CatalogNode],
    ) -> NodeRepoResult<Vec<CatalogNode>> {
        let mut placed: HashSet<&str> = HashSet::new();
        for node in nodes {
            node.validate()?;
            let attached = path::is_direct_child_prefix(&node.path_id, Some(parent_path_id))
                || node
                    .parent_path_id()
                    .is_some_and(|parent| placed.contains(parent));
            if !attached {
                return Err(NodeRepoError::InvalidData(format!(
                    "node {} is not attached below {parent_path_id}",
                    node.id
                )));
            }
            placed.insert(node.path_id.as_str());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let removed = query_nodes(
            &tx,
            &format!("{NODE_SELECT_SQL} WHERE {DESCENDANT_FILTER} ORDER BY n.path_id ASC;"),
            [parent_path_id],
        )?;
        tx.execute(
            &format!("DELETE FROM catalog_nodes AS n WHERE {DESCENDANT_FILTER};"),
            [parent_path_id],
        )?;
        for node in nodes {
            insert_node_row(&tx, node)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn list_nodes(&self, query: &NodeListQuery) -> NodeRepoResult<NodePage<ListedNode>> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match &query.parent_id {
            Some(parent_id) => {
                let parent = self
                    .get_by_id(parent_id)?
                    .ok_or_else(|| NodeRepoError::NodeNotFound(parent_id.clone()))?;
                filter.push_str(
                    " AND substr(n.path_id, 1, length(?) + 1) = ? || '/'
                      AND instr(substr(n.path_id, length(?) + 2), '/') = 0",
                );
                for _ in 0..3 {
                    bind_values.push(Value::Text(parent.path_id.clone()));
                }
            }
            None if query.keyword.is_none() && query.node_type.is_none() => {
                filter.push_str(&format!(" AND {ROOT_FILTER}"));
            }
            None => {}
        }

        if let Some(node_type) = query.node_type {
            filter.push_str(" AND n.node_type = ?");
            bind_values.push(Value::Text(node_type.as_str().to_string()));
        }

        if let Some(keyword) = query
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            filter.push_str(" AND instr(lower(n.name), lower(?)) > 0");
            bind_values.push(Value::Text(keyword.to_string()));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM catalog_nodes n{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!(
            "{} , {HAS_CHILD_SQL} FROM catalog_nodes n{filter} ORDER BY {} {}, n.id ASC",
            NODE_SELECT_SQL.trim_end_matches("FROM catalog_nodes n"),
            query.sort.column(),
            query.direction.keyword()
        );
        match query.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(i64::from(limit)));
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
            None if query.offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
            None => {}
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(ListedNode {
                node: parse_node_row(row)?,
                has_child: row.get::<_, i64>("has_child")? == 1,
            });
        }

        Ok(NodePage {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

fn query_nodes<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> NodeRepoResult<Vec<CatalogNode>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(parse_node_row(row)?);
    }
    Ok(nodes)
}

fn load_subtree(conn: &Connection, path_id: &str) -> NodeRepoResult<Vec<CatalogNode>> {
    query_nodes(
        conn,
        &format!("{NODE_SELECT_SQL} WHERE {SUBTREE_FILTER} ORDER BY n.path_id ASC;"),
        [path_id],
    )
}

fn insert_node_row(conn: &Connection, node: &CatalogNode) -> NodeRepoResult<()> {
    ensure_name_free(conn, node.parent_path_id(), None, &node.name)?;
    ensure_unique_slot_free(conn, node)?;
    conn.execute(
        "INSERT INTO catalog_nodes (
            id,
            name,
            description,
            node_type,
            path_id,
            path,
            owner,
            standard_id,
            label_id,
            is_unique,
            created_by,
            updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
        params![
            node.id.as_str(),
            node.name.as_str(),
            node.description.as_str(),
            node.node_type.as_str(),
            node.path_id.as_str(),
            node.path.as_str(),
            node.owner.as_deref(),
            node.standard_id.as_deref(),
            node.label_id.as_deref(),
            bool_to_int(node.unique),
            node.created_by.as_str(),
            node.updated_by.as_str(),
        ],
    )?;
    insert_ref_rows(conn, &node.id, &node.ref_ids)
}

fn insert_ref_rows(conn: &Connection, node_id: &NodeId, ref_ids: &[NodeId]) -> NodeRepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO catalog_node_refs (node_id, ref_id) VALUES (?1, ?2);",
    )?;
    for ref_id in ref_ids {
        stmt.execute([node_id.as_str(), ref_id.as_str()])?;
    }
    Ok(())
}

fn ensure_name_free(
    conn: &Connection,
    parent_path_id: Option<&str>,
    exclude_id: Option<&NodeId>,
    name: &str,
) -> NodeRepoResult<()> {
    if sibling_name_taken(conn, parent_path_id, exclude_id, name)? {
        return Err(NodeRepoError::DuplicateName {
            parent_path_id: parent_path_id.map(str::to_string),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Rejects a unique attribute when its entity already has another one.
fn ensure_unique_slot_free(conn: &Connection, node: &CatalogNode) -> NodeRepoResult<()> {
    if !node.unique || node.node_type != NodeType::Attribute {
        return Ok(());
    }
    let Some(entity_path_id) = node.parent_path_id() else {
        return Ok(());
    };
    if unique_attribute_taken(conn, entity_path_id, Some(&node.id))? {
        return Err(NodeRepoError::UniqueAttributeTaken {
            entity_id: parse_node_id(path::last_segment(entity_path_id), "catalog_nodes.path_id")?,
        });
    }
    Ok(())
}

fn unique_attribute_taken(
    conn: &Connection,
    entity_path_id: &str,
    exclude_id: Option<&NodeId>,
) -> NodeRepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1
                FROM catalog_nodes n
                WHERE {DIRECT_CHILD_FILTER}
                  AND n.node_type = 'attribute'
                  AND n.is_unique = 1
                  AND (?2 IS NULL OR n.id <> ?2)
            );"
        ),
        params![entity_path_id, exclude_id.map(NodeId::as_str)],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn sibling_name_taken(
    conn: &Connection,
    parent_path_id: Option<&str>,
    exclude_id: Option<&NodeId>,
    name: &str,
) -> NodeRepoResult<bool> {
    let exclude = exclude_id.map(NodeId::as_str);
    let exists: i64 = match parent_path_id {
        Some(parent) => conn.query_row(
            &format!(
                "SELECT EXISTS(
                    SELECT 1
                    FROM catalog_nodes n
                    WHERE {DIRECT_CHILD_FILTER}
                      AND n.name = ?2
                      AND (?3 IS NULL OR n.id <> ?3)
                );"
            ),
            params![parent, name, exclude],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            &format!(
                "SELECT EXISTS(
                    SELECT 1
                    FROM catalog_nodes n
                    WHERE {ROOT_FILTER}
                      AND n.name = ?1
                      AND (?2 IS NULL OR n.id <> ?2)
                );"
            ),
            params![name, exclude],
            |row| row.get(0),
        )?,
    };
    Ok(exists == 1)
}

fn parse_node_row(row: &Row<'_>) -> NodeRepoResult<CatalogNode> {
    let id = parse_node_id(&row.get::<_, String>("id")?, "catalog_nodes.id")?;

    let type_text: String = row.get("node_type")?;
    let node_type = NodeType::parse(&type_text).ok_or_else(|| {
        NodeRepoError::InvalidData(format!(
            "invalid node type `{type_text}` in catalog_nodes.node_type"
        ))
    })?;

    let unique = match row.get::<_, i64>("is_unique")? {
        0 => false,
        1 => true,
        other => {
            return Err(NodeRepoError::InvalidData(format!(
                "invalid is_unique value `{other}` in catalog_nodes.is_unique"
            )));
        }
    };

    let mut ref_ids = match row.get::<_, Option<String>>("ref_ids")? {
        Some(joined) => joined
            .split(PATH_SEPARATOR)
            .map(|value| parse_node_id(value, "catalog_node_refs.ref_id"))
            .collect::<NodeRepoResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    ref_ids.sort();

    Ok(CatalogNode {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        node_type,
        path_id: row.get("path_id")?,
        path: row.get("path")?,
        owner: row.get("owner")?,
        standard_id: row.get("standard_id")?,
        label_id: row.get("label_id")?,
        unique,
        ref_ids,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by")?,
        updated_at: row.get("updated_at")?,
        updated_by: row.get("updated_by")?,
    })
}

fn parse_node_id(value: &str, column: &'static str) -> NodeRepoResult<NodeId> {
    NodeId::parse(value)
        .map_err(|_| NodeRepoError::InvalidData(format!("invalid node id `{value}` in {column}")))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_catalog_connection_ready(conn: &Connection) -> NodeRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(NodeRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in CATALOG_SCHEMA {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(NodeRepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !present.iter().any(|name| name == column) {
                return Err(NodeRepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> NodeRepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
