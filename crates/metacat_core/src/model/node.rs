//! Catalog node domain model.
//!
//! # Responsibility
//! - Define the five-level taxonomy node shared by repository and services.
//! - Own field-level validation: ID format, names, and per-level field rules.
//!
//! # Invariants
//! - `NodeId` never contains the path separator.
//! - `path_id` has exactly `node_type.level()` segments and ends with `id`.
//! - `ref_ids` is only populated for business object/activity nodes.
//! - `label_id` and `unique` are attribute-level fields.

use crate::path::{self, PATH_SEPARATOR};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static NODE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Za-z][0-9A-Za-z_.:\-]{0,63}$").expect("valid node id regex")
});

/// Stable catalog node identifier.
///
/// 1-64 ASCII characters: alphanumerics plus `_ . : -`, starting with an
/// alphanumeric. The path separator can never appear.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Parses and validates a caller-provided identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, NodeValidationError> {
        let value = value.into();
        if !NODE_ID_RE.is_match(&value) {
            return Err(NodeValidationError::InvalidId(value));
        }
        Ok(Self(value))
    }

    /// Generates a fresh identifier (UUID v4, simple form).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

/// Node kind. Each kind lives at exactly one tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Business-domain group, level 1.
    Group,
    /// Subject domain, level 2.
    Domain,
    /// Business object, level 3.
    BusinessObject,
    /// Business activity, level 3.
    BusinessActivity,
    /// Logic entity, level 4.
    LogicEntity,
    /// Attribute, level 5.
    Attribute,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Group,
        NodeType::Domain,
        NodeType::BusinessObject,
        NodeType::BusinessActivity,
        NodeType::LogicEntity,
        NodeType::Attribute,
    ];

    /// Tree level of this kind, 1-based.
    pub fn level(self) -> usize {
        match self {
            Self::Group => 1,
            Self::Domain => 2,
            Self::BusinessObject | Self::BusinessActivity => 3,
            Self::LogicEntity => 4,
            Self::Attribute => 5,
        }
    }

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Domain => "domain",
            Self::BusinessObject => "business_object",
            Self::BusinessActivity => "business_activity",
            Self::LogicEntity => "logic_entity",
            Self::Attribute => "attribute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn is_business_object(self) -> bool {
        matches!(self, Self::BusinessObject | Self::BusinessActivity)
    }

    /// Returns whether `child` may sit directly below a node of this kind.
    pub fn allows_child(self, child: NodeType) -> bool {
        child.level() == self.level() + 1
    }

    /// Returns whether a stored node of this kind may be retyped to `to`.
    ///
    /// Only business object <-> business activity is a real transition;
    /// every other kind may only keep its own type.
    pub fn can_transition_to(self, to: NodeType) -> bool {
        self == to || (self.is_business_object() && to.is_business_object())
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog node read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNode {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub node_type: NodeType,
    /// Ancestor ID chain including self, separator-joined. Immutable.
    pub path_id: String,
    /// Ancestor name chain parallel to `path_id`.
    pub path: String,
    pub owner: Option<String>,
    /// Linked data standard. Logic entity/attribute only.
    pub standard_id: Option<String>,
    /// Classification tag. Attribute only.
    pub label_id: Option<String>,
    /// Unique-key marker. Attribute only, at most one per logic entity.
    pub unique: bool,
    /// Referenced business objects/activities. Business object level only.
    pub ref_ids: Vec<NodeId>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    pub created_by: String,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    pub updated_by: String,
}

impl CatalogNode {
    /// Builds a node positioned under `parent` from a draft.
    ///
    /// Derives `path_id`/`path` from the parent chain. Timestamps are left
    /// at zero and filled by storage.
    pub fn from_draft(draft: &NodeDraft, parent: Option<&CatalogNode>, actor: &str) -> Self {
        let id = draft.id.clone().unwrap_or_else(NodeId::generate);
        let name = draft.name.trim().to_string();
        Self {
            path_id: path::child_path(parent.map(|p| p.path_id.as_str()), id.as_str()),
            path: path::child_path(parent.map(|p| p.path.as_str()), &name),
            id,
            name,
            description: draft.description.clone(),
            node_type: draft.node_type,
            owner: draft.owner.clone(),
            standard_id: draft.standard_id.clone(),
            label_id: draft.label_id.clone(),
            unique: draft.unique,
            ref_ids: Vec::new(),
            created_at: 0,
            created_by: actor.to_string(),
            updated_at: 0,
            updated_by: actor.to_string(),
        }
    }

    pub fn level(&self) -> usize {
        path::level(&self.path_id)
    }

    /// Parent `path_id`, `None` for top-level groups.
    pub fn parent_path_id(&self) -> Option<&str> {
        path::parent_path(&self.path_id)
    }

    /// ID of the top-level group this node belongs to.
    pub fn root_id(&self) -> &str {
        path::root_segment(&self.path_id).unwrap_or(self.id.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.parent_path_id().is_none()
    }

    /// Checks path, name, and per-level field invariants.
    pub fn validate(&self) -> Result<(), NodeValidationError> {
        validate_name(&self.name)?;

        let level = self.level();
        if level != self.node_type.level() {
            return Err(NodeValidationError::LevelMismatch {
                node_type: self.node_type,
                level,
            });
        }
        if path::last_segment(&self.path_id) != self.id.as_str() {
            return Err(NodeValidationError::InvalidPath(self.path_id.clone()));
        }
        if path::level(&self.path) != level || path::last_segment(&self.path) != self.name {
            return Err(NodeValidationError::InvalidPath(self.path.clone()));
        }

        if !self.ref_ids.is_empty() && !self.node_type.is_business_object() {
            return Err(NodeValidationError::FieldNotAllowed {
                field: "ref_ids",
                node_type: self.node_type,
            });
        }
        if self.ref_ids.contains(&self.id) {
            return Err(NodeValidationError::SelfReference(self.id.clone()));
        }
        validate_level_fields(
            self.node_type,
            self.label_id.is_some(),
            self.unique,
            self.standard_id.is_some(),
        )
    }
}

/// Input for creating one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    /// Caller-provided ID. Generated when `None`.
    pub id: Option<NodeId>,
    pub name: String,
    pub description: String,
    pub node_type: NodeType,
    pub owner: Option<String>,
    pub standard_id: Option<String>,
    pub label_id: Option<String>,
    pub unique: bool,
}

impl NodeDraft {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            node_type,
            owner: None,
            standard_id: None,
            label_id: None,
            unique: false,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_label(mut self, label_id: impl Into<String>) -> Self {
        self.label_id = Some(label_id.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Partial update. `None` leaves a field untouched; for optional fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub node_type: Option<NodeType>,
    pub owner: Option<Option<String>>,
    pub standard_id: Option<Option<String>>,
    pub label_id: Option<Option<String>>,
    pub unique: Option<bool>,
}

/// One logic entity with its attributes, used by business-object content
/// replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDraft {
    pub entity: NodeDraft,
    pub attributes: Vec<NodeDraft>,
}

/// Node validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValidationError {
    /// ID does not match the node ID format.
    InvalidId(String),
    /// Name is blank after trim.
    BlankName,
    /// Name contains the path separator.
    NameContainsSeparator(String),
    /// Path chain length does not match the node type level.
    LevelMismatch { node_type: NodeType, level: usize },
    /// Path chain is inconsistent with id/name.
    InvalidPath(String),
    /// Child kind is not allowed directly below the parent kind.
    ChildTypeNotAllowed {
        parent: Option<NodeType>,
        child: NodeType,
    },
    /// Field is set on a kind that does not carry it.
    FieldNotAllowed {
        field: &'static str,
        node_type: NodeType,
    },
    /// Node lists itself in `ref_ids`.
    SelfReference(NodeId),
}

impl Display for NodeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(value) => write!(f, "invalid node id `{value}`"),
            Self::BlankName => write!(f, "node name must not be blank"),
            Self::NameContainsSeparator(value) => {
                write!(f, "node name `{value}` must not contain `{PATH_SEPARATOR}`")
            }
            Self::LevelMismatch { node_type, level } => write!(
                f,
                "node type {node_type} belongs to level {}, got level {level}",
                node_type.level()
            ),
            Self::InvalidPath(value) => write!(f, "inconsistent node path `{value}`"),
            Self::ChildTypeNotAllowed { parent, child } => match parent {
                Some(parent) => write!(f, "{child} is not allowed under {parent}"),
                None => write!(f, "{child} is not allowed at top level"),
            },
            Self::FieldNotAllowed { field, node_type } => {
                write!(f, "field `{field}` is not allowed on {node_type}")
            }
            Self::SelfReference(id) => write!(f, "node {id} must not reference itself"),
        }
    }
}

impl Error for NodeValidationError {}

/// Trims and validates a node name.
pub fn normalize_name(value: &str) -> Result<String, NodeValidationError> {
    let trimmed = value.trim();
    validate_name(trimmed)?;
    Ok(trimmed.to_string())
}

/// Checks that `child` may be created under `parent` (`None` = top level).
pub fn ensure_child_allowed(
    parent: Option<NodeType>,
    child: NodeType,
) -> Result<(), NodeValidationError> {
    let allowed = match parent {
        Some(parent) => parent.allows_child(child),
        None => child.level() == 1,
    };
    if allowed {
        Ok(())
    } else {
        Err(NodeValidationError::ChildTypeNotAllowed { parent, child })
    }
}

fn validate_name(value: &str) -> Result<(), NodeValidationError> {
    if value.trim().is_empty() {
        return Err(NodeValidationError::BlankName);
    }
    if value.contains(PATH_SEPARATOR) {
        return Err(NodeValidationError::NameContainsSeparator(value.to_string()));
    }
    Ok(())
}

fn validate_level_fields(
    node_type: NodeType,
    has_label: bool,
    unique: bool,
    has_standard: bool,
) -> Result<(), NodeValidationError> {
    let is_attribute = node_type == NodeType::Attribute;
    if has_label && !is_attribute {
        return Err(NodeValidationError::FieldNotAllowed {
            field: "label_id",
            node_type,
        });
    }
    if unique && !is_attribute {
        return Err(NodeValidationError::FieldNotAllowed {
            field: "unique",
            node_type,
        });
    }
    if has_standard && !matches!(node_type, NodeType::LogicEntity | NodeType::Attribute) {
        return Err(NodeValidationError::FieldNotAllowed {
            field: "standard_id",
            node_type,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: NodeType, path_id: &str, path: &str) -> CatalogNode {
        let name = path::last_segment(path).to_string();
        CatalogNode {
            id: NodeId::parse(id).unwrap(),
            name,
            description: String::new(),
            node_type,
            path_id: path_id.to_string(),
            path: path.to_string(),
            owner: None,
            standard_id: None,
            label_id: None,
            unique: false,
            ref_ids: Vec::new(),
            created_at: 0,
            created_by: String::new(),
            updated_at: 0,
            updated_by: String::new(),
        }
    }

    #[test]
    fn node_id_rejects_separator_and_blank() {
        assert!(NodeId::parse("abc-1_2.3:4").is_ok());
        assert!(matches!(
            NodeId::parse("a/b"),
            Err(NodeValidationError::InvalidId(_))
        ));
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse("-lead").is_err());
        assert!(NodeId::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn generated_ids_are_valid() {
        let id = NodeId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(NodeId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn node_type_levels_and_children() {
        assert_eq!(NodeType::Group.level(), 1);
        assert_eq!(NodeType::BusinessActivity.level(), 3);
        assert!(NodeType::Domain.allows_child(NodeType::BusinessActivity));
        assert!(!NodeType::Group.allows_child(NodeType::LogicEntity));
        assert!(!NodeType::Attribute.allows_child(NodeType::Attribute));
        assert_eq!(NodeType::parse("logic_entity"), Some(NodeType::LogicEntity));
        assert_eq!(NodeType::parse("folder"), None);
    }

    #[test]
    fn type_transitions_follow_fixed_table() {
        assert!(NodeType::BusinessObject.can_transition_to(NodeType::BusinessActivity));
        assert!(NodeType::BusinessActivity.can_transition_to(NodeType::BusinessObject));
        assert!(NodeType::Group.can_transition_to(NodeType::Group));
        assert!(!NodeType::Group.can_transition_to(NodeType::Domain));
        assert!(!NodeType::LogicEntity.can_transition_to(NodeType::Attribute));
    }

    #[test]
    fn validate_rejects_level_mismatch() {
        let bad = node("d", NodeType::Domain, "d", "Dom");
        assert_eq!(
            bad.validate(),
            Err(NodeValidationError::LevelMismatch {
                node_type: NodeType::Domain,
                level: 1
            })
        );
        assert!(node("g", NodeType::Group, "g", "Grp").validate().is_ok());
    }

    #[test]
    fn validate_rejects_misplaced_fields() {
        let mut entity = node("e", NodeType::LogicEntity, "g/d/o/e", "G/D/O/E");
        entity.label_id = Some("l1".to_string());
        assert!(matches!(
            entity.validate(),
            Err(NodeValidationError::FieldNotAllowed {
                field: "label_id",
                ..
            })
        ));

        let mut domain = node("d", NodeType::Domain, "g/d", "G/D");
        domain.ref_ids = vec![NodeId::parse("o").unwrap()];
        assert!(matches!(
            domain.validate(),
            Err(NodeValidationError::FieldNotAllowed {
                field: "ref_ids",
                ..
            })
        ));
    }

    #[test]
    fn normalize_name_trims_and_rejects_separator() {
        assert_eq!(normalize_name("  Sales ").unwrap(), "Sales");
        assert_eq!(normalize_name("   "), Err(NodeValidationError::BlankName));
        assert!(matches!(
            normalize_name("a/b"),
            Err(NodeValidationError::NameContainsSeparator(_))
        ));
    }

    #[test]
    fn draft_builds_paths_from_parent() {
        let parent = node("g", NodeType::Group, "g", "Grp");
        let draft = NodeDraft::new(NodeType::Domain, " Sales ").with_id(NodeId::parse("d").unwrap());
        let child = CatalogNode::from_draft(&draft, Some(&parent), "alice");
        assert_eq!(child.path_id, "g/d");
        assert_eq!(child.path, "Grp/Sales");
        assert_eq!(child.created_by, "alice");
        assert!(child.validate().is_ok());
    }

    #[test]
    fn node_type_serializes_snake_case() {
        let json = serde_json::to_string(&NodeType::BusinessObject).unwrap();
        assert_eq!(json, "\"business_object\"");
        let id: NodeId = serde_json::from_str("\"n1\"").unwrap();
        assert_eq!(id.as_str(), "n1");
        assert!(serde_json::from_str::<NodeId>("\"a/b\"").is_err());
    }
}
