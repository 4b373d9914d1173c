use metacat_core::db::open_db_in_memory;
use metacat_core::{
    CatalogConfig, CatalogNode, EntityDraft, ExternalResult, ExternalServiceError, NodeDraft,
    NodeId, NodeListQuery, NodeRepository, NodeType, NodeUpdate, NodeValidationError,
    RelationCleaner, SortDirection, SortField, SqliteNodeRepository, TreeService, TreeServiceError,
};
use std::sync::{Arc, Mutex};

type Service<'conn> = TreeService<SqliteNodeRepository<'conn>>;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn id(value: &str) -> NodeId {
    NodeId::parse(value).unwrap()
}

fn add(
    service: &Service<'_>,
    parent: Option<&str>,
    node_type: NodeType,
    node_id: &str,
    name: &str,
) -> CatalogNode {
    service
        .insert(
            parent.map(id).as_ref(),
            NodeDraft::new(node_type, name).with_id(id(node_id)),
            "tester",
        )
        .unwrap()
}

/// g(Group) / d(Domain) / o(BusinessObject) / e(LogicEntity) / f(Attribute)
fn seed_chain(service: &Service<'_>) {
    add(service, None, NodeType::Group, "g", "Finance");
    add(service, Some("g"), NodeType::Domain, "d", "Ledger");
    add(service, Some("d"), NodeType::BusinessObject, "o", "Invoice");
    add(service, Some("o"), NodeType::LogicEntity, "e", "InvoiceHeader");
    add(service, Some("e"), NodeType::Attribute, "f", "amount");
}

#[derive(Default)]
struct RecordingCleaner {
    fail: bool,
    calls: Mutex<Vec<Vec<NodeId>>>,
}

impl RelationCleaner for RecordingCleaner {
    fn name(&self) -> &str {
        "recording"
    }

    fn remove_entity_relations(&self, entity_ids: &[NodeId]) -> ExternalResult<()> {
        self.calls.lock().unwrap().push(entity_ids.to_vec());
        if self.fail {
            return Err(ExternalServiceError::new("recording", "unavailable"));
        }
        Ok(())
    }
}

#[test]
fn insert_derives_paths_from_parent() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);

    let parent = service.get_node(&id("d")).unwrap();
    let child = service.get_node(&id("o")).unwrap();
    assert_eq!(child.path_id, format!("{}/o", parent.path_id));
    assert_eq!(child.path, format!("{}/Invoice", parent.path));

    let attribute = service.get_node(&id("f")).unwrap();
    assert_eq!(attribute.path_id, "g/d/o/e/f");
    assert_eq!(attribute.path, "Finance/Ledger/Invoice/InvoiceHeader/amount");
    assert_eq!(attribute.created_by, "tester");
    assert!(attribute.created_at > 0);
}

#[test]
fn insert_generates_id_and_trims_name() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());

    let node = service
        .insert(None, NodeDraft::new(NodeType::Group, "  Sales  "), "tester")
        .unwrap();
    assert_eq!(node.name, "Sales");
    assert_eq!(node.path_id, node.id.as_str());
    assert_eq!(node.id.as_str().len(), 32);
}

#[test]
fn insert_rejects_type_at_wrong_level() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");

    let err = service
        .insert(None, NodeDraft::new(NodeType::Domain, "Loose"), "tester")
        .unwrap_err();
    assert!(matches!(
        err,
        TreeServiceError::Validation(NodeValidationError::ChildTypeNotAllowed { parent: None, .. })
    ));

    let err = service
        .insert(
            Some(&id("g")),
            NodeDraft::new(NodeType::LogicEntity, "Skipped"),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TreeServiceError::Validation(NodeValidationError::ChildTypeNotAllowed {
            parent: Some(NodeType::Group),
            child: NodeType::LogicEntity
        })
    ));
}

#[test]
fn insert_rejects_missing_parent_and_duplicate_id() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");

    let err = service
        .insert(
            Some(&id("nope")),
            NodeDraft::new(NodeType::Domain, "Ledger"),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::ParentNotFound(parent) if parent == id("nope")));

    let err = service
        .insert(
            None,
            NodeDraft::new(NodeType::Group, "Other").with_id(id("g")),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::NodeExists(existing) if existing == id("g")));
}

#[test]
fn insert_rejects_field_on_wrong_level() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");

    let err = service
        .insert(
            Some(&id("g")),
            NodeDraft::new(NodeType::Domain, "Ledger").with_label("secret"),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TreeServiceError::Validation(NodeValidationError::FieldNotAllowed {
            field: "label_id",
            ..
        })
    ));
}

#[test]
fn sibling_names_are_unique_only_among_direct_children() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");
    add(&service, Some("g"), NodeType::Domain, "d1", "Ledger");

    let err = service
        .insert(
            Some(&id("g")),
            NodeDraft::new(NodeType::Domain, "Ledger"),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::NameRepeat { name } if name == "Ledger"));

    // Same name one level deeper is not a sibling.
    add(&service, Some("d1"), NodeType::BusinessObject, "o1", "Ledger");
    // Same name under another group is fine too.
    add(&service, None, NodeType::Group, "g2", "Sales");
    add(&service, Some("g2"), NodeType::Domain, "d2", "Ledger");

    let err = service
        .insert(None, NodeDraft::new(NodeType::Group, "Sales"), "tester")
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::NameRepeat { .. }));
}

#[test]
fn check_name_repeat_honours_exclusion() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");
    add(&service, Some("g"), NodeType::Domain, "d", "Ledger");

    assert!(service
        .check_name_repeat(Some(&id("g")), " Ledger ", None)
        .unwrap());
    assert!(!service
        .check_name_repeat(Some(&id("g")), "Ledger", Some(&id("d")))
        .unwrap());
    assert!(!service.check_name_repeat(None, "Ledger", None).unwrap());
    assert!(service.check_name_repeat(None, "Finance", None).unwrap());
}

#[test]
fn delete_is_separator_bounded() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "ab", "Alpha");
    add(&service, Some("ab"), NodeType::Domain, "ab1", "AlphaDomain");
    add(&service, None, NodeType::Group, "abc", "Alphabet");
    add(&service, Some("abc"), NodeType::Domain, "abc1", "AlphabetDomain");

    let mut deleted = service.delete(&id("ab")).unwrap();
    deleted.sort();
    assert_eq!(deleted, vec![id("ab"), id("ab1")]);

    assert!(matches!(
        service.get_node(&id("ab1")),
        Err(TreeServiceError::NodeNotFound(_))
    ));
    assert_eq!(service.get_node(&id("abc")).unwrap().name, "Alphabet");
    assert_eq!(service.get_node(&id("abc1")).unwrap().path_id, "abc/abc1");
}

#[test]
fn underscore_in_ids_is_not_a_wildcard() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "a_", "Underscore");
    add(&service, Some("a_"), NodeType::Domain, "a_1", "Child");
    add(&service, None, NodeType::Group, "ax", "Letter");
    add(&service, Some("ax"), NodeType::Domain, "ax1", "Child");

    let children = service.list_children(Some(&id("a_"))).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, id("a_1"));

    service.delete(&id("a_")).unwrap();
    assert!(service.get_node(&id("ax1")).is_ok());
}

#[test]
fn delete_chain_middle_removes_descendants() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);

    let deleted = service.delete(&id("d")).unwrap();
    assert_eq!(deleted.len(), 4);
    assert!(service.get_node(&id("g")).is_ok());
    assert!(service.list_children(Some(&id("g"))).unwrap().is_empty());
}

#[test]
fn rename_cascades_names_and_keeps_path_ids() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "a", "A");
    add(&service, Some("a"), NodeType::Domain, "b", "B");
    add(&service, Some("b"), NodeType::BusinessObject, "c", "C");

    let renamed = service
        .update(
            &id("b"),
            NodeUpdate {
                name: Some("B2".to_string()),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap();
    assert_eq!(renamed.path, "A/B2");
    assert_eq!(renamed.path_id, "a/b");
    assert_eq!(renamed.updated_by, "editor");

    let leaf = service.get_node(&id("c")).unwrap();
    assert_eq!(leaf.path, "A/B2/C");
    assert_eq!(leaf.path_id, "a/b/c");
}

#[test]
fn rename_rejects_sibling_name() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");
    add(&service, Some("g"), NodeType::Domain, "d1", "Ledger");
    add(&service, Some("g"), NodeType::Domain, "d2", "Budget");

    let err = service
        .update(
            &id("d2"),
            NodeUpdate {
                name: Some("Ledger".to_string()),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::NameRepeat { .. }));

    // Keeping the current name is not a repeat.
    service
        .update(
            &id("d2"),
            NodeUpdate {
                name: Some("Budget".to_string()),
                description: Some("yearly".to_string()),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap();
    assert_eq!(service.get_node(&id("d2")).unwrap().description, "yearly");
}

#[test]
fn type_changes_follow_transition_table() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);

    let activity = service
        .update(
            &id("o"),
            NodeUpdate {
                node_type: Some(NodeType::BusinessActivity),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap();
    assert_eq!(activity.node_type, NodeType::BusinessActivity);

    let err = service
        .update(
            &id("g"),
            NodeUpdate {
                node_type: Some(NodeType::Domain),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TreeServiceError::UnsupportedUpdateType {
            from: NodeType::Group,
            to: NodeType::Domain
        }
    ));
}

#[test]
fn at_most_one_unique_attribute_per_entity() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);

    service
        .insert(
            Some(&id("e")),
            NodeDraft::new(NodeType::Attribute, "invoice_no")
                .with_id(id("k1"))
                .unique(),
            "tester",
        )
        .unwrap();

    let err = service
        .insert(
            Some(&id("e")),
            NodeDraft::new(NodeType::Attribute, "invoice_code").unique(),
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::UniqueAttributeExists { entity_id } if entity_id == id("e")));

    let err = service
        .update(
            &id("f"),
            NodeUpdate {
                unique: Some(true),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::UniqueAttributeExists { .. }));

    // Re-asserting the current unique attribute is fine.
    service
        .update(
            &id("k1"),
            NodeUpdate {
                unique: Some(true),
                ..NodeUpdate::default()
            },
            "editor",
        )
        .unwrap();
}

#[test]
fn delete_signals_removed_entities_after_commit() {
    let conn = setup();
    let recorder = Arc::new(RecordingCleaner::default());
    let broken = Arc::new(RecordingCleaner {
        fail: true,
        ..RecordingCleaner::default()
    });
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap())
        .with_cleaner(broken.clone())
        .with_cleaner(recorder.clone());
    seed_chain(&service);
    add(&service, Some("o"), NodeType::LogicEntity, "e2", "InvoiceLine");

    let deleted = service.delete(&id("o")).unwrap();
    assert_eq!(deleted.len(), 4);

    let calls = recorder.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let mut signalled = calls[0].clone();
    signalled.sort();
    assert_eq!(signalled, vec![id("e"), id("e2")]);

    // The failing cleaner was called and did not undo the delete.
    assert_eq!(broken.calls.lock().unwrap().len(), 1);
    assert!(service.get_node(&id("o")).is_err());
}

#[test]
fn delete_without_entities_does_not_signal() {
    let conn = setup();
    let recorder = Arc::new(RecordingCleaner::default());
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap())
        .with_cleaner(recorder.clone());
    add(&service, None, NodeType::Group, "g", "Finance");
    add(&service, Some("g"), NodeType::Domain, "d", "Ledger");

    service.delete(&id("g")).unwrap();
    assert!(recorder.calls.lock().unwrap().is_empty());
}

#[test]
fn replace_object_content_swaps_entities_atomically() {
    let conn = setup();
    let recorder = Arc::new(RecordingCleaner::default());
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap())
        .with_cleaner(recorder.clone());
    seed_chain(&service);

    let stored = service
        .replace_business_object_content(
            &id("o"),
            vec![
                EntityDraft {
                    entity: NodeDraft::new(NodeType::LogicEntity, "Header").with_id(id("h")),
                    attributes: vec![
                        NodeDraft::new(NodeType::Attribute, "invoice_no")
                            .with_id(id("h1"))
                            .unique(),
                        NodeDraft::new(NodeType::Attribute, "issued_at").with_id(id("h2")),
                    ],
                },
                EntityDraft {
                    entity: NodeDraft::new(NodeType::LogicEntity, "Line").with_id(id("l")),
                    attributes: vec![NodeDraft::new(NodeType::Attribute, "qty")
                        .with_id(id("l1"))
                        .with_label("internal")],
                },
            ],
            "importer",
        )
        .unwrap();

    assert_eq!(stored.len(), 5);
    assert_eq!(stored[0].node_type, NodeType::LogicEntity);
    assert_eq!(stored[4].node_type, NodeType::Attribute);
    assert!(service.get_node(&id("e")).is_err());
    assert!(service.get_node(&id("f")).is_err());
    assert_eq!(
        service.get_node(&id("l1")).unwrap().path,
        "Finance/Ledger/Invoice/Line/qty"
    );
    assert_eq!(recorder.calls.lock().unwrap()[0], vec![id("e")]);
}

#[test]
fn replace_object_content_validates_batch_before_writing() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);

    let err = service
        .replace_business_object_content(
            &id("o"),
            vec![
                EntityDraft {
                    entity: NodeDraft::new(NodeType::LogicEntity, "Header"),
                    attributes: Vec::new(),
                },
                EntityDraft {
                    entity: NodeDraft::new(NodeType::LogicEntity, " Header "),
                    attributes: Vec::new(),
                },
            ],
            "importer",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::NameRepeat { .. }));

    let err = service
        .replace_business_object_content(
            &id("o"),
            vec![EntityDraft {
                entity: NodeDraft::new(NodeType::LogicEntity, "Header"),
                attributes: vec![
                    NodeDraft::new(NodeType::Attribute, "a").unique(),
                    NodeDraft::new(NodeType::Attribute, "b").unique(),
                ],
            }],
            "importer",
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::UniqueAttributeExists { .. }));

    let err = service
        .replace_business_object_content(&id("d"), Vec::new(), "importer")
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::Validation(_)));

    // Nothing was written by the rejected batches.
    assert_eq!(service.get_node(&id("f")).unwrap().name, "amount");
}

#[test]
fn list_nodes_pages_with_total_and_has_child() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    let config = CatalogConfig::default();
    add(&service, None, NodeType::Group, "g1", "Charlie");
    add(&service, None, NodeType::Group, "g2", "alpha");
    add(&service, None, NodeType::Group, "g3", "Bravo");
    add(&service, Some("g3"), NodeType::Domain, "d1", "Alpine");

    let query = NodeListQuery {
        limit: Some(2),
        ..NodeListQuery::default()
    };
    let page = service.list_nodes(&query, &config.list).unwrap();
    assert_eq!(page.total, 3);
    let names: Vec<&str> = page.items.iter().map(|item| item.node.name.as_str()).collect();
    assert_eq!(names, vec!["Bravo", "Charlie"]);
    assert!(page.items[0].has_child);
    assert!(!page.items[1].has_child);

    let second = service
        .list_nodes(
            &NodeListQuery {
                offset: 2,
                ..query.clone()
            },
            &config.list,
        )
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].node.name, "alpha");

    let searched = service
        .list_nodes(
            &NodeListQuery {
                keyword: Some("ALP".to_string()),
                sort: SortField::Name,
                direction: SortDirection::Desc,
                ..NodeListQuery::default()
            },
            &config.list,
        )
        .unwrap();
    let names: Vec<&str> = searched
        .items
        .iter()
        .map(|item| item.node.name.as_str())
        .collect();
    assert_eq!(searched.total, 2);
    assert_eq!(names, vec!["alpha", "Alpine"]);

    let children = service
        .list_nodes(
            &NodeListQuery {
                parent_id: Some(id("g3")),
                ..NodeListQuery::default()
            },
            &config.list,
        )
        .unwrap();
    assert_eq!(children.total, 1);
    assert_eq!(children.items[0].node.id, id("d1"));
}

#[test]
fn list_nodes_breaks_ties_by_id() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    let config = CatalogConfig::default();
    add(&service, None, NodeType::Group, "g", "Finance");
    add(&service, Some("g"), NodeType::Domain, "d2", "Same-2");
    add(&service, Some("g"), NodeType::Domain, "d1", "Same-1");
    add(&service, Some("g"), NodeType::Domain, "d3", "Same-3");

    let page = service
        .list_nodes(
            &NodeListQuery {
                parent_id: Some(id("g")),
                sort: SortField::CreatedAt,
                ..NodeListQuery::default()
            },
            &config.list,
        )
        .unwrap();
    let ids: Vec<&str> = page.items.iter().map(|item| item.node.id.as_str()).collect();
    // Rows usually share a timestamp; ties fall back to id order.
    let mut sorted = page.items.clone();
    sorted.sort_by(|a, b| {
        a.node
            .created_at
            .cmp(&b.node.created_at)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    let expected: Vec<&str> = sorted.iter().map(|item| item.node.id.as_str()).collect();
    assert_eq!(ids, expected);
}

#[test]
fn list_nodes_rejects_unknown_parent() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    let err = service
        .list_nodes(
            &NodeListQuery {
                parent_id: Some(id("ghost")),
                ..NodeListQuery::default()
            },
            &CatalogConfig::default().list,
        )
        .unwrap_err();
    assert!(matches!(err, TreeServiceError::ParentNotFound(_)));
}

#[test]
fn repository_root_relation_maps_every_node() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);
    add(&service, None, NodeType::Group, "g2", "Sales");

    let relation = service.repo().root_relation().unwrap();
    assert_eq!(relation.len(), 6);
    assert_eq!(relation[&id("f")], id("g"));
    assert_eq!(relation[&id("g2")], id("g2"));
}

#[test]
fn repository_insert_batch_is_all_or_nothing() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    add(&service, None, NodeType::Group, "g", "Finance");
    let group = service.get_node(&id("g")).unwrap();

    let first = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::Domain, "Ledger").with_id(id("d1")),
        Some(&group),
        "batch",
    );
    let clash = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::Domain, "Ledger").with_id(id("d2")),
        Some(&group),
        "batch",
    );
    let err = service
        .repo()
        .insert_batch(&[first.clone(), clash])
        .unwrap_err();
    assert!(matches!(
        err,
        metacat_core::NodeRepoError::DuplicateName { ref name, .. } if name == "Ledger"
    ));
    assert!(service.list_children(Some(&id("g"))).unwrap().is_empty());

    let object = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::BusinessObject, "Invoice").with_id(id("o1")),
        Some(&first),
        "batch",
    );
    service.repo().insert_batch(&[first, object]).unwrap();
    assert_eq!(
        service.get_node(&id("o1")).unwrap().path,
        "Finance/Ledger/Invoice"
    );
}

#[test]
fn unique_attribute_slot_is_checked_by_the_write() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);
    let entity = service.get_node(&id("e")).unwrap();

    let first = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::Attribute, "code")
            .with_id(id("k1"))
            .unique(),
        Some(&entity),
        "a",
    );
    let second = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::Attribute, "number")
            .with_id(id("k2"))
            .unique(),
        Some(&entity),
        "b",
    );
    service.repo().insert(&first).unwrap();
    let err = service.repo().insert(&second).unwrap_err();
    assert!(matches!(
        err,
        metacat_core::NodeRepoError::UniqueAttributeTaken { ref entity_id } if *entity_id == id("e")
    ));
    assert!(service.get_node(&id("k2")).is_err());

    let mut promoted = service.get_node(&id("f")).unwrap();
    promoted.unique = true;
    let err = service
        .repo()
        .update_with_descendants(&promoted, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        metacat_core::NodeRepoError::UniqueAttributeTaken { .. }
    ));
    assert!(!service.get_node(&id("f")).unwrap().unique);
}

#[test]
fn replace_children_rejects_nodes_not_attached_to_the_batch() {
    let conn = setup();
    let service = TreeService::new(SqliteNodeRepository::try_new(&conn).unwrap());
    seed_chain(&service);
    let entity = service.get_node(&id("e")).unwrap();
    let object = service.get_node(&id("o")).unwrap();

    // The attribute's entity is not part of the replacement batch.
    let loose = CatalogNode::from_draft(
        &NodeDraft::new(NodeType::Attribute, "loose").with_id(id("x1")),
        Some(&entity),
        "importer",
    );
    let err = service
        .repo()
        .replace_children(&object.path_id, &[loose])
        .unwrap_err();
    assert!(matches!(err, metacat_core::NodeRepoError::InvalidData(_)));
    assert_eq!(service.list_children(Some(&id("o"))).unwrap().len(), 1);
}
