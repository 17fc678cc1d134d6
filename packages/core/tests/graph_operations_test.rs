//! Integration tests for node/edge CRUD, label independence, delete modes,
//! traversal and search through the public `GraphDatabase` API

use relgraph_core::models::{
    DeleteMode, Direction, EdgeSearchCriteria, EdgeUpdate, FilterOperator, FullTextOptions,
    NewEdge, NewNode, NodeSearchCriteria, NodeUpdate, PropertyFilter, SortDirection, SortKey,
};
use relgraph_core::{sql_params, GraphConfig, GraphDatabase, GraphError};
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

async fn setup_file_db() -> (GraphDatabase, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = GraphDatabase::open(GraphConfig::with_path(temp_dir.path().join("graph.db")))
        .await
        .unwrap();
    (db, temp_dir)
}

async fn person(db: &GraphDatabase, label: &str) -> String {
    db.add_node(NewNode::new("Person", label)).await.unwrap().id
}

// =========================================================================
// Nodes & label independence
// =========================================================================

#[tokio::test]
async fn test_add_and_get_node() {
    let (db, _temp) = setup_file_db().await;

    let created = db
        .add_node(
            NewNode::new("Person", "Ada")
                .with_property("born", json!(1815))
                .with_property("tags", json!(["math", "poetry"])),
        )
        .await
        .unwrap();

    let fetched = db.get_node(&created.id).await.unwrap().expect("node");
    assert_eq!(fetched.node_type, "Person");
    assert_eq!(fetched.label, "Ada");
    assert!(fetched.is_independent);
    assert_eq!(fetched.property("born"), Some(&json!(1815)));
    assert_eq!(fetched.property("tags"), Some(&json!(["math", "poetry"])));
}

#[tokio::test]
async fn test_caller_supplied_id_is_kept() {
    let db = GraphDatabase::in_memory().await.unwrap();

    let node = assert_ok!(
        db.add_node(NewNode::new("Doc", "readme").with_id("doc-1"))
            .await
    );
    assert_eq!(node.id, "doc-1");

    let duplicate = assert_err!(
        db.add_node(NewNode::new("Doc", "other").with_id("doc-1"))
            .await
    );
    assert!(matches!(duplicate, GraphError::NodeWrite { .. }));
}

#[tokio::test]
async fn test_reserved_and_empty_node_types_are_rejected() {
    let db = GraphDatabase::in_memory().await.unwrap();

    assert!(matches!(
        db.add_node(NewNode::new("", "x")).await,
        Err(GraphError::Validation(_))
    ));
    assert!(matches!(
        db.add_node(NewNode::new("RELATIONSHIP_TYPE", "x")).await,
        Err(GraphError::Validation(_))
    ));
}

#[tokio::test]
async fn test_relabel_restores_independence_of_old_label_group() {
    let db = GraphDatabase::in_memory().await.unwrap();

    let a = person(&db, "X").await;
    let b = person(&db, "X").await;

    let a_node = db.get_node(&a).await.unwrap().unwrap();
    let b_node = db.get_node(&b).await.unwrap().unwrap();
    assert!(a_node.is_independent);
    assert!(!b_node.is_independent);

    let relabeled = db
        .update_node(&a, NodeUpdate::new().with_label("Y"))
        .await
        .unwrap();
    assert!(relabeled.is_independent);

    let b_node = db.get_node(&b).await.unwrap().unwrap();
    assert!(b_node.is_independent, "B is now the sole holder of X");
}

#[tokio::test]
async fn test_each_label_has_exactly_one_independent_node() {
    let db = GraphDatabase::in_memory().await.unwrap();

    let first = person(&db, "shared").await;
    person(&db, "shared").await;
    person(&db, "shared").await;
    person(&db, "solo").await;

    let independent_count = |label: &'static str| {
        let db = &db;
        async move {
            db.search_nodes(
                &NodeSearchCriteria::new()
                    .with_label(label)
                    .with_independent(true),
            )
            .await
            .unwrap()
            .total
        }
    };

    assert_eq!(independent_count("shared").await, 1);
    assert_eq!(independent_count("solo").await, 1);

    // Removing the holder promotes one of the remaining members
    db.delete_node(&first, DeleteMode::KeepConnected)
        .await
        .unwrap();
    assert_eq!(independent_count("shared").await, 1);
}

#[tokio::test]
async fn test_update_missing_node_is_not_found() {
    let db = GraphDatabase::in_memory().await.unwrap();

    let result = db
        .update_node("missing", NodeUpdate::new().with_label("x"))
        .await;
    assert!(matches!(result, Err(GraphError::NodeNotFound { id }) if id == "missing"));
}

#[tokio::test]
async fn test_update_replaces_whole_property_set() {
    let db = GraphDatabase::in_memory().await.unwrap();

    let node = db
        .add_node(
            NewNode::new("Task", "write docs")
                .with_property("status", json!("open"))
                .with_property("priority", json!(2)),
        )
        .await
        .unwrap();

    let mut properties = serde_json::Map::new();
    properties.insert("status".into(), json!("done"));
    db.update_node(&node.id, NodeUpdate::new().with_properties(properties))
        .await
        .unwrap();

    let stored = db.get_node(&node.id).await.unwrap().unwrap();
    assert_eq!(stored.property("status"), Some(&json!("done")));
    assert!(stored.property("priority").is_none());
}

// =========================================================================
// Edges & delete modes
// =========================================================================

#[tokio::test]
async fn test_add_edge_validates_endpoints() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;

    let result = db.add_edge(NewEdge::new(&a, "ghost", "KNOWS")).await;
    assert!(matches!(result, Err(GraphError::NodeNotFound { id }) if id == "ghost"));

    let relay = db.add_edge(NewEdge::new(&a, &a, "RELAY")).await;
    assert!(matches!(relay, Err(GraphError::Validation(_))));
}

#[tokio::test]
async fn test_update_plain_edge() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    let c = person(&db, "c").await;

    let edge = db
        .add_edge(NewEdge::new(&a, &b, "KNOWS").with_property("since", json!(2020)))
        .await
        .unwrap();

    let updated = db
        .update_edge(
            &edge.id,
            EdgeUpdate::new().with_target(&c).with_edge_type("TRUSTS"),
        )
        .await
        .unwrap();
    assert_eq!(updated.target_id.as_deref(), Some(c.as_str()));
    assert_eq!(updated.edge_type, "TRUSTS");
    assert_eq!(updated.property("since"), Some(&json!(2020)));

    let missing = db.update_edge("nope", EdgeUpdate::new()).await;
    assert!(matches!(missing, Err(GraphError::EdgeNotFound { .. })));
}

#[tokio::test]
async fn test_delete_keep_connected_nulls_endpoints() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    let c = person(&db, "c").await;

    let ab = db.add_edge(NewEdge::new(&a, &b, "KNOWS")).await.unwrap();
    let cb = db.add_edge(NewEdge::new(&c, &b, "KNOWS")).await.unwrap();

    assert_ok!(db.delete_node(&b, DeleteMode::KeepConnected).await);

    assert!(db.get_node(&b).await.unwrap().is_none());
    let ab = db.get_edge(&ab.id).await.unwrap().expect("edge survives");
    let cb = db.get_edge(&cb.id).await.unwrap().expect("edge survives");
    assert_eq!(ab.source_id.as_deref(), Some(a.as_str()));
    assert!(ab.target_id.is_none());
    assert!(cb.target_id.is_none());
}

#[tokio::test]
async fn test_delete_cascade_removes_touching_edges() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    let c = person(&db, "c").await;

    let ab = db
        .add_edge(NewEdge::new(&a, &b, "KNOWS").with_property("w", json!(1)))
        .await
        .unwrap();
    db.add_edge(NewEdge::new(&b, &c, "KNOWS")).await.unwrap();
    let ac = db.add_edge(NewEdge::new(&a, &c, "KNOWS")).await.unwrap();
    let mut owed = serde_json::Map::new();
    owed.insert("amount".into(), json!(10));
    db.create_structured_relationship(&c, &b, "owes", owed)
        .await
        .unwrap();

    db.delete_node(&b, DeleteMode::Cascade).await.unwrap();

    let edges = db.get_edges().await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, ac.id);
    assert!(edges.iter().all(|e| !e.touches(&b)));

    // Neighbors are untouched
    assert!(db.get_node(&a).await.unwrap().is_some());
    assert!(db.get_node(&c).await.unwrap().is_some());

    // No dangling relationship nodes or relays
    let report = db.validate_structured_relationships().await.unwrap();
    assert_eq!(report.relationship_nodes, 0);
    assert!(report.is_valid());

    // Edge properties went with their edges
    let own_props = db
        .backend()
        .query(
            "SELECT COUNT(*) FROM relationship_properties WHERE relationship_id = ?",
            sql_params![&ab.id],
        )
        .await
        .unwrap();
    assert_eq!(own_props[0].integer(0).unwrap(), 0);
    let all_props = db
        .backend()
        .query("SELECT COUNT(*) FROM relationship_properties", sql_params![])
        .await
        .unwrap();
    assert_eq!(all_props[0].integer(0).unwrap(), 0);
}

#[tokio::test]
async fn test_delete_missing_node_is_not_found() {
    let db = GraphDatabase::in_memory().await.unwrap();

    for mode in [DeleteMode::KeepConnected, DeleteMode::Cascade] {
        let result = db.delete_node("missing", mode).await;
        assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
    }
}

#[tokio::test]
async fn test_get_node_edges_by_direction() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    let c = person(&db, "c").await;

    db.add_edge(NewEdge::new(&a, &b, "KNOWS")).await.unwrap();
    db.add_edge(NewEdge::new(&c, &a, "KNOWS")).await.unwrap();
    db.create_structured_relationship(&a, &c, "owns", serde_json::Map::new())
        .await
        .unwrap();

    let outgoing = db.get_node_edges(&a, Direction::Outgoing).await.unwrap();
    let incoming = db.get_node_edges(&a, Direction::Incoming).await.unwrap();
    let both = db.get_node_edges(&a, Direction::Both).await.unwrap();

    assert_eq!(outgoing.len(), 2);
    assert_eq!(incoming.len(), 1);
    assert_eq!(both.len(), 3);
    assert!(outgoing.iter().any(|e| e.is_structured()));
    assert!(both.iter().all(|e| !e.is_relay()));
}

// =========================================================================
// Traversal
// =========================================================================

#[tokio::test]
async fn test_find_path_respects_max_depth() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "A").await;
    let b = person(&db, "B").await;
    let c = person(&db, "C").await;

    let ab = db.add_edge(NewEdge::new(&a, &b, "NEXT")).await.unwrap();
    let bc = db.add_edge(NewEdge::new(&b, &c, "NEXT")).await.unwrap();

    let path = db.find_path(&a, &c, 2).await.unwrap();
    let ids: Vec<&str> = path.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![ab.id.as_str(), bc.id.as_str()]);

    assert!(db.find_path(&a, &c, 1).await.unwrap().is_empty());
    assert!(db.find_path(&a, &a, 5).await.unwrap().is_empty());
    assert!(db.find_path(&c, &a, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_path_crosses_structured_relationships() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "A").await;
    let b = person(&db, "B").await;
    let c = person(&db, "C").await;

    let rel = db
        .create_structured_relationship(&a, &b, "owns", serde_json::Map::new())
        .await
        .unwrap();
    db.add_edge(NewEdge::new(&b, &c, "NEXT")).await.unwrap();

    let path = db.find_path(&a, &c, 2).await.unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].id, rel);
    assert_eq!(path[0].edge_type, "owns");
}

#[tokio::test]
async fn test_find_path_missing_endpoint() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "A").await;

    let result = db.find_path(&a, "ghost", 3).await;
    assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
}

#[tokio::test]
async fn test_find_connected_nodes_by_depth() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "A").await;
    let b = person(&db, "B").await;
    let c = person(&db, "C").await;
    let d = person(&db, "D").await;

    db.add_edge(NewEdge::new(&a, &b, "NEXT")).await.unwrap();
    db.add_edge(NewEdge::new(&c, &b, "NEXT")).await.unwrap();
    db.add_edge(NewEdge::new(&c, &d, "NEXT")).await.unwrap();

    let depth_one: Vec<String> = db
        .find_connected_nodes(&b, 1)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(depth_one.len(), 2);
    assert!(depth_one.contains(&a) && depth_one.contains(&c));

    let depth_two = db.find_connected_nodes(&b, 2).await.unwrap();
    assert_eq!(depth_two.len(), 3);
    assert_eq!(depth_two.last().map(|n| n.id.as_str()), Some(d.as_str()));
    assert!(depth_two.iter().all(|n| n.id != b));
}

// =========================================================================
// Search
// =========================================================================

async fn seed_people(db: &GraphDatabase) {
    for (name, age, city) in [
        ("Alice", 34, "Berlin"),
        ("Bob", 27, "Paris"),
        ("Carol", 41, "Berlin"),
        ("Dave", 19, "Lisbon"),
    ] {
        db.add_node(
            NewNode::new("Person", name)
                .with_property("age", json!(age))
                .with_property("city", json!(city)),
        )
        .await
        .unwrap();
    }
    db.add_node(NewNode::new("City", "Berlin")).await.unwrap();
}

#[tokio::test]
async fn test_search_nodes_with_property_filters_and_sort() {
    let db = GraphDatabase::in_memory().await.unwrap();
    seed_people(&db).await;

    let criteria = NodeSearchCriteria::new()
        .with_node_type("Person")
        .with_property_filter(PropertyFilter::new(
            "age",
            FilterOperator::GreaterThan,
            json!(25),
        ))
        .with_sort(SortKey::Property("age".into()), SortDirection::Desc);

    let result = db.search_nodes(&criteria).await.unwrap();
    let labels: Vec<&str> = result.items.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["Carol", "Alice", "Bob"]);
    assert_eq!(result.total, 3);
}

#[tokio::test]
async fn test_search_nodes_pagination_counts_total_first() {
    let db = GraphDatabase::in_memory().await.unwrap();
    seed_people(&db).await;

    let criteria = NodeSearchCriteria::new()
        .with_node_type("Person")
        .with_sort(SortKey::Label, SortDirection::Asc)
        .with_offset(1)
        .with_limit(2);

    let result = db.search_nodes(&criteria).await.unwrap();
    let labels: Vec<&str> = result.items.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["Bob", "Carol"]);
    assert_eq!(result.total, 4);
}

#[tokio::test]
async fn test_search_nodes_string_operators() {
    let db = GraphDatabase::in_memory().await.unwrap();
    seed_people(&db).await;

    let berliners = db
        .search_nodes(&NodeSearchCriteria::new().with_property_filter(PropertyFilter::new(
            "city",
            FilterOperator::Equals,
            json!("Berlin"),
        )))
        .await
        .unwrap();
    assert_eq!(berliners.total, 2);

    let without_city = db
        .search_nodes(&NodeSearchCriteria::new().with_property_filter(PropertyFilter::not_exists(
            "city",
        )))
        .await
        .unwrap();
    assert_eq!(without_city.total, 1);
    assert_eq!(without_city.items[0].node_type, "City");

    let label_fragment = db
        .search_nodes(&NodeSearchCriteria::new().with_label_contains("ar"))
        .await
        .unwrap();
    assert_eq!(label_fragment.total, 1);
    assert_eq!(label_fragment.items[0].label, "Carol");
}

#[tokio::test]
async fn test_search_edges_by_type_and_structure() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    let c = person(&db, "c").await;

    db.add_edge(NewEdge::new(&a, &b, "KNOWS").with_property("weight", json!(3)))
        .await
        .unwrap();
    db.add_edge(NewEdge::new(&a, &c, "KNOWS").with_property("weight", json!(8)))
        .await
        .unwrap();
    let mut props = serde_json::Map::new();
    props.insert("weight".into(), json!(5));
    db.create_structured_relationship(&b, &c, "KNOWS", props)
        .await
        .unwrap();

    let heavy = db
        .search_edges(
            &EdgeSearchCriteria::new()
                .with_edge_type("KNOWS")
                .with_property_filter(PropertyFilter::new(
                    "weight",
                    FilterOperator::GreaterThanOrEqual,
                    json!(5),
                )),
        )
        .await
        .unwrap();
    assert_eq!(heavy.total, 2);

    let structured = db
        .search_edges(&EdgeSearchCriteria::new().with_structured(true))
        .await
        .unwrap();
    assert_eq!(structured.total, 1);
    assert_eq!(structured.items[0].source_id.as_deref(), Some(b.as_str()));

    let from_a = db
        .search_edges(&EdgeSearchCriteria::new().with_source(&a))
        .await
        .unwrap();
    assert_eq!(from_a.total, 2);
}

#[tokio::test]
async fn test_full_text_search() {
    let db = GraphDatabase::in_memory().await.unwrap();
    seed_people(&db).await;
    let people = db
        .search_nodes(&NodeSearchCriteria::new().with_label("Alice"))
        .await
        .unwrap();
    let alice = people.items[0].id.clone();
    let berlin = db
        .search_nodes(&NodeSearchCriteria::new().with_node_type("City"))
        .await
        .unwrap()
        .items[0]
        .id
        .clone();
    db.add_edge(NewEdge::new(&alice, &berlin, "LIVES_IN"))
        .await
        .unwrap();

    // "berlin" matches the City label and two city properties
    let result = db
        .full_text_search("berlin", &FullTextOptions::default())
        .await
        .unwrap();
    assert_eq!(result.total_nodes, 3);

    let case_sensitive = FullTextOptions {
        case_sensitive: true,
        ..FullTextOptions::default()
    };
    let result = db.full_text_search("berlin", &case_sensitive).await.unwrap();
    assert_eq!(result.total_nodes, 0);

    let labels_only = FullTextOptions {
        include_properties: false,
        ..FullTextOptions::default()
    };
    let result = db.full_text_search("Berlin", &labels_only).await.unwrap();
    assert_eq!(result.total_nodes, 1);

    let result = db
        .full_text_search("lives", &FullTextOptions::default())
        .await
        .unwrap();
    assert_eq!(result.total_edges, 1);
    assert_eq!(result.edges[0].edge_type, "LIVES_IN");
}

// =========================================================================
// Stats & lifecycle
// =========================================================================

#[tokio::test]
async fn test_stats_exclude_internal_entities() {
    let db = GraphDatabase::in_memory().await.unwrap();
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    db.add_edge(NewEdge::new(&a, &b, "KNOWS")).await.unwrap();
    db.create_structured_relationship(&a, &b, "owns", serde_json::Map::new())
        .await
        .unwrap();

    let stats = db.get_stats().await.unwrap();
    assert_eq!(stats.node_count, 2);
    assert_eq!(stats.edge_count, 2);
    assert_eq!(stats.structured_relationship_count, 1);
    assert_eq!(stats.nodes_by_type.get("Person"), Some(&2));
    assert_eq!(stats.edges_by_type.get("owns"), Some(&1));
    assert!(!stats.edges_by_type.contains_key("RELAY"));
}

#[tokio::test]
async fn test_clear_and_close() {
    let (db, _temp) = setup_file_db().await;
    let a = person(&db, "a").await;
    let b = person(&db, "b").await;
    db.add_edge(NewEdge::new(&a, &b, "KNOWS")).await.unwrap();

    db.clear().await.unwrap();
    assert!(db.get_nodes().await.unwrap().is_empty());
    assert!(db.get_edges().await.unwrap().is_empty());

    db.close().await.unwrap();
    assert!(matches!(
        db.get_nodes().await,
        Err(GraphError::Database(_))
    ));
    assert!(matches!(
        db.add_node(NewNode::new("Person", "late")).await,
        Err(GraphError::Database(_))
    ));
    assert!(matches!(
        db.delete_node(&a, DeleteMode::Cascade).await,
        Err(GraphError::Database(_))
    ));
}
