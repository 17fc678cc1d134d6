//! Performance benchmarks for RelGraph core operations
//!
//! Run with: `cargo bench -p relgraph-core`
//!
//! These benchmarks measure critical path performance:
//! - Node and edge creation through the transaction queue
//! - Shortest-path search over a layered graph
//! - Property search with sorting and pagination

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relgraph_core::models::{
    FilterOperator, NewEdge, NewNode, NodeSearchCriteria, PropertyFilter, SortDirection, SortKey,
};
use relgraph_core::{GraphConfig, GraphDatabase};
use serde_json::json;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Setup a fresh file database
async fn setup_test_db() -> (GraphDatabase, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = GraphConfig {
        persist_on_commit: false,
        ..GraphConfig::with_path(temp_dir.path().join("bench.db"))
    };
    let db = GraphDatabase::open(config).await.unwrap();
    (db, temp_dir)
}

/// Build `layers` layers of `width` nodes, each node linked to every node of
/// the next layer. Returns (first node id, last node id).
async fn build_layered_graph(db: &GraphDatabase, layers: usize, width: usize) -> (String, String) {
    let mut previous: Vec<String> = Vec::new();
    let mut first = String::new();
    let mut last = String::new();

    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for i in 0..width {
            let node = db
                .add_node(
                    NewNode::new("Step", format!("step-{}-{}", layer, i))
                        .with_property("layer", json!(layer))
                        .with_property("rank", json!(i)),
                )
                .await
                .unwrap();
            current.push(node.id);
        }
        for source in &previous {
            for target in &current {
                db.add_edge(NewEdge::new(source, target, "NEXT"))
                    .await
                    .unwrap();
            }
        }
        if layer == 0 {
            first = current[0].clone();
        }
        last = current[width - 1].clone();
        previous = current;
    }

    (first, last)
}

/// Benchmark node creation (one transaction per node)
fn bench_add_node(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (db, _temp) = rt.block_on(setup_test_db());

    let mut counter = 0u64;
    c.bench_function("add_node", |b| {
        b.iter(|| {
            counter += 1;
            rt.block_on(async {
                let node = db
                    .add_node(
                        NewNode::new("Bench", format!("node-{}", counter))
                            .with_property("n", json!(counter)),
                    )
                    .await
                    .unwrap();
                black_box(node);
            })
        });
    });
}

/// Benchmark shortest path across a 6x5 layered graph (150 edges)
fn bench_find_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (db, _temp) = rt.block_on(setup_test_db());
    let (start, end) = rt.block_on(build_layered_graph(&db, 6, 5));

    c.bench_function("find_path_layered_6x5", |b| {
        b.iter(|| {
            rt.block_on(async {
                let path = db.find_path(&start, &end, 10).await.unwrap();
                assert_eq!(path.len(), 5);
                black_box(path);
            })
        });
    });
}

/// Benchmark filtered, sorted, paginated node search
fn bench_search_nodes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (db, _temp) = rt.block_on(setup_test_db());
    rt.block_on(build_layered_graph(&db, 20, 10));

    let criteria = NodeSearchCriteria::default()
        .with_node_type("Step")
        .with_property_filter(PropertyFilter::new(
            "rank",
            FilterOperator::GreaterThan,
            json!(4),
        ))
        .with_sort(SortKey::Property("layer".to_string()), SortDirection::Desc)
        .with_limit(25);

    c.bench_function("search_nodes_filtered", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = db.search_nodes(black_box(&criteria)).await.unwrap();
                black_box(result);
            })
        });
    });
}

criterion_group!(benches, bench_add_node, bench_find_path, bench_search_nodes);
criterion_main!(benches);
