//! Property-based tests for catalog orderability

use super::*;
use crate::runtime::testing::InMemoryCatalog;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Generators
// ============================================================================

/// A forest where every node's parent appears earlier in the list, so it is
/// always acyclic
fn arb_forest() -> impl Strategy<Value = Vec<CatalogNode>> {
    proptest::collection::vec((any::<prop::sample::Index>(), any::<bool>(), prop_oneof![Just(0.0), 1.0..100.0f64]), 1..16)
        .prop_map(|specs| {
            let mut nodes: Vec<CatalogNode> = Vec::with_capacity(specs.len());
            for (i, (parent_pick, is_root, price)) in specs.into_iter().enumerate() {
                let mut node = CatalogNode::new(format!("n{i}"), format!("Node {i}"));
                if price > 0.0 {
                    node.price = Some(price);
                }
                if i > 0 && !is_root {
                    node.parent_id = Some(nodes[parent_pick.index(i)].id.clone());
                }
                nodes.push(node);
            }
            nodes
        })
}

fn brute_force_orderable(nodes: &[CatalogNode], id: &str) -> bool {
    let Some(node) = nodes.iter().find(|n| n.id == id) else {
        return false;
    };
    node.is_orderable()
        || nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(id))
            .any(|child| brute_force_orderable(nodes, &child.id))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_orderability_matches_exhaustive_search(nodes in arb_forest()) {
        let resolver = CatalogResolver::new(Arc::new(InMemoryCatalog::new(nodes.clone())));
        for node in &nodes {
            let fast = block_on(resolver.is_transitively_orderable(node)).unwrap();
            prop_assert_eq!(fast, brute_force_orderable(&nodes, &node.id), "node {}", node.id);
        }
    }

    #[test]
    fn prop_breadcrumb_ends_at_node_and_starts_at_root(nodes in arb_forest()) {
        let resolver = CatalogResolver::new(Arc::new(InMemoryCatalog::new(nodes.clone())));
        for node in &nodes {
            let path = block_on(resolver.breadcrumb(node)).unwrap();
            prop_assert_eq!(path.last(), Some(&node.name));

            let first = path.first().unwrap();
            let root = nodes.iter().find(|n| &n.name == first).unwrap();
            prop_assert!(root.parent_id.is_none());
        }
    }
}
