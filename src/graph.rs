//! # Graph Module
//!
//! The output structure of a crawl: a directed graph over canonical page
//! addresses.
//!
//! ## Overview
//!
//! Nodes are keyed by canonical address and carry the resolved title plus a
//! shared reference to the entity. Node and edge insertion are idempotent
//! (re-inserting an existing node or edge is silently ignored) and each
//! insertion is atomic: all mutation happens under one short lock, so readers
//! never observe a half-inserted node or edge. Insertion order is preserved
//! for export.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::WikiError;
use crate::page::Page;

/// One node of the crawl graph.
#[derive(Clone)]
pub struct GraphNode {
    pub address: String,
    pub title: String,
    pub page: Arc<Page>,
}

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<String, GraphNode>,
    node_order: Vec<String>,
    edges: HashSet<(String, String)>,
    edge_order: Vec<(String, String)>,
}

/// Directed graph keyed by canonical address.
#[derive(Default)]
pub struct PageGraph {
    inner: Mutex<GraphInner>,
}

/// Serializable adjacency representation of a [`PageGraph`].
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeExport {
    pub address: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeExport {
    pub from: String,
    pub to: String,
}

impl PageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node; returns whether it was new. The first insertion wins.
    pub fn insert_node(&self, node: GraphNode) -> bool {
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(&node.address) {
            return false;
        }
        inner.node_order.push(node.address.clone());
        inner.nodes.insert(node.address.clone(), node);
        true
    }

    /// Inserts the edge `from → to`; returns whether it was new.
    pub fn insert_edge(&self, from: &str, to: &str) -> bool {
        let mut inner = self.inner.lock();
        let edge = (from.to_string(), to.to_string());
        if !inner.edges.insert(edge.clone()) {
            return false;
        }
        inner.edge_order.push(edge);
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.lock().nodes.contains_key(address)
    }

    /// The node at `address`, if present.
    pub fn node(&self, address: &str) -> Option<GraphNode> {
        self.inner.lock().nodes.get(address).cloned()
    }

    /// Addresses directly linked from `address`, in insertion order.
    pub fn neighbors(&self, address: &str) -> Vec<String> {
        self.inner
            .lock()
            .edge_order
            .iter()
            .filter(|(from, _)| from == address)
            .map(|(_, to)| to.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().edges.len()
    }

    /// Node list + edge list, in insertion order.
    pub fn export(&self) -> GraphExport {
        let inner = self.inner.lock();
        GraphExport {
            nodes: inner
                .node_order
                .iter()
                .filter_map(|address| inner.nodes.get(address))
                .map(|node| NodeExport {
                    address: node.address.clone(),
                    title: node.title.clone(),
                })
                .collect(),
            edges: inner
                .edge_order
                .iter()
                .map(|(from, to)| EdgeExport {
                    from: from.clone(),
                    to: to.clone(),
                })
                .collect(),
        }
    }

    /// The exported graph as a JSON string.
    pub fn to_json_string(&self) -> Result<String, WikiError> {
        serde_json::to_string(&self.export()).map_err(|e| WikiError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for PageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PageGraph")
            .field("nodes", &inner.nodes.len())
            .field("edges", &inner.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageTarget;
    use crate::testing::ScriptedTransport;
    use crate::wiki::Wiki;

    fn test_node(address: &str, title: &str) -> GraphNode {
        let wiki = Wiki::builder()
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap();
        let page = crate::page::Page::new(
            wiki.inner(),
            PageTarget::Address(address.to_string()),
            None,
        )
        .unwrap();
        GraphNode {
            address: address.to_string(),
            title: title.to_string(),
            page: Arc::new(page),
        }
    }

    #[test]
    fn node_insertion_is_idempotent() {
        let graph = PageGraph::new();
        let address = "https://en.wikipedia.org/wiki/Rust";
        assert!(graph.insert_node(test_node(address, "Rust")));
        assert!(!graph.insert_node(test_node(address, "Rust again")));

        assert_eq!(graph.len(), 1);
        // First insertion wins.
        assert_eq!(graph.node(address).unwrap().title, "Rust");
    }

    #[test]
    fn edge_insertion_is_idempotent() {
        let graph = PageGraph::new();
        assert!(graph.insert_edge("a", "b"));
        assert!(!graph.insert_edge("a", "b"));
        assert!(graph.insert_edge("b", "a"));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn export_preserves_insertion_order() {
        let graph = PageGraph::new();
        graph.insert_node(test_node("https://en.wikipedia.org/wiki/A", "A"));
        graph.insert_node(test_node("https://en.wikipedia.org/wiki/B", "B"));
        graph.insert_edge(
            "https://en.wikipedia.org/wiki/A",
            "https://en.wikipedia.org/wiki/B",
        );

        let export = graph.export();
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.nodes[0].title, "A");
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].from, "https://en.wikipedia.org/wiki/A");

        let json = graph.to_json_string().unwrap();
        assert!(json.contains("\"nodes\""));
        assert!(json.contains("\"edges\""));
    }

    #[test]
    fn neighbors_follow_edge_order() {
        let graph = PageGraph::new();
        graph.insert_edge("a", "c");
        graph.insert_edge("a", "b");
        assert_eq!(graph.neighbors("a"), vec!["c".to_string(), "b".to_string()]);
        assert!(graph.neighbors("b").is_empty());
    }
}
