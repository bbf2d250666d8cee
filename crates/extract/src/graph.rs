use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::schema::{ExtractedEntity, ExtractedRelationship};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphNode {
    pub title: String,
    /// Absent for nodes that only appear as a relationship endpoint.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub descriptions: Vec<String>,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub weight: f64,
    pub descriptions: Vec<String>,
    pub chunk_ids: Vec<String>,
}

/// Undirected entity graph. Nodes are keyed by entity title.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    graph: UnGraph<GraphNode, GraphEdge>,
    title_to_idx: HashMap<String, NodeIndex>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from merged tables. Entities sharing a title collapse onto one
    /// node (the later row's attributes win); relationship endpoints with
    /// no entity row get a bare node. Repeated undirected pairs keep the
    /// last relationship's attributes.
    pub fn build(entities: &[ExtractedEntity], relationships: &[ExtractedRelationship]) -> Self {
        let mut graph = Self::new();

        for entity in entities {
            let idx = graph.add_node(&entity.title);
            graph.graph[idx] = GraphNode {
                title: entity.title.clone(),
                entity_type: Some(entity.entity_type.clone()),
                descriptions: entity.descriptions.clone(),
                chunk_ids: entity.chunk_ids.clone(),
            };
        }

        for relationship in relationships {
            let source = graph.add_node(&relationship.source);
            let target = graph.add_node(&relationship.target);
            graph.graph.update_edge(
                source,
                target,
                GraphEdge {
                    weight: relationship.weight,
                    descriptions: relationship.descriptions.clone(),
                    chunk_ids: relationship.chunk_ids.clone(),
                },
            );
        }

        graph
    }

    fn add_node(&mut self, title: &str) -> NodeIndex {
        if let Some(&idx) = self.title_to_idx.get(title) {
            return idx;
        }

        let idx = self.graph.add_node(GraphNode {
            title: title.to_string(),
            ..GraphNode::default()
        });
        self.title_to_idx.insert(title.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, title: &str) -> Option<&GraphNode> {
        self.title_to_idx.get(title).map(|&idx| &self.graph[idx])
    }

    /// Edge lookup ignores endpoint order.
    pub fn edge(&self, a: &str, b: &str) -> Option<&GraphEdge> {
        let a = *self.title_to_idx.get(a)?;
        let b = *self.title_to_idx.get(b)?;
        self.graph.find_edge(a, b).map(|e| &self.graph[e])
    }

    pub fn neighbors(&self, title: &str) -> Vec<&str> {
        let Some(&idx) = self.title_to_idx.get(title) else {
            return Vec::new();
        };
        self.graph
            .neighbors(idx)
            .map(|n| self.graph[n].title.as_str())
            .collect()
    }

    pub fn graph(&self) -> &UnGraph<GraphNode, GraphEdge> {
        &self.graph
    }
}

#[derive(Serialize)]
struct EdgeView<'a> {
    source: &'a str,
    target: &'a str,
    #[serde(flatten)]
    edge: &'a GraphEdge,
}

#[derive(Serialize)]
struct GraphView<'a> {
    nodes: Vec<&'a GraphNode>,
    edges: Vec<EdgeView<'a>>,
}

impl Serialize for EntityGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let view = GraphView {
            nodes: self.graph.node_weights().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| EdgeView {
                    source: &self.graph[e.source()].title,
                    target: &self.graph[e.target()].title,
                    edge: e.weight(),
                })
                .collect(),
        };
        view.serialize(serializer)
    }
}
