//! Incremental relationship graph engine: entity resolution, relation
//! merging, ego-network filtering, and the orchestrator that ties them to
//! the snapshot cache.

use serde::{Deserialize, Serialize};

pub mod ego;
pub mod merge;
pub mod orchestrator;
pub mod resolver;

pub use orchestrator::{GraphEngine, GraphRequest};

/// A character node in a computed graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_node_importance")]
    pub importance: i64,
}

fn default_node_importance() -> i64 {
    1
}

/// A relation edge in a computed graph. Importance is a derived score in
/// [0.0, 1.0], not the 1-5 character scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: i64,
    pub target_id: i64,
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
    #[serde(default)]
    pub description: String,
    pub importance: f64,
}

/// A materialized relationship graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
