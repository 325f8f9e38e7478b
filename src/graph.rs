//! Graph data model for the constellation
//!
//! Full node/edge records as delivered by data loaders, plus the reduced
//! projection that crosses the thread boundary into the physics worker.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Node identifier
pub type NodeId = String;

/// Edge identifier
pub type EdgeId = String;

/// Errors that can occur while loading a graph document
#[derive(Error, Debug)]
pub enum GraphError {
    /// The document could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid graph JSON
    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a node represents in the engagement hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Channel,
    Campaign,
    Hcp,
}

/// Health status, drives the ring color of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

/// A point in layout space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Position {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// A node in the constellation
///
/// Only `position` changes after creation, and only the simulation pipeline
/// writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    #[serde(default)]
    pub label: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub status: NodeStatus,

    /// Engagement score in [0, 1]
    #[serde(default)]
    pub engagement_score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,

    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Create a healthy node at the origin
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            status: NodeStatus::Healthy,
            engagement_score: 0.0,
            channel: None,
            specialty: None,
            position: Position::ORIGIN,
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the engagement score, clamped to [0, 1]
    pub fn with_engagement(mut self, score: f32) -> Self {
        self.engagement_score = clamp_engagement(score);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// Engagement scores live in [0, 1]; anything non-finite counts as 0
fn clamp_engagement(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A weighted edge between two nodes, referenced by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        weight: f32,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            weight,
        }
    }

    /// Weight used by the layout; non-positive or non-finite weights count as 1
    pub fn effective_weight(&self) -> f32 {
        if self.weight.is_finite() && self.weight > 0.0 {
            self.weight
        } else {
            1.0
        }
    }
}

/// Simulation-only view of a node
///
/// `fx`/`fy`/`fz` pin the node on that axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fz: Option<f32>,
}

impl WorkerNode {
    /// A node with no starting position; the simulation picks one
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.x = Some(position.x);
        self.y = Some(position.y);
        self.z = Some(position.z);
        self
    }

    /// Pin the node on all three axes
    pub fn pin(mut self, position: Position) -> Self {
        self.fx = Some(position.x);
        self.fy = Some(position.y);
        self.fz = Some(position.z);
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.fx.is_some() || self.fy.is_some() || self.fz.is_some()
    }
}

/// Simulation-only view of an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f32,
}

/// The reduced graph handed to the physics worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub nodes: Vec<WorkerNode>,
    pub edges: Vec<WorkerEdge>,
}

/// Options for projecting nodes into worker form
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectOptions {
    /// Seed the simulation with the nodes' current positions
    pub keep_positions: bool,
}

/// Edges whose endpoints are both present in `nodes`
///
/// Dangling edges are dropped silently: node and edge fetches routinely
/// disagree for a moment during hierarchy transitions.
pub fn retain_connected<'a>(nodes: &[Node], edges: &'a [Edge]) -> Vec<&'a Edge> {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let kept: Vec<&Edge> = edges
        .iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .collect();

    let dropped = edges.len() - kept.len();
    if dropped > 0 {
        debug!(dropped, "dropped dangling edges");
    }
    kept
}

/// Project full nodes/edges into the worker wire format
pub fn project(nodes: &[Node], edges: &[Edge], options: ProjectOptions) -> Projection {
    let worker_nodes = nodes
        .iter()
        .map(|n| {
            let node = WorkerNode::new(n.id.clone());
            if options.keep_positions {
                node.at(n.position)
            } else {
                node
            }
        })
        .collect();

    let worker_edges = retain_connected(nodes, edges)
        .into_iter()
        .map(|e| WorkerEdge {
            source: e.source.clone(),
            target: e.target.clone(),
            weight: e.effective_weight(),
        })
        .collect();

    Projection {
        nodes: worker_nodes,
        edges: worker_edges,
    }
}

/// A node/edge list as produced by data loaders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDocument {
    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        let mut doc: GraphDocument = serde_json::from_str(json)?;
        for node in &mut doc.nodes {
            node.engagement_score = clamp_engagement(node.engagement_score);
        }
        Ok(doc)
    }

    pub fn from_path(path: &Path) -> Result<Self, GraphError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
