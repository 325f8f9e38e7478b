//! Render adapters
//!
//! Read-only consumers of the store. They turn live node positions, the
//! zoom configuration and story focus into point/line geometry that a
//! renderer can draw directly. Nothing in here writes back to the store.

use serde::Serialize;

use crate::graph::{Node, NodeStatus, NodeType, Position};
use crate::store::ConstellationStore;
use crate::zoom::{LabelVisibility, ZoomConfig};

/// Opacity multiplier for nodes and edges outside the story focus
pub const DIMMED_OPACITY_FACTOR: f32 = 0.15;

/// Floor for the weight-scaled share of edge opacity
const MIN_EDGE_WEIGHT_FACTOR: f32 = 0.4;

/// Ring colors (RGBA, normalized 0.0-1.0)
pub mod colors {
    /// Healthy: Green (#50C878)
    pub const HEALTHY: [f32; 4] = [0.314, 0.784, 0.471, 1.0];

    /// Warning: Amber (#F5A623)
    pub const WARNING: [f32; 4] = [0.961, 0.651, 0.137, 1.0];

    /// Critical: Red (#E74C3C)
    pub const CRITICAL: [f32; 4] = [0.906, 0.298, 0.235, 1.0];
}

/// Status ring drawn around a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RingStyle {
    pub color: [f32; 4],
    /// Critical nodes pulse
    pub pulse: bool,
}

impl RingStyle {
    pub fn for_status(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Healthy => RingStyle {
                color: colors::HEALTHY,
                pulse: false,
            },
            NodeStatus::Warning => RingStyle {
                color: colors::WARNING,
                pulse: false,
            },
            NodeStatus::Critical => RingStyle {
                color: colors::CRITICAL,
                pulse: true,
            },
        }
    }
}

/// One drawable node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePoint {
    pub id: String,
    pub position: Position,
    pub scale: f32,
    pub opacity: f32,
    pub ring: RingStyle,
    pub show_label: bool,
    pub hovered: bool,
    pub selected: bool,
}

/// One drawable edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSegment {
    pub id: String,
    pub from: Position,
    pub to: Position,
    pub opacity: f32,
    /// Touches the hovered or a selected node
    pub highlighted: bool,
}

/// Hover card content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub title: String,
    pub lines: Vec<String>,
}

fn base_size(node_type: NodeType) -> f32 {
    match node_type {
        NodeType::Channel => 10.0,
        NodeType::Campaign => 6.0,
        NodeType::Hcp => 3.0,
    }
}

fn label_visible(labels: &LabelVisibility, node_type: NodeType) -> bool {
    match node_type {
        NodeType::Channel => labels.channels,
        NodeType::Campaign => labels.campaigns,
        NodeType::Hcp => labels.hcps,
    }
}

/// Size of a node at the given zoom; engagement grows it by up to 80%
pub fn node_scale(node: &Node, zoom: &ZoomConfig) -> f32 {
    base_size(node.node_type) * zoom.node_scale * (0.6 + 0.8 * node.engagement_score)
}

pub fn node_points(store: &ConstellationStore) -> Vec<NodePoint> {
    let zoom = store.zoom_level().config();
    let hovered = store.hovered_node_id();

    store
        .nodes()
        .iter()
        .map(|node| {
            let is_hovered = hovered == Some(node.id.as_str());
            let is_selected = store.is_selected(&node.id);
            let opacity = if store.is_node_dimmed(node) {
                DIMMED_OPACITY_FACTOR
            } else {
                1.0
            };

            NodePoint {
                id: node.id.clone(),
                position: node.position,
                scale: node_scale(node, zoom),
                opacity,
                ring: RingStyle::for_status(node.status),
                show_label: is_hovered || is_selected || label_visible(&zoom.labels, node.node_type),
                hovered: is_hovered,
                selected: is_selected,
            }
        })
        .collect()
}

pub fn edge_segments(store: &ConstellationStore) -> Vec<EdgeSegment> {
    let zoom = store.zoom_level().config();
    let max_weight = store
        .edges()
        .iter()
        .map(|e| e.effective_weight())
        .fold(0.0_f32, f32::max);
    let hovered = store.hovered_node_id();
    let touches = |id: &str| hovered == Some(id) || store.is_selected(id);

    store
        .edges()
        .iter()
        .filter_map(|edge| {
            let from = store.node(&edge.source)?.position;
            let to = store.node(&edge.target)?.position;

            let share = if max_weight > 0.0 {
                edge.effective_weight() / max_weight
            } else {
                1.0
            };
            let mut opacity = zoom.edge_opacity
                * (MIN_EDGE_WEIGHT_FACTOR + (1.0 - MIN_EDGE_WEIGHT_FACTOR) * share);
            if store.is_edge_dimmed(edge) {
                opacity *= DIMMED_OPACITY_FACTOR;
            }

            Some(EdgeSegment {
                id: edge.id.clone(),
                from,
                to,
                opacity,
                highlighted: touches(&edge.source) || touches(&edge.target),
            })
        })
        .collect()
}

pub fn tooltip(store: &ConstellationStore, id: &str) -> Option<Tooltip> {
    let node = store.node(id)?;
    let connections = store
        .edges()
        .iter()
        .filter(|e| e.source == node.id || e.target == node.id)
        .count();

    let kind = match node.node_type {
        NodeType::Channel => "Channel",
        NodeType::Campaign => "Campaign",
        NodeType::Hcp => "HCP",
    };
    let status = match node.status {
        NodeStatus::Healthy => "healthy",
        NodeStatus::Warning => "warning",
        NodeStatus::Critical => "critical",
    };

    let mut lines = vec![
        format!("{kind} ({status})"),
        format!("Engagement: {:.0}%", node.engagement_score * 100.0),
    ];
    if let Some(specialty) = &node.specialty {
        lines.push(format!("Specialty: {specialty}"));
    }
    if let Some(channel) = &node.channel {
        lines.push(format!("Channel: {channel}"));
    }
    lines.push(format!("Connections: {connections}"));

    Some(Tooltip {
        title: if node.label.is_empty() {
            node.id.clone()
        } else {
            node.label.clone()
        },
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::navigation::NavigationContext;
    use crate::store::StoryBeat;
    use crate::zoom::{ZoomLevel, ZoomThresholds};

    fn store() -> ConstellationStore {
        let mut store = ConstellationStore::new(ZoomThresholds::default());
        store.replace_graph(
            NavigationContext::L1,
            vec![
                Node::new("email", "Email", NodeType::Channel).with_engagement(0.5),
                Node::new("spring", "Spring Push", NodeType::Campaign).with_channel("email"),
                Node::new("dr-lee", "Dr. Lee", NodeType::Hcp)
                    .with_status(NodeStatus::Critical)
                    .with_channel("web")
                    .with_specialty("Oncology")
                    .with_engagement(0.62),
            ],
            vec![
                Edge::new("e1", "email", "spring", 4.0),
                Edge::new("e2", "spring", "dr-lee", 1.0),
            ],
        );
        store
    }

    fn point<'a>(points: &'a [NodePoint], id: &str) -> &'a NodePoint {
        points.iter().find(|p| p.id == id).unwrap()
    }

    #[test]
    fn labels_follow_zoom_level() {
        let mut store = store();

        let points = node_points(&store);
        assert!(point(&points, "email").show_label);
        assert!(!point(&points, "spring").show_label);
        assert!(!point(&points, "dr-lee").show_label);

        store.set_zoom_level(ZoomLevel::Hcp);
        let points = node_points(&store);
        assert!(points.iter().all(|p| p.show_label));
    }

    #[test]
    fn selected_node_always_shows_label() {
        let mut store = store();
        store.select("dr-lee");

        let points = node_points(&store);
        let lee = point(&points, "dr-lee");
        assert!(lee.show_label);
        assert!(lee.selected);
    }

    #[test]
    fn scale_tracks_zoom_and_engagement() {
        let mut store = store();
        let far = point(&node_points(&store), "email").scale;
        store.set_zoom_level(ZoomLevel::Hcp);
        let near = point(&node_points(&store), "email").scale;

        assert!((far - 10.0 * 1.6).abs() < 1e-4);
        assert!(near < far);
    }

    #[test]
    fn ring_comes_from_status() {
        let points = node_points(&store());
        assert_eq!(point(&points, "email").ring.color, colors::HEALTHY);
        assert!(point(&points, "dr-lee").ring.pulse);
    }

    #[test]
    fn heavier_edges_are_more_opaque() {
        let segments = edge_segments(&store());
        let base = ZoomLevel::Ecosystem.config().edge_opacity;

        assert_eq!(segments.len(), 2);
        assert!((segments[0].opacity - base).abs() < 1e-6);
        assert!(segments[1].opacity < segments[0].opacity);
        assert!(segments[1].opacity >= base * MIN_EDGE_WEIGHT_FACTOR);
    }

    #[test]
    fn edges_use_live_positions() {
        let mut store = store();
        let generation = store.generation();
        store.apply_positions(generation, &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let segments = edge_segments(&store);
        assert_eq!(segments[1].from, Position::new(1.0, 2.0, 3.0));
        assert_eq!(segments[1].to, Position::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn story_focus_dims_rather_than_hides() {
        let mut store = store();
        store.set_story_beat(Some(StoryBeat {
            title: "Web is lagging".to_string(),
            channel_focus: vec!["web".to_string()],
        }));
        store.toggle_story_mode();

        let points = node_points(&store);
        assert_eq!(points.len(), 3);
        assert_eq!(point(&points, "email").opacity, DIMMED_OPACITY_FACTOR);
        assert_eq!(point(&points, "dr-lee").opacity, 1.0);

        let segments = edge_segments(&store);
        assert_eq!(segments.len(), 2);
        let base = ZoomLevel::Ecosystem.config().edge_opacity;
        assert!((segments[0].opacity - base * DIMMED_OPACITY_FACTOR).abs() < 1e-6);
        assert!(segments[1].opacity > segments[0].opacity * 0.5);
    }

    #[test]
    fn hovered_edges_are_highlighted() {
        let mut store = store();
        store.set_hovered(Some("email"));

        let segments = edge_segments(&store);
        assert!(segments[0].highlighted);
        assert!(!segments[1].highlighted);
    }

    #[test]
    fn tooltip_describes_the_node() {
        let store = store();
        let tip = tooltip(&store, "dr-lee").unwrap();

        assert_eq!(tip.title, "Dr. Lee");
        assert_eq!(
            tip.lines,
            vec![
                "HCP (critical)",
                "Engagement: 62%",
                "Specialty: Oncology",
                "Channel: web",
                "Connections: 1",
            ]
        );
        assert!(tooltip(&store, "nobody").is_none());
    }
}
