//! Constellation store
//!
//! The single state container shared by the navigation controller, the
//! render adapters and the worker bridge. It is an ordinary value passed by
//! reference, not a global.
//!
//! Invariant: `hovered` and `selected` only ever hold ids present in
//! `nodes`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::graph::{self, Edge, Node, NodeId, Position, ProjectOptions, Projection};
use crate::navigation::NavigationContext;
use crate::worker::{SettleReason, WorkerCommand};
use crate::zoom::{ZoomLevel, ZoomThresholds};

/// A pending request for the renderer to move the camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraAnimationRequest {
    pub level: ZoomLevel,
    /// Camera distance to animate to
    pub distance: f32,
    /// Point to look at; `None` keeps the current target
    pub target: Option<Position>,
}

/// One step of a guided story
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryBeat {
    pub title: String,
    /// Channels in focus; everything else is dimmed
    pub channel_focus: Vec<String>,
}

pub struct ConstellationStore {
    thresholds: ZoomThresholds,
    context: NavigationContext,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_index: HashMap<NodeId, usize>,
    pins: HashMap<NodeId, Position>,
    zoom_level: ZoomLevel,
    hovered: Option<NodeId>,
    selected: Vec<NodeId>,
    story_mode_active: bool,
    story_beat: Option<StoryBeat>,
    camera_request: Option<CameraAnimationRequest>,
    generation: u64,
    settled: Option<SettleReason>,
}

impl ConstellationStore {
    pub fn new(thresholds: ZoomThresholds) -> Self {
        Self {
            thresholds,
            context: NavigationContext::L1,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_index: HashMap::new(),
            pins: HashMap::new(),
            zoom_level: ZoomLevel::Ecosystem,
            hovered: None,
            selected: Vec::new(),
            story_mode_active: false,
            story_beat: None,
            camera_request: None,
            generation: 0,
            settled: None,
        }
    }

    // -------------------------------------------------------------------------
    // Graph
    // -------------------------------------------------------------------------

    /// Swap in a new node/edge set and build the worker `Init` for it
    ///
    /// Dangling edges are dropped, stale hover/selection/pins are cleared and
    /// the generation is bumped so buffers from the previous layout are
    /// rejected.
    pub fn replace_graph(
        &mut self,
        context: NavigationContext,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> WorkerCommand {
        let edges: Vec<Edge> = graph::retain_connected(&nodes, &edges)
            .into_iter()
            .cloned()
            .collect();

        self.node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        self.nodes = nodes;
        self.edges = edges;
        self.context = context;

        let index = &self.node_index;
        if self.hovered.as_ref().is_some_and(|id| !index.contains_key(id)) {
            self.hovered = None;
        }
        self.selected.retain(|id| index.contains_key(id));
        self.pins.retain(|id, _| index.contains_key(id));

        self.init_command(ProjectOptions::default())
    }

    /// Re-initialise the worker from the current positions, honouring pins
    pub fn reseed(&mut self) -> WorkerCommand {
        self.init_command(ProjectOptions {
            keep_positions: true,
        })
    }

    fn init_command(&mut self, options: ProjectOptions) -> WorkerCommand {
        self.generation += 1;
        self.settled = None;

        let Projection { mut nodes, edges } = graph::project(&self.nodes, &self.edges, options);
        for node in &mut nodes {
            if let Some(pin) = self.pins.get(&node.id) {
                *node = node.clone().pin(*pin);
            }
        }

        debug!(
            generation = self.generation,
            context = %self.context,
            nodes = nodes.len(),
            edges = edges.len(),
            "graph seeded"
        );
        WorkerCommand::Init {
            generation: self.generation,
            nodes,
            edges,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn navigation_context(&self) -> &NavigationContext {
        &self.context
    }

    /// Generation of the layout the store currently expects
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pin a node at its current position for the next seeding
    pub fn pin_node(&mut self, id: &str) -> bool {
        match self.node(id).map(|n| n.position) {
            Some(position) => {
                self.pins.insert(id.to_string(), position);
                true
            }
            None => false,
        }
    }

    pub fn unpin_node(&mut self, id: &str) -> bool {
        self.pins.remove(id).is_some()
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.pins.contains_key(id)
    }

    // -------------------------------------------------------------------------
    // Worker output
    // -------------------------------------------------------------------------

    /// Copy a worker buffer into the node records
    ///
    /// Buffers from another generation or with the wrong length are
    /// discarded and `false` is returned.
    pub fn apply_positions(&mut self, generation: u64, positions: &[f32]) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                expected = self.generation,
                "discarding stale positions"
            );
            return false;
        }
        if positions.len() != self.nodes.len() * 3 {
            debug!(
                len = positions.len(),
                nodes = self.nodes.len(),
                "discarding mismatched positions"
            );
            return false;
        }

        for (node, xyz) in self.nodes.iter_mut().zip(positions.chunks_exact(3)) {
            node.position = Position::new(xyz[0], xyz[1], xyz[2]);
        }
        true
    }

    /// Record a settle signal for the current generation
    pub fn mark_settled(&mut self, generation: u64, reason: SettleReason) -> bool {
        if generation != self.generation {
            return false;
        }
        self.settled = Some(reason);
        true
    }

    /// Clear a settle that a reheat will undo
    ///
    /// Returns `false` when the layout cannot be reheated (empty or
    /// faulted); the settle flag is kept in that case.
    pub fn mark_reheated(&mut self) -> bool {
        match self.settled {
            Some(SettleReason::Empty | SettleReason::Fault(_)) => false,
            Some(_) => {
                self.settled = None;
                true
            }
            None => true,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.is_some()
    }

    pub fn settle_reason(&self) -> Option<&SettleReason> {
        self.settled.as_ref()
    }

    // -------------------------------------------------------------------------
    // Zoom and camera
    // -------------------------------------------------------------------------

    pub fn zoom_level(&self) -> ZoomLevel {
        self.zoom_level
    }

    pub fn thresholds(&self) -> &ZoomThresholds {
        &self.thresholds
    }

    /// Pure state update; the camera does not move
    pub fn set_zoom_level(&mut self, level: ZoomLevel) {
        self.zoom_level = level;
    }

    /// Derive the zoom level from camera distance; returns it if it changed
    pub fn sync_zoom_from_distance(&mut self, distance: f32) -> Option<ZoomLevel> {
        let level = self.thresholds.level_for_distance(distance);
        if level == self.zoom_level {
            return None;
        }
        self.zoom_level = level;
        Some(level)
    }

    /// Record a camera animation intent; replaces any pending one
    pub fn request_camera_animation(&mut self, level: ZoomLevel, target: Option<Position>) {
        self.camera_request = Some(CameraAnimationRequest {
            level,
            distance: level.canonical_distance(),
            target,
        });
    }

    pub fn camera_request(&self) -> Option<&CameraAnimationRequest> {
        self.camera_request.as_ref()
    }

    /// Consume the pending camera request
    pub fn take_camera_request(&mut self) -> Option<CameraAnimationRequest> {
        self.camera_request.take()
    }

    // -------------------------------------------------------------------------
    // Hover and selection
    // -------------------------------------------------------------------------

    pub fn hovered_node_id(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    /// Set or clear hover; unknown ids are ignored
    pub fn set_hovered(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if !self.contains(id) => false,
            Some(id) => {
                self.hovered = Some(id.to_string());
                true
            }
            None => {
                self.hovered = None;
                true
            }
        }
    }

    /// Select a single node; unknown ids are ignored
    pub fn select(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.selected = vec![id.to_string()];
        true
    }

    /// Add or remove a node from a multi-selection
    pub fn toggle_selection(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        match self.selected.iter().position(|s| s == id) {
            Some(i) => {
                self.selected.remove(i);
            }
            None => self.selected.push(id.to_string()),
        }
        true
    }

    /// First selected node
    pub fn selected_node_id(&self) -> Option<&str> {
        self.selected.first().map(String::as_str)
    }

    pub fn selected_node_ids(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    /// Clear hover and selection; zoom and story mode are untouched
    pub fn clear_selection(&mut self) {
        self.hovered = None;
        self.selected.clear();
    }

    // -------------------------------------------------------------------------
    // Story mode
    // -------------------------------------------------------------------------

    pub fn story_mode_active(&self) -> bool {
        self.story_mode_active
    }

    /// Flip story mode; returns the new state
    pub fn toggle_story_mode(&mut self) -> bool {
        self.story_mode_active = !self.story_mode_active;
        self.story_mode_active
    }

    pub fn set_story_beat(&mut self, beat: Option<StoryBeat>) {
        self.story_beat = beat;
    }

    pub fn story_beat(&self) -> Option<&StoryBeat> {
        self.story_beat.as_ref()
    }

    /// Channels in focus, only while story mode is active
    pub fn channel_focus(&self) -> Option<&[String]> {
        if !self.story_mode_active {
            return None;
        }
        self.story_beat
            .as_ref()
            .map(|beat| beat.channel_focus.as_slice())
    }

    /// Whether a node falls outside the active story focus
    pub fn is_node_dimmed(&self, node: &Node) -> bool {
        match self.channel_focus() {
            Some(focus) => !in_focus(focus, node),
            None => false,
        }
    }

    /// An edge is dimmed unless one of its endpoints is in focus
    pub fn is_edge_dimmed(&self, edge: &Edge) -> bool {
        let Some(focus) = self.channel_focus() else {
            return false;
        };
        let focused = |id: &str| self.node(id).is_some_and(|n| in_focus(focus, n));
        !(focused(&edge.source) || focused(&edge.target))
    }
}

fn in_focus(focus: &[String], node: &Node) -> bool {
    focus
        .iter()
        .any(|channel| *channel == node.id || node.channel.as_deref() == Some(channel.as_str()))
}
