//! 3D force simulation for constellation layout
//!
//! A d3-force style velocity Verlet integrator with four forces: link
//! springs, many-body repulsion, a centering pull and collision
//! separation. All forces are scaled by `alpha`, which decays geometrically
//! each tick; the simulation is settled once alpha drops below `alpha_min`.
//!
//! Note: many-body is O(n²) brute force. That is fine for the few hundred
//! nodes a constellation level holds.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{WorkerEdge, WorkerNode};

// =============================================================================
// Default Constants
// =============================================================================

/// Default charge for many-body repulsion (negative = repulsion, matches d3)
pub const DEFAULT_CHARGE: f32 = -30.0;

/// Default link rest length for an edge of weight 1
pub const DEFAULT_LINK_DISTANCE: f32 = 30.0;

/// Default link strength (scaled down by endpoint degree)
pub const DEFAULT_LINK_STRENGTH: f32 = 1.0;

/// Shortest rest length a heavy edge may pull to
pub const DEFAULT_MIN_LINK_DISTANCE: f32 = 10.0;

/// Longest rest length a light edge may relax to
pub const DEFAULT_MAX_LINK_DISTANCE: f32 = 300.0;

/// Default centering strength
pub const DEFAULT_CENTER_STRENGTH: f32 = 0.02;

/// Default node radius for collision
pub const DEFAULT_NODE_RADIUS: f32 = 4.0;

/// Default collision strength (0-1)
pub const DEFAULT_COLLISION_STRENGTH: f32 = 0.7;

/// Default collision relaxation passes per tick
pub const DEFAULT_COLLISION_ITERATIONS: u32 = 2;

/// Default velocity retention factor (applied each tick)
pub const DEFAULT_VELOCITY_DECAY: f32 = 0.6;

/// Default minimum distance for many-body (avoids singularity)
pub const DEFAULT_DISTANCE_MIN: f32 = 1.0;

/// Default many-body cutoff distance
pub const DEFAULT_DISTANCE_MAX: f32 = 1000.0;

/// Default maximum velocity (prevents numerical explosion)
pub const DEFAULT_MAX_VELOCITY: f32 = 100.0;

/// Default minimum alpha before the simulation settles
pub const DEFAULT_ALPHA_MIN: f32 = 0.001;

/// Default number of ticks for alpha to decay from 1 to `alpha_min` (d3 uses 300)
pub const DEFAULT_ALPHA_DECAY_TICKS: f32 = 300.0;

/// Default radius of the volume unpositioned nodes start in
pub const DEFAULT_INITIAL_RADIUS: f32 = 100.0;

/// Alpha used by `reheat` when the caller does not give one
pub const DEFAULT_REHEAT_ALPHA: f32 = 1.0;

/// Errors raised while stepping the simulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A node position became NaN or infinite
    #[error("non-finite position for node '{node}' at tick {tick}")]
    NonFinite { node: String, tick: u64 },
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Settled,
}

/// Tuning parameters for the forces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Repulsion strength (negative = repulsion)
    pub charge: f32,
    /// Rest length for an edge of weight 1; heavier edges pull closer
    pub link_distance: f32,
    pub min_link_distance: f32,
    pub max_link_distance: f32,
    /// Link strength
    pub link_strength: f32,
    /// Center force strength
    pub center_strength: f32,
    /// Node radius used by the collision force
    pub node_radius: f32,
    pub collision_strength: f32,
    pub collision_iterations: u32,
    /// Velocity retention per tick (friction)
    pub velocity_decay: f32,
    pub distance_min: f32,
    pub distance_max: f32,
    pub max_velocity: f32,
    /// Alpha below which the simulation is settled
    pub alpha_min: f32,
    /// Ticks for alpha to decay from 1 to `alpha_min`
    pub alpha_decay_ticks: f32,
    /// Radius of the volume unpositioned nodes start in
    pub initial_radius: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            charge: DEFAULT_CHARGE,
            link_distance: DEFAULT_LINK_DISTANCE,
            min_link_distance: DEFAULT_MIN_LINK_DISTANCE,
            max_link_distance: DEFAULT_MAX_LINK_DISTANCE,
            link_strength: DEFAULT_LINK_STRENGTH,
            center_strength: DEFAULT_CENTER_STRENGTH,
            node_radius: DEFAULT_NODE_RADIUS,
            collision_strength: DEFAULT_COLLISION_STRENGTH,
            collision_iterations: DEFAULT_COLLISION_ITERATIONS,
            velocity_decay: DEFAULT_VELOCITY_DECAY,
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: DEFAULT_DISTANCE_MAX,
            max_velocity: DEFAULT_MAX_VELOCITY,
            alpha_min: DEFAULT_ALPHA_MIN,
            alpha_decay_ticks: DEFAULT_ALPHA_DECAY_TICKS,
            initial_radius: DEFAULT_INITIAL_RADIUS,
        }
    }
}

impl ForceConfig {
    /// Per-tick alpha decay derived from `alpha_min` and `alpha_decay_ticks`
    pub fn alpha_decay(&self) -> f32 {
        1.0 - self.alpha_min.powf(1.0 / self.alpha_decay_ticks.max(1.0))
    }

    /// Rest length for an edge of the given weight
    pub fn target_distance(&self, weight: f32) -> f32 {
        let weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            1.0
        };
        (self.link_distance / weight).clamp(self.min_link_distance, self.max_link_distance)
    }
}

/// How nodes without a supplied position are placed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialLayout {
    /// Uniformly inside a ball of `initial_radius`
    Random { seed: Option<u64> },
    /// Evenly spread on a sphere of `initial_radius` (deterministic)
    FibonacciSphere,
}

impl Default for InitialLayout {
    fn default() -> Self {
        InitialLayout::Random { seed: None }
    }
}

/// A node with 3D position and velocity for simulation
#[derive(Debug, Clone)]
pub struct SimNode {
    pub id: String,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Pinned coordinate per axis
    pub fixed: [Option<f32>; 3],
}

impl SimNode {
    pub fn is_pinned(&self) -> bool {
        self.fixed.iter().any(Option::is_some)
    }
}

/// A link between two nodes (indices into the node array)
#[derive(Debug, Clone)]
pub struct SimLink {
    pub source: usize,
    pub target: usize,
    /// Rest length
    pub distance: f32,
    pub strength: f32,
    /// Share of the correction applied to the target
    pub bias: f32,
}

/// 3D CPU force simulation
pub struct Simulation {
    nodes: Vec<SimNode>,
    links: Vec<SimLink>,
    config: ForceConfig,
    alpha: f32,
    alpha_target: f32,
    alpha_decay: f32,
    ticks: u64,
    rng: StdRng,
    node_id_to_index: HashMap<String, usize>,
}

impl Simulation {
    /// Create a simulation from the worker projection
    ///
    /// Edges referencing unknown ids are skipped.
    pub fn new(
        nodes: &[WorkerNode],
        edges: &[WorkerEdge],
        config: ForceConfig,
        layout: InitialLayout,
    ) -> Self {
        let mut rng = match layout {
            InitialLayout::Random { seed: Some(seed) } => StdRng::seed_from_u64(seed),
            InitialLayout::Random { seed: None } => StdRng::from_entropy(),
            InitialLayout::FibonacciSphere => StdRng::seed_from_u64(0),
        };

        let total = nodes.len();
        let sim_nodes: Vec<SimNode> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let fallback = match layout {
                    InitialLayout::FibonacciSphere => {
                        fibonacci_point(i, total, config.initial_radius)
                    }
                    InitialLayout::Random { .. } => random_point(&mut rng, config.initial_radius),
                };
                let supplied = [node.x, node.y, node.z];
                let fixed = [
                    node.fx.filter(|v| v.is_finite()),
                    node.fy.filter(|v| v.is_finite()),
                    node.fz.filter(|v| v.is_finite()),
                ];
                let mut position = [0.0; 3];
                for axis in 0..3 {
                    position[axis] = fixed[axis]
                        .or(supplied[axis].filter(|v| v.is_finite()))
                        .unwrap_or(fallback[axis]);
                }
                SimNode {
                    id: node.id.clone(),
                    position,
                    velocity: [0.0; 3],
                    fixed,
                }
            })
            .collect();

        let node_id_to_index: HashMap<String, usize> = sim_nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let resolved: Vec<(usize, usize, f32)> = edges
            .iter()
            .filter_map(|e| {
                let source = *node_id_to_index.get(&e.source)?;
                let target = *node_id_to_index.get(&e.target)?;
                Some((source, target, e.weight))
            })
            .collect();

        let mut degree = vec![0u32; total];
        for &(source, target, _) in &resolved {
            degree[source] += 1;
            degree[target] += 1;
        }

        let links = resolved
            .into_iter()
            .map(|(source, target, weight)| {
                let (ds, dt) = (degree[source] as f32, degree[target] as f32);
                SimLink {
                    source,
                    target,
                    distance: config.target_distance(weight),
                    strength: config.link_strength / ds.min(dt).max(1.0),
                    bias: ds / (ds + dt),
                }
            })
            .collect();

        let alpha = if total == 0 { 0.0 } else { 1.0 };
        let alpha_decay = config.alpha_decay();

        Self {
            nodes: sim_nodes,
            links,
            config,
            alpha,
            alpha_target: 0.0,
            alpha_decay,
            ticks: 0,
            rng,
            node_id_to_index,
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[SimLink] {
        &self.links
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Ticks run since creation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the simulation has cooled below `alpha_min`
    pub fn is_settled(&self) -> bool {
        self.nodes.is_empty() || self.alpha < self.config.alpha_min
    }

    /// Position of a node by id
    pub fn position_of(&self, id: &str) -> Option<[f32; 3]> {
        self.node_id_to_index
            .get(id)
            .map(|&i| self.nodes[i].position)
    }

    /// Raise the temperature without touching positions
    ///
    /// Never lowers alpha: reheating a hotter simulation is a no-op.
    pub fn reheat(&mut self, alpha: f32) {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            DEFAULT_REHEAT_ALPHA
        };
        if !self.nodes.is_empty() {
            self.alpha = self.alpha.max(alpha);
        }
    }

    /// Flat `(x, y, z)` buffer in node order
    pub fn positions(&self) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(self.nodes.len() * 3);
        for node in &self.nodes {
            buffer.extend_from_slice(&node.position);
        }
        buffer
    }

    /// Run one simulation tick
    pub fn tick(&mut self) -> Result<TickOutcome, SimulationError> {
        if self.is_settled() {
            return Ok(TickOutcome::Settled);
        }

        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;
        self.ticks += 1;

        self.apply_link_force();
        self.apply_many_body_force();
        self.apply_center_force();
        self.apply_collision_force();
        self.integrate();

        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| n.position.iter().any(|v| !v.is_finite()))
        {
            return Err(SimulationError::NonFinite {
                node: node.id.clone(),
                tick: self.ticks,
            });
        }

        Ok(if self.is_settled() {
            TickOutcome::Settled
        } else {
            TickOutcome::Running
        })
    }

    /// Run to convergence (or `max_ticks`), returning the ticks taken
    pub fn run_to_convergence(&mut self, max_ticks: usize) -> Result<usize, SimulationError> {
        let mut taken = 0;
        while taken < max_ticks && !self.is_settled() {
            self.tick()?;
            taken += 1;
        }
        Ok(taken)
    }

    /// Small random offset used to separate coincident nodes
    fn jiggle(&mut self) -> f32 {
        (self.rng.r#gen::<f32>() - 0.5) * 1e-6
    }

    /// Springs between connected nodes, toward each link's rest length
    fn apply_link_force(&mut self) {
        for i in 0..self.links.len() {
            let SimLink {
                source,
                target,
                distance,
                strength,
                bias,
            } = self.links[i];
            if source == target {
                continue;
            }

            let mut delta = [0.0f32; 3];
            for (axis, d) in delta.iter_mut().enumerate() {
                let t = &self.nodes[target];
                let s = &self.nodes[source];
                *d = t.position[axis] + t.velocity[axis] - s.position[axis] - s.velocity[axis];
            }
            if delta == [0.0; 3] {
                delta[0] = self.jiggle();
                delta[1] = self.jiggle();
            }

            let len = length(delta);
            let scale = (len - distance) / len * self.alpha * strength;

            for axis in 0..3 {
                let d = delta[axis] * scale;
                self.nodes[target].velocity[axis] -= d * bias;
                self.nodes[source].velocity[axis] += d * (1.0 - bias);
            }
        }
    }

    /// Repulsion between all node pairs
    fn apply_many_body_force(&mut self) {
        let n = self.nodes.len();
        let min2 = self.config.distance_min * self.config.distance_min;
        let max2 = self.config.distance_max * self.config.distance_max;
        let strength = self.config.charge * self.alpha;

        for i in 0..n {
            for j in (i + 1)..n {
                let mut delta = sub(self.nodes[j].position, self.nodes[i].position);
                let mut dist2 = dot(delta, delta);
                if dist2 >= max2 {
                    continue;
                }
                if dist2 == 0.0 {
                    delta = [self.jiggle(), self.jiggle(), self.jiggle()];
                    dist2 = dot(delta, delta);
                }
                if dist2 < min2 {
                    dist2 = (min2 * dist2).sqrt();
                }

                let w = strength / dist2;
                for axis in 0..3 {
                    self.nodes[i].velocity[axis] += delta[axis] * w;
                    self.nodes[j].velocity[axis] -= delta[axis] * w;
                }
            }
        }
    }

    /// Weak pull toward the origin
    fn apply_center_force(&mut self) {
        let k = self.config.center_strength * self.alpha;
        for node in &mut self.nodes {
            for axis in 0..3 {
                node.velocity[axis] -= node.position[axis] * k;
            }
        }
    }

    /// Minimum separation between node radii, relaxed iteratively
    fn apply_collision_force(&mut self) {
        let n = self.nodes.len();
        let radius = self.config.node_radius;
        let min_sep = radius * 2.0;
        if min_sep <= 0.0 {
            return;
        }

        for _ in 0..self.config.collision_iterations {
            for i in 0..n {
                for j in (i + 1)..n {
                    let predicted_i = add(self.nodes[i].position, self.nodes[i].velocity);
                    let predicted_j = add(self.nodes[j].position, self.nodes[j].velocity);
                    let mut delta = sub(predicted_i, predicted_j);
                    let mut dist2 = dot(delta, delta);
                    if dist2 >= min_sep * min_sep {
                        continue;
                    }
                    if dist2 == 0.0 {
                        delta = [self.jiggle(), self.jiggle(), self.jiggle()];
                        dist2 = dot(delta, delta);
                    }

                    let dist = dist2.sqrt();
                    let push = (min_sep - dist) / dist * self.config.collision_strength;
                    // Equal radii: the correction is shared evenly
                    for axis in 0..3 {
                        let d = delta[axis] * push * 0.5;
                        self.nodes[i].velocity[axis] += d;
                        self.nodes[j].velocity[axis] -= d;
                    }
                }
            }
        }
    }

    /// Apply friction, clamp velocity, move free axes and snap pinned ones
    fn integrate(&mut self) {
        let decay = self.config.velocity_decay;
        let max_velocity = self.config.max_velocity;

        for node in &mut self.nodes {
            for axis in 0..3 {
                node.velocity[axis] *= decay;
            }

            let speed = length(node.velocity);
            if speed > max_velocity {
                let scale = max_velocity / speed;
                for v in &mut node.velocity {
                    *v *= scale;
                }
            }

            for axis in 0..3 {
                match node.fixed[axis] {
                    Some(pin) => {
                        node.position[axis] = pin;
                        node.velocity[axis] = 0.0;
                    }
                    None => node.position[axis] += node.velocity[axis],
                }
            }
        }
    }
}

/// Point on a Fibonacci sphere
fn fibonacci_point(index: usize, total: usize, radius: f32) -> [f32; 3] {
    let golden_ratio = (1.0 + 5.0_f32.sqrt()) / 2.0;
    let i = index as f32;
    let n = total.max(1) as f32;

    let theta = 2.0 * std::f32::consts::PI * i / golden_ratio;
    let phi = (1.0 - 2.0 * (i + 0.5) / n).clamp(-1.0, 1.0).acos();

    [
        radius * phi.sin() * theta.cos(),
        radius * phi.sin() * theta.sin(),
        radius * phi.cos(),
    ]
}

/// Uniform point inside a ball (rejection sampling)
fn random_point(rng: &mut StdRng, radius: f32) -> [f32; 3] {
    loop {
        let p = [
            rng.gen_range(-1.0f32..1.0),
            rng.gen_range(-1.0f32..1.0),
            rng.gen_range(-1.0f32..1.0),
        ];
        if dot(p, p) <= 1.0 {
            return [p[0] * radius, p[1] * radius, p[2] * radius];
        }
    }
}

fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn length(v: [f32; 3]) -> f32 {
    dot(v, v).sqrt()
}
