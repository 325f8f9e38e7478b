//! constellation - A force-directed 3D layout engine for engagement networks.
//!
//! The physics runs on its own thread behind a message protocol, a single
//! store holds the graph and view state, and a semantic zoom state machine
//! derives render parameters from camera distance.

pub mod camera;
pub mod config;
pub mod graph;
pub mod navigation;
pub mod render;
pub mod session;
pub mod simulation;
pub mod store;
pub mod worker;
pub mod zoom;

pub use config::{ConfigError, ConstellationConfig};
pub use graph::{Edge, GraphDocument, GraphError, Node, NodeStatus, NodeType, Position};
pub use navigation::{Key, KeyOutcome, NavigationContext, NavigationController};
pub use session::{Constellation, PumpReport};
pub use store::ConstellationStore;
pub use worker::{PhysicsWorker, SettleReason, WorkerCommand, WorkerEvent, WorkerHandle};
pub use zoom::{ZoomLevel, ZoomThresholds, zoom_level_from_distance};
