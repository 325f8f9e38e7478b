//! Constellation session
//!
//! Wires the store, navigation controller, orbit camera and physics worker
//! together the way a render loop drives them: `pump()` drains worker
//! events, `frame()` advances the camera and keeps the zoom level in sync.

use tracing::{debug, info};

use crate::camera::OrbitCamera;
use crate::config::ConstellationConfig;
use crate::graph::{Edge, Node};
use crate::navigation::{Key, KeyOutcome, NavigationContext, NavigationController};
use crate::store::ConstellationStore;
use crate::worker::{PhysicsWorker, SettleReason, WorkerEvent, WorkerHandle};
use crate::zoom::ZoomLevel;

/// Alpha used to re-energise the layout after a zoom level change
pub const ZOOM_REHEAT_ALPHA: f32 = 0.3;

/// What a call to `pump` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    /// A positions buffer was written into the store
    pub applied: bool,
    /// Buffers dropped as stale, malformed or superseded
    pub discarded: usize,
    /// Settle signal for the current generation, if one arrived
    pub settled: Option<SettleReason>,
}

pub struct Constellation {
    store: ConstellationStore,
    navigation: NavigationController,
    camera: OrbitCamera,
    worker: WorkerHandle,
    reduced_motion: bool,
    /// Level the worker was last reheated for
    last_level: ZoomLevel,
    /// Level of a camera animation still in flight
    pending_level: Option<ZoomLevel>,
    /// Set by `stop` until the next init
    stopped: bool,
}

impl Constellation {
    /// Spawn the physics worker and set up an empty constellation
    pub fn new(config: &ConstellationConfig) -> std::io::Result<Self> {
        let worker = PhysicsWorker::spawn(config.worker_config())?;
        let store = ConstellationStore::new(config.zoom);
        let last_level = store.zoom_level();

        Ok(Self {
            store,
            navigation: NavigationController::new(),
            camera: OrbitCamera::default(),
            worker,
            reduced_motion: config.worker.reduced_motion,
            last_level,
            pending_level: None,
            stopped: false,
        })
    }

    pub fn store(&self) -> &ConstellationStore {
        &self.store
    }

    /// Direct store access for hover, selection and story beats
    pub fn store_mut(&mut self) -> &mut ConstellationStore {
        &mut self.store
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn navigation_mut(&mut self) -> &mut NavigationController {
        &mut self.navigation
    }

    /// Replace the graph and start a fresh layout for it
    pub fn load(&mut self, context: NavigationContext, nodes: Vec<Node>, edges: Vec<Edge>) {
        info!(context = %context, nodes = nodes.len(), "loading constellation");
        let init = self.store.replace_graph(context.clone(), nodes, edges);
        self.worker.send(init);
        self.stopped = false;
        self.navigation.enter_context(&mut self.store, &context);
        // A fresh init already starts hot
        self.last_level = self.store.zoom_level();
    }

    pub fn drill_into_channel(
        &mut self,
        channel_id: &str,
        channel_label: &str,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) {
        let context = self
            .store
            .navigation_context()
            .drill_into_channel(channel_id, channel_label);
        self.load(context, nodes, edges);
    }

    /// Drill into a campaign; `false` (and nothing loaded) at L1
    pub fn drill_into_campaign(
        &mut self,
        campaign_id: &str,
        campaign_name: &str,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> bool {
        match self
            .store
            .navigation_context()
            .drill_into_campaign(campaign_id, campaign_name)
        {
            Some(context) => {
                self.load(context, nodes, edges);
                true
            }
            None => false,
        }
    }

    /// Go one level up; `false` (and nothing loaded) at L1
    pub fn drill_up(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> bool {
        match self.store.navigation_context().up() {
            Some(context) => {
                self.load(context, nodes, edges);
                true
            }
            None => false,
        }
    }

    /// Pin a node where it is and restart the layout around it
    pub fn pin_node(&mut self, id: &str) -> bool {
        if !self.store.pin_node(id) {
            return false;
        }
        let init = self.store.reseed();
        self.worker.send(init);
        self.stopped = false;
        true
    }

    pub fn unpin_node(&mut self, id: &str) -> bool {
        if !self.store.unpin_node(id) {
            return false;
        }
        let init = self.store.reseed();
        self.worker.send(init);
        self.stopped = false;
        true
    }

    /// Drain pending worker events without blocking
    ///
    /// Only the newest accepted buffer is written into the store.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        let mut latest: Option<(u64, Vec<f32>)> = None;

        while let Some(event) = self.worker.try_next_event() {
            match event {
                WorkerEvent::Positions {
                    generation,
                    positions,
                } => {
                    if generation != self.store.generation() {
                        report.discarded += 1;
                    } else if latest.replace((generation, positions)).is_some() {
                        report.discarded += 1;
                    }
                }
                WorkerEvent::Settled { generation, reason } => {
                    if self.store.mark_settled(generation, reason.clone()) {
                        report.settled = Some(reason);
                    }
                }
            }
        }

        if let Some((generation, positions)) = latest {
            if self.store.apply_positions(generation, &positions) {
                report.applied = true;
            } else {
                report.discarded += 1;
            }
        }
        report
    }

    /// Advance the camera one frame; returns `true` while it is moving
    pub fn frame(&mut self) -> bool {
        if let Some(request) = self.store.take_camera_request() {
            self.camera.apply_request(&request);
            if self.reduced_motion {
                self.camera.snap();
            }
            self.pending_level = Some(request.level);
        }

        let moving = self.camera.update_animation();

        // While a requested transition is in flight the store already holds
        // its target level; syncing mid-flight would bounce through others.
        if !(moving && self.pending_level.is_some()) {
            self.pending_level = None;
            self.store.sync_zoom_from_distance(self.camera.distance());
        }

        let level = self.store.zoom_level();
        if level != self.last_level {
            debug!(from = %self.last_level, to = %level, "zoom level changed");
            self.last_level = level;
            if !self.stopped && self.store.mark_reheated() {
                self.worker.reheat(Some(ZOOM_REHEAT_ALPHA));
            }
        }
        moving
    }

    /// Continuous zoom, e.g. from a scroll wheel
    pub fn scroll_zoom(&mut self, factor: f32) {
        self.pending_level = None;
        self.camera.zoom(factor);
    }

    pub fn orbit(&mut self, horizontal: f32, vertical: f32) {
        self.camera.orbit_horizontal(horizontal);
        self.camera.orbit_vertical(vertical);
    }

    pub fn zoom_in(&mut self) -> bool {
        self.navigation.zoom_in(&mut self.store)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.navigation.zoom_out(&mut self.store)
    }

    pub fn reorient(&mut self) {
        self.navigation.reorient(&mut self.store);
        if self.store.camera_request().is_some() {
            self.camera.reset_view();
        }
    }

    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        let outcome = self.navigation.handle_key(&mut self.store, key);
        if outcome == KeyOutcome::Reoriented && self.store.camera_request().is_some() {
            self.camera.reset_view();
        }
        outcome
    }

    /// Stop the current layout; idempotent
    pub fn stop(&mut self) {
        self.stopped = true;
        self.worker.stop();
    }

    /// Wait until the current layout settles, applying every buffer on the way
    ///
    /// Gives up after `max_events` events or when the worker exits.
    pub async fn wait_until_settled(&mut self, max_events: usize) -> Option<SettleReason> {
        for _ in 0..max_events {
            let event = self.worker.next_event().await?;
            if let Some(reason) = self.accept(event) {
                return Some(reason);
            }
        }
        None
    }

    /// Blocking variant of `wait_until_settled`; must not be called from
    /// inside an async runtime
    pub fn blocking_wait_until_settled(&mut self, max_events: usize) -> Option<SettleReason> {
        for _ in 0..max_events {
            let event = self.worker.blocking_next_event()?;
            if let Some(reason) = self.accept(event) {
                return Some(reason);
            }
        }
        None
    }

    fn accept(&mut self, event: WorkerEvent) -> Option<SettleReason> {
        match event {
            WorkerEvent::Positions {
                generation,
                positions,
            } => {
                self.store.apply_positions(generation, &positions);
                None
            }
            WorkerEvent::Settled { generation, reason } => self
                .store
                .mark_settled(generation, reason.clone())
                .then_some(reason),
        }
    }

    /// Stop the worker thread and wait for it
    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use crate::simulation::InitialLayout;

    fn config() -> ConstellationConfig {
        let mut config = ConstellationConfig::default();
        config.worker.manual_stepping = true;
        config.worker.layout = InitialLayout::Random { seed: Some(5) };
        config
    }

    fn graph() -> (Vec<Node>, Vec<Edge>) {
        (
            vec![
                Node::new("email", "Email", NodeType::Channel),
                Node::new("web", "Web", NodeType::Channel),
                Node::new("dr-a", "Dr. A", NodeType::Hcp).with_channel("email"),
            ],
            vec![
                Edge::new("e1", "email", "dr-a", 1.0),
                Edge::new("e2", "web", "dr-a", 1.0),
                Edge::new("e3", "web", "missing", 1.0),
            ],
        )
    }

    #[test]
    fn reduced_motion_settles_in_one_shot() {
        let mut config = config();
        config.worker.reduced_motion = true;
        let mut session = Constellation::new(&config).unwrap();
        let (nodes, edges) = graph();

        session.load(NavigationContext::L1, nodes, edges);
        let reason = session.blocking_wait_until_settled(10);

        assert_eq!(reason, Some(SettleReason::ReducedMotion));
        assert!(session.store().is_settled());
        assert_eq!(session.store().edges().len(), 2);
        assert!(
            session
                .store()
                .nodes()
                .iter()
                .any(|n| n.position.x != 0.0 || n.position.y != 0.0)
        );
        session.shutdown();
    }

    #[test]
    fn frame_consumes_camera_requests() {
        let mut session = Constellation::new(&config()).unwrap();
        let (nodes, edges) = graph();
        session.load(NavigationContext::L1, nodes, edges);

        assert!(session.zoom_in());
        assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);

        let mut frames = 0;
        while session.frame() {
            frames += 1;
            assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);
            assert!(frames < 1000);
        }

        assert!(session.store().camera_request().is_none());
        assert_eq!(session.camera().distance(), ZoomLevel::Campaign.canonical_distance());
        assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);
        session.shutdown();
    }

    #[test]
    fn scrolling_updates_zoom_level() {
        let mut session = Constellation::new(&config()).unwrap();
        session.scroll_zoom(0.1);
        while session.frame() {}

        assert_eq!(session.store().zoom_level(), ZoomLevel::Hcp);
        session.shutdown();
    }

    #[test]
    fn drill_down_and_back_up() {
        let mut session = Constellation::new(&config()).unwrap();
        let (nodes, edges) = graph();
        session.load(NavigationContext::L1, nodes.clone(), edges.clone());

        assert!(!session.drill_into_campaign("spring", "Spring", vec![], vec![]));

        session.drill_into_channel("email", "Email", nodes.clone(), edges.clone());
        assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);
        assert!(session.drill_into_campaign("spring", "Spring", nodes.clone(), edges.clone()));
        assert_eq!(
            session.store().navigation_context().breadcrumbs(),
            vec!["Ecosystem", "Email", "Spring"]
        );
        assert_eq!(session.store().zoom_level(), ZoomLevel::Hcp);

        assert!(session.drill_up(nodes, edges));
        assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);
        session.shutdown();
    }

    #[test]
    fn pump_discards_superseded_generations() {
        let mut config = config();
        config.worker.reduced_motion = true;
        let mut session = Constellation::new(&config).unwrap();
        let (nodes, edges) = graph();

        session.load(NavigationContext::L1, nodes.clone(), edges.clone());
        session.load(NavigationContext::L1, nodes, edges);
        assert_eq!(session.blocking_wait_until_settled(10), Some(SettleReason::ReducedMotion));
        assert_eq!(session.store().generation(), 2);

        let report = session.pump();
        assert!(!report.applied);
        assert!(report.settled.is_none());
        session.shutdown();
    }

    fn settled_session() -> Constellation {
        let mut config = config();
        config.worker.reduced_motion = true;
        let mut session = Constellation::new(&config).unwrap();
        let (nodes, edges) = graph();
        session.load(NavigationContext::L1, nodes, edges);
        assert_eq!(session.blocking_wait_until_settled(10), Some(SettleReason::ReducedMotion));
        while session.frame() {}
        session
    }

    #[test]
    fn drill_down_lays_out_once() {
        let mut session = settled_session();
        let (nodes, edges) = graph();

        session.drill_into_channel("email", "Email", nodes, edges);
        session.frame();
        assert_eq!(session.store().zoom_level(), ZoomLevel::Campaign);

        assert_eq!(session.blocking_wait_until_settled(10), Some(SettleReason::ReducedMotion));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(session.pump(), PumpReport::default());
        session.shutdown();
    }

    #[test]
    fn zoom_level_change_reheats_and_clears_settle() {
        let mut session = settled_session();
        assert!(session.store().is_settled());

        assert!(session.zoom_in());
        session.frame();
        assert!(!session.store().is_settled());

        assert_eq!(session.blocking_wait_until_settled(10), Some(SettleReason::ReducedMotion));
        assert!(session.store().is_settled());
        session.shutdown();
    }

    #[test]
    fn scroll_across_a_threshold_reheats() {
        let mut session = settled_session();

        session.scroll_zoom(0.1);
        while session.frame() {}
        assert_eq!(session.store().zoom_level(), ZoomLevel::Hcp);
        assert!(!session.store().is_settled());

        assert_eq!(session.blocking_wait_until_settled(10), Some(SettleReason::ReducedMotion));
        assert!(session.store().is_settled());
        session.shutdown();
    }

    #[test]
    fn stopped_session_is_not_reheated() {
        let mut session = settled_session();
        session.stop();

        assert!(session.zoom_in());
        session.frame();

        assert!(session.store().is_settled());
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(session.pump(), PumpReport::default());
        session.shutdown();
    }

    #[test]
    fn escape_key_clears_selection() {
        let mut session = Constellation::new(&config()).unwrap();
        let (nodes, edges) = graph();
        session.load(NavigationContext::L1, nodes, edges);
        session.store_mut().select("web");

        assert_eq!(session.handle_key(Key::Escape), KeyOutcome::SelectionCleared);
        assert!(session.store().selected_node_id().is_none());
        session.shutdown();
    }
}
