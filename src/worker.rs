//! Physics worker
//!
//! Runs the force simulation on its own thread and talks to the host only
//! through message channels. Every outgoing event carries the generation of
//! the `Init` that started the session, so the host can drop buffers from a
//! superseded layout.
//!
//! Position buffers go through a single latest-wins slot: a host that falls
//! behind only ever sees the newest buffer, never a backlog.
//!
//! ```rust,ignore
//! let mut worker = PhysicsWorker::spawn(WorkerConfig::default())?;
//! worker.init(1, projection);
//! while let Some(event) = worker.blocking_next_event() {
//!     match event {
//!         WorkerEvent::Positions { positions, .. } => draw(&positions),
//!         WorkerEvent::Settled { .. } => break,
//!     }
//! }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::graph::{Projection, WorkerEdge, WorkerNode};
use crate::simulation::{
    DEFAULT_REHEAT_ALPHA, ForceConfig, InitialLayout, Simulation, SimulationError, TickOutcome,
};

/// Default autonomous tick interval (one frame at 60 Hz)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Upper bound on ticks when laying out without animation
pub const DEFAULT_REDUCED_MOTION_MAX_TICKS: usize = 1000;

/// Commands accepted by the worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Start a new session, cancelling the current one
    Init {
        generation: u64,
        nodes: Vec<WorkerNode>,
        edges: Vec<WorkerEdge>,
    },
    /// Advance exactly one step
    Tick,
    /// Raise alpha without resetting positions
    Reheat { alpha: Option<f32> },
    /// Halt the session; idempotent
    Stop,
    /// End the worker thread
    Shutdown,
}

/// Why a session stopped producing motion
#[derive(Debug, Clone, PartialEq)]
pub enum SettleReason {
    /// Alpha decayed below the threshold
    Converged,
    /// `Init` carried no nodes
    Empty,
    /// Laid out in one shot, without animation
    ReducedMotion,
    /// A tick failed; the session is dead until the next `Init`
    Fault(String),
}

impl SettleReason {
    pub fn is_fault(&self) -> bool {
        matches!(self, SettleReason::Fault(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SettleReason::Converged => "converged",
            SettleReason::Empty => "empty",
            SettleReason::ReducedMotion => "reduced_motion",
            SettleReason::Fault(_) => "fault",
        }
    }
}

/// Events emitted by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// One `(x, y, z)` triple per node, in `Init` order
    Positions { generation: u64, positions: Vec<f32> },
    /// Sent once per session when motion stops
    Settled { generation: u64, reason: SettleReason },
}

impl WorkerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            WorkerEvent::Positions { generation, .. } | WorkerEvent::Settled { generation, .. } => {
                *generation
            }
        }
    }
}

/// Newest positions buffer published by the worker
#[derive(Debug)]
struct Frame {
    seq: u64,
    generation: u64,
    positions: Vec<f32>,
}

/// Ordering signal; positions themselves travel through the frame slot
#[derive(Debug)]
enum Signal {
    Positions,
    Settled { generation: u64, reason: SettleReason },
}

/// Worker side of the event channel
pub struct EventSender {
    frames: watch::Sender<Option<Frame>>,
    signals: UnboundedSender<Signal>,
    seq: u64,
}

/// Host side of the event channel
///
/// Positions are coalesced: several buffers published between two reads
/// surface as a single `Positions` event holding the newest one.
pub struct EventReceiver {
    frames: watch::Receiver<Option<Frame>>,
    signals: UnboundedReceiver<Signal>,
    seen: u64,
}

/// Create a connected event sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (frames_tx, frames_rx) = watch::channel(None);
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    (
        EventSender {
            frames: frames_tx,
            signals: signals_tx,
            seq: 0,
        },
        EventReceiver {
            frames: frames_rx,
            signals: signals_rx,
            seen: 0,
        },
    )
}

impl EventSender {
    /// Publish an event; returns `false` once the receiver is gone
    pub fn send(&mut self, event: WorkerEvent) -> bool {
        let signal = match event {
            WorkerEvent::Positions {
                generation,
                positions,
            } => {
                self.seq += 1;
                self.frames.send_replace(Some(Frame {
                    seq: self.seq,
                    generation,
                    positions,
                }));
                Signal::Positions
            }
            WorkerEvent::Settled { generation, reason } => Signal::Settled { generation, reason },
        };
        self.signals.send(signal).is_ok()
    }
}

impl EventReceiver {
    /// Pop the next event without waiting
    pub fn try_recv(&mut self) -> Option<WorkerEvent> {
        while let Ok(signal) = self.signals.try_recv() {
            if let Some(event) = self.resolve(signal) {
                return Some(event);
            }
        }
        None
    }

    /// Wait for the next event; `None` once the worker has exited
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        loop {
            let signal = self.signals.recv().await?;
            if let Some(event) = self.resolve(signal) {
                return Some(event);
            }
        }
    }

    /// Blocking variant of `recv`, for use outside async code
    pub fn blocking_recv(&mut self) -> Option<WorkerEvent> {
        loop {
            let signal = self.signals.blocking_recv()?;
            if let Some(event) = self.resolve(signal) {
                return Some(event);
            }
        }
    }

    /// Turn a signal into an event; position signals whose buffer was
    /// already delivered resolve to nothing
    fn resolve(&mut self, signal: Signal) -> Option<WorkerEvent> {
        match signal {
            Signal::Settled { generation, reason } => {
                Some(WorkerEvent::Settled { generation, reason })
            }
            Signal::Positions => {
                let slot = self.frames.borrow();
                let frame = slot.as_ref().filter(|f| f.seq > self.seen)?;
                self.seen = frame.seq;
                Some(WorkerEvent::Positions {
                    generation: frame.generation,
                    positions: frame.positions.clone(),
                })
            }
        }
    }
}

/// Who drives the tick loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Tick autonomously while the simulation is hot
    Timer { interval: Duration },
    /// Tick only on `WorkerCommand::Tick`
    Manual,
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub forces: ForceConfig,
    pub layout: InitialLayout,
    pub step_mode: StepMode,
    /// Place nodes at their settled layout immediately, skipping animation
    pub reduced_motion: bool,
    pub reduced_motion_max_ticks: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            forces: ForceConfig::default(),
            layout: InitialLayout::default(),
            step_mode: StepMode::Timer {
                interval: DEFAULT_TICK_INTERVAL,
            },
            reduced_motion: false,
            reduced_motion_max_ticks: DEFAULT_REDUCED_MOTION_MAX_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Settled,
    Stopped,
}

struct Session {
    generation: u64,
    simulation: Simulation,
    phase: Phase,
}

/// The simulation side of the channel pair
pub struct PhysicsWorker {
    config: WorkerConfig,
    session: Option<Session>,
    events: EventSender,
}

impl PhysicsWorker {
    pub fn new(config: WorkerConfig, events: EventSender) -> Self {
        Self {
            config,
            session: None,
            events,
        }
    }

    /// Start a worker on a dedicated thread
    pub fn spawn(config: WorkerConfig) -> std::io::Result<WorkerHandle> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = event_channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let worker = PhysicsWorker::new(config, event_tx);

        let thread = std::thread::Builder::new()
            .name("constellation-physics".to_string())
            .spawn(move || runtime.block_on(worker.run(command_rx)))?;

        Ok(WorkerHandle {
            commands: command_tx,
            events: event_rx,
            thread: Some(thread),
        })
    }

    /// Process commands until `Shutdown` or until every sender is dropped
    pub async fn run(mut self, mut commands: UnboundedReceiver<WorkerCommand>) {
        loop {
            let command = match self.config.step_mode {
                StepMode::Timer { interval } if self.is_running() => {
                    tokio::select! {
                        biased;
                        command = commands.recv() => command,
                        _ = tokio::time::sleep(interval) => {
                            self.step();
                            continue;
                        }
                    }
                }
                _ => commands.recv().await,
            };

            match command {
                Some(command) => {
                    if !self.handle(command) {
                        break;
                    }
                }
                None => break,
            }
        }
        debug!("physics worker exiting");
    }

    /// Whether the current session still wants ticks
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.phase == Phase::Running)
    }

    pub fn generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }

    /// Apply one command; returns `false` on shutdown
    pub fn handle(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Init {
                generation,
                nodes,
                edges,
            } => self.init(generation, nodes, edges),
            WorkerCommand::Tick => {
                if self.is_running() {
                    self.step();
                } else {
                    debug!("tick ignored: no running simulation");
                }
            }
            WorkerCommand::Reheat { alpha } => self.reheat(alpha),
            WorkerCommand::Stop => {
                if let Some(session) = self.session.as_mut() {
                    if session.phase != Phase::Stopped {
                        debug!(generation = session.generation, "simulation stopped");
                    }
                    session.phase = Phase::Stopped;
                }
            }
            WorkerCommand::Shutdown => return false,
        }
        true
    }

    fn init(&mut self, generation: u64, nodes: Vec<WorkerNode>, edges: Vec<WorkerEdge>) {
        info!(
            generation,
            nodes = nodes.len(),
            edges = edges.len(),
            "initialising simulation"
        );

        let forces = self.config.forces.clone();
        let layout = self.config.layout;
        let simulation = match guarded(|| Ok(Simulation::new(&nodes, &edges, forces, layout))) {
            Ok(simulation) => simulation,
            Err(message) => {
                warn!(generation, error = %message, "simulation init failed");
                self.session = None;
                self.emit(WorkerEvent::Settled {
                    generation,
                    reason: SettleReason::Fault(message),
                });
                return;
            }
        };
        self.session = Some(Session {
            generation,
            simulation,
            phase: Phase::Running,
        });

        if nodes.is_empty() {
            self.emit(WorkerEvent::Positions {
                generation,
                positions: Vec::new(),
            });
            self.settle(SettleReason::Empty);
        } else if self.config.reduced_motion {
            self.layout_without_motion();
        }
    }

    fn reheat(&mut self, alpha: Option<f32>) {
        let Some(session) = self.session.as_mut() else {
            debug!("reheat ignored: no simulation");
            return;
        };
        if session.phase == Phase::Stopped {
            debug!(
                generation = session.generation,
                "reheat ignored: simulation stopped"
            );
            return;
        }
        if session.simulation.node_count() == 0 {
            return;
        }

        let alpha = alpha.unwrap_or(DEFAULT_REHEAT_ALPHA);
        session.simulation.reheat(alpha);
        debug!(generation = session.generation, alpha, "simulation reheated");

        if self.config.reduced_motion {
            self.layout_without_motion();
        } else {
            session.phase = Phase::Running;
        }
    }

    fn layout_without_motion(&mut self) {
        let max_ticks = self.config.reduced_motion_max_ticks;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match guarded(|| session.simulation.run_to_convergence(max_ticks)) {
            Ok(_) => {
                let positions = session.simulation.positions();
                let generation = session.generation;
                self.emit(WorkerEvent::Positions {
                    generation,
                    positions,
                });
                self.settle(SettleReason::ReducedMotion);
            }
            Err(message) => self.fault(message),
        }
    }

    /// Advance the running session by one tick
    pub fn step(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != Phase::Running {
            return;
        }

        match guarded(|| session.simulation.tick()) {
            Ok(outcome) => {
                let positions = session.simulation.positions();
                let generation = session.generation;
                self.emit(WorkerEvent::Positions {
                    generation,
                    positions,
                });
                if outcome == TickOutcome::Settled {
                    self.settle(SettleReason::Converged);
                }
            }
            Err(message) => self.fault(message),
        }
    }

    fn settle(&mut self, reason: SettleReason) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let generation = session.generation;
        session.phase = if reason.is_fault() {
            Phase::Stopped
        } else {
            Phase::Settled
        };
        info!(
            generation,
            ticks = session.simulation.ticks(),
            reason = reason.as_str(),
            "simulation settled"
        );
        self.emit(WorkerEvent::Settled { generation, reason });
    }

    fn fault(&mut self, message: String) {
        warn!(
            generation = self.generation(),
            error = %message,
            "simulation fault, settling"
        );
        self.settle(SettleReason::Fault(message));
    }

    fn emit(&mut self, event: WorkerEvent) {
        if !self.events.send(event) {
            debug!("event receiver dropped");
        }
    }
}

/// Run simulation code, collapsing a panic or a simulation error into one
/// message
fn guarded<T>(f: impl FnOnce() -> Result<T, SimulationError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic in simulation".to_string())),
    }
}

/// Host side of a spawned worker
///
/// All command methods are fire-and-forget. They return `false` only when
/// the worker thread is gone.
pub struct WorkerHandle {
    commands: UnboundedSender<WorkerCommand>,
    events: EventReceiver,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, command: WorkerCommand) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(_) => {
                debug!("physics worker is gone, command dropped");
                false
            }
        }
    }

    pub fn init(&self, generation: u64, projection: Projection) -> bool {
        self.send(WorkerCommand::Init {
            generation,
            nodes: projection.nodes,
            edges: projection.edges,
        })
    }

    pub fn tick(&self) -> bool {
        self.send(WorkerCommand::Tick)
    }

    pub fn reheat(&self, alpha: Option<f32>) -> bool {
        self.send(WorkerCommand::Reheat { alpha })
    }

    pub fn stop(&self) -> bool {
        self.send(WorkerCommand::Stop)
    }

    /// Pop the next event without waiting
    pub fn try_next_event(&mut self) -> Option<WorkerEvent> {
        self.events.try_recv()
    }

    /// Wait for the next event; `None` once the worker has exited
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Blocking variant of `next_event`, for use outside async code
    pub fn blocking_next_event(&mut self) -> Option<WorkerEvent> {
        self.events.blocking_recv()
    }

    /// Ask the worker to exit and wait for its thread
    pub fn shutdown(mut self) {
        self.send(WorkerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("physics worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Position;

    fn manual() -> WorkerConfig {
        WorkerConfig {
            step_mode: StepMode::Manual,
            layout: InitialLayout::Random { seed: Some(11) },
            ..WorkerConfig::default()
        }
    }

    fn worker(config: WorkerConfig) -> (PhysicsWorker, EventReceiver) {
        let (tx, rx) = event_channel();
        (PhysicsWorker::new(config, tx), rx)
    }

    fn pair() -> (Vec<WorkerNode>, Vec<WorkerEdge>) {
        (
            vec![WorkerNode::new("a"), WorkerNode::new("b")],
            vec![WorkerEdge {
                source: "a".to_string(),
                target: "b".to_string(),
                weight: 1.0,
            }],
        )
    }

    fn drain(rx: &mut EventReceiver) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn init(worker: &mut PhysicsWorker, generation: u64) {
        let (nodes, edges) = pair();
        worker.handle(WorkerCommand::Init {
            generation,
            nodes,
            edges,
        });
    }

    #[test]
    fn tick_emits_positions_for_every_node() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);

        worker.handle(WorkerCommand::Tick);

        match drain(&mut rx).as_slice() {
            [WorkerEvent::Positions {
                generation,
                positions,
            }] => {
                assert_eq!(*generation, 1);
                assert_eq!(positions.len(), 6);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn empty_init_settles_immediately() {
        let (mut worker, mut rx) = worker(manual());

        worker.handle(WorkerCommand::Init {
            generation: 3,
            nodes: vec![],
            edges: vec![],
        });

        assert_eq!(
            drain(&mut rx),
            vec![
                WorkerEvent::Positions {
                    generation: 3,
                    positions: vec![]
                },
                WorkerEvent::Settled {
                    generation: 3,
                    reason: SettleReason::Empty
                },
            ]
        );
        assert!(!worker.is_running());
    }

    #[test]
    fn settles_exactly_once() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);

        for _ in 0..600 {
            worker.handle(WorkerCommand::Tick);
        }

        let events = drain(&mut rx);
        let settled: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Settled { .. }))
            .collect();
        assert_eq!(settled.len(), 1);
        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Settled {
                reason: SettleReason::Converged,
                ..
            })
        ));
        // Unread buffers collapse into the newest one
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn unread_positions_are_coalesced() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);

        for _ in 0..3 {
            worker.handle(WorkerCommand::Tick);
        }
        let latest = worker
            .session
            .as_ref()
            .map(|s| s.simulation.positions())
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![WorkerEvent::Positions {
                generation: 1,
                positions: latest
            }]
        );

        worker.handle(WorkerCommand::Tick);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_silences_ticks() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);

        assert!(worker.handle(WorkerCommand::Stop));
        assert!(worker.handle(WorkerCommand::Stop));
        worker.handle(WorkerCommand::Tick);
        worker.handle(WorkerCommand::Reheat { alpha: None });
        worker.handle(WorkerCommand::Tick);

        assert!(drain(&mut rx).is_empty());
        assert!(!worker.is_running());
    }

    #[test]
    fn init_after_stop_restarts() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);
        worker.handle(WorkerCommand::Stop);

        init(&mut worker, 2);
        worker.handle(WorkerCommand::Tick);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].generation(), 2);
    }

    #[test]
    fn reheat_rearms_a_settled_session() {
        let (mut worker, mut rx) = worker(manual());
        init(&mut worker, 1);
        while !matches!(rx.try_recv(), Some(WorkerEvent::Settled { .. })) {
            worker.handle(WorkerCommand::Tick);
        }
        worker.handle(WorkerCommand::Tick);
        assert!(drain(&mut rx).is_empty());

        worker.handle(WorkerCommand::Reheat { alpha: Some(0.3) });
        worker.handle(WorkerCommand::Tick);

        assert!(worker.is_running());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn fault_becomes_terminal_settle() {
        let config = WorkerConfig {
            forces: ForceConfig {
                charge: f32::NAN,
                ..ForceConfig::default()
            },
            ..manual()
        };
        let (mut worker, mut rx) = worker(config);
        init(&mut worker, 4);

        worker.handle(WorkerCommand::Tick);
        worker.handle(WorkerCommand::Tick);
        worker.handle(WorkerCommand::Reheat { alpha: None });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkerEvent::Settled {
                generation: 4,
                reason: SettleReason::Fault(message),
            } => assert!(message.contains("non-finite")),
            other => panic!("expected fault settle, got {other:?}"),
        }
    }

    #[test]
    fn init_panic_becomes_fault_and_next_init_recovers() {
        let config = WorkerConfig {
            forces: ForceConfig {
                min_link_distance: 50.0,
                max_link_distance: 10.0,
                ..ForceConfig::default()
            },
            ..manual()
        };
        let (mut worker, mut rx) = worker(config);

        init(&mut worker, 1);
        worker.handle(WorkerCommand::Tick);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            WorkerEvent::Settled {
                generation: 1,
                reason: SettleReason::Fault(_)
            }
        ));
        assert!(!worker.is_running());

        // No edges, so no link length is ever clamped
        worker.handle(WorkerCommand::Init {
            generation: 2,
            nodes: vec![WorkerNode::new("a"), WorkerNode::new("b")],
            edges: vec![],
        });
        worker.handle(WorkerCommand::Tick);

        match drain(&mut rx).as_slice() {
            [WorkerEvent::Positions {
                generation: 2,
                positions,
            }] => assert_eq!(positions.len(), 6),
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(worker.is_running());
    }

    #[test]
    fn guarded_reports_panics_and_errors() {
        let panicked = guarded::<()>(|| panic!("boom"));
        assert!(panicked.unwrap_err().contains("boom"));

        let failed = guarded::<()>(|| Err(SimulationError::NonFinite {
            node: "a".to_string(),
            tick: 3,
        }));
        assert!(failed.unwrap_err().contains("non-finite"));

        assert_eq!(guarded(|| Ok(5)), Ok(5));
    }

    #[test]
    fn reduced_motion_lays_out_in_one_shot() {
        let config = WorkerConfig {
            reduced_motion: true,
            ..manual()
        };
        let (mut worker, mut rx) = worker(config);
        init(&mut worker, 9);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        let WorkerEvent::Positions { positions, .. } = &events[0] else {
            panic!("expected positions first");
        };
        let a = Position::new(positions[0], positions[1], positions[2]);
        let b = Position::new(positions[3], positions[4], positions[5]);
        let d = a.distance_to(&b);
        assert!(d > 15.0 && d < 60.0, "distance {d}");
        assert_eq!(
            events[1],
            WorkerEvent::Settled {
                generation: 9,
                reason: SettleReason::ReducedMotion
            }
        );
    }

    #[test]
    fn shutdown_ends_the_loop() {
        let (mut worker, _rx) = worker(manual());
        assert!(!worker.handle(WorkerCommand::Shutdown));
    }
}
