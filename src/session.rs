//! Interaction session driver
//!
//! Ties the subsystems together on a single logical tick: drain host signals,
//! apply pending layout resolutions, update poses, poll gamepad state on its
//! own wall-clock cadence, then run the per-frame interaction pass. All scene
//! and selection mutation happens here, on one task, in strict sequence.
//!
//! The session is a two-phase statum machine. [`SessionHandle::spawn`] is the
//! public face: it builds the session, moves it onto a tokio task and hands
//! back a watch receiver for the device status board.

use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceRegistry, LayoutResolution, RegistryError, StatusBoard, MAX_DEVICES};
use crate::host::{HostBackend, HostEvent, HostSignal};
use crate::interaction::{InteractionError, InteractionManager, InteractionSettings, SelectionState};
use crate::profile::ProfileService;
use crate::scene::{NodeId, Scene};

/// Timing configuration for the session loop.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Tick interval in milliseconds. One tick is one logical frame.
    pub tick_interval_ms: u64,

    /// Wall-clock cadence of gamepad polling, independent of the tick rate.
    pub gamepad_poll_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,         // one frame at 60Hz
            gamepad_poll_interval_ms: 300, // button state does not need frame rate
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Interaction error: {0}")]
    Interaction(#[from] InteractionError),
}

// Session phases: wiring in Initializing, the tick loop in Presenting.
#[state]
#[derive(Debug, Clone)]
pub enum SessionPhase {
    Initializing,
    Presenting,
}

#[machine]
pub struct InteractionSession<S: SessionPhase> {
    scene: Scene,
    manager: InteractionManager,
    registry: DeviceRegistry,
    backend: Box<dyn HostBackend>,
    resolution_rx: mpsc::Receiver<LayoutResolution>,
    settings: SessionSettings,
    poll_elapsed: Duration,
}

// Accessors available in every phase.
impl<S: SessionPhase> InteractionSession<S> {
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn manager(&self) -> &InteractionManager {
        &self.manager
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn device_status(&self) -> StatusBoard {
        self.registry.status()
    }

    pub fn selection(&self, index: usize) -> Result<SelectionState, InteractionError> {
        self.manager.selection(index)
    }
}

impl InteractionSession<Initializing> {
    /// Builds the session around an externally owned interaction volume.
    ///
    /// Returns the session plus the watch receiver publishing per-device
    /// status, so hosts can observe inert devices instead of reading logs.
    pub fn create(
        mut scene: Scene,
        volume: NodeId,
        backend: Box<dyn HostBackend>,
        service: Arc<dyn ProfileService>,
        interaction_settings: InteractionSettings,
        settings: SessionSettings,
    ) -> Result<(Self, watch::Receiver<StatusBoard>), SessionError> {
        debug!("Creating interaction session with settings: {:?}", settings);
        let manager = InteractionManager::new(&mut scene, volume, interaction_settings)?;
        let (registry, resolution_rx, status_rx) = DeviceRegistry::new(service);

        info!("Interaction session created");
        Ok((
            Self::new(
                scene,
                manager,
                registry,
                backend,
                resolution_rx,
                settings,
                Duration::ZERO,
            ),
            status_rx,
        ))
    }

    /// Transitions into the presenting phase; ticks may run from here on.
    pub fn begin_presenting(self) -> InteractionSession<Presenting> {
        info!("Interaction session presenting");
        self.transition()
    }
}

impl InteractionSession<Presenting> {
    /// Runs one logical frame. `dt` is the wall-clock time since the previous
    /// step, as a render host would hand it to its frame callback.
    ///
    /// Returns the number of host signals handled this step.
    pub fn step(&mut self, dt: Duration) -> Result<usize, SessionError> {
        // Layout resolutions land between ticks, never mid-mutation.
        while let Ok(resolution) = self.resolution_rx.try_recv() {
            self.registry.apply_resolution(resolution);
        }

        let events = self.backend.drain_events();
        let handled = events.len();
        for event in events {
            // One bad signal must not take the session down.
            if let Err(e) = self.apply_signal(event) {
                warn!("Host signal dropped: {}", e);
            }
        }

        for index in 0..MAX_DEVICES {
            if !self.manager.is_registered(index) {
                continue;
            }
            if let Some(pose) = self.backend.pose(index) {
                self.manager.set_pose(&mut self.scene, index, pose)?;
            }
        }

        self.poll_elapsed += dt;
        if self.poll_elapsed >= Duration::from_millis(self.settings.gamepad_poll_interval_ms) {
            self.poll_elapsed = Duration::ZERO;
            self.poll_gamepads();
        }

        self.manager.tick_all(&mut self.scene)?;
        Ok(handled)
    }

    /// Ticks forever at the configured interval. Only returns on error.
    pub async fn run_loop(mut self) -> Result<(), SessionError> {
        info!(
            "Starting session loop with {}ms ticks",
            self.settings.tick_interval_ms
        );
        let mut ticker = interval(Duration::from_millis(self.settings.tick_interval_ms));
        let mut last_tick = Instant::now();

        // Performance counters, reported on a fixed window.
        let mut cycles: u64 = 0;
        let mut total_events: u64 = 0;
        let mut last_stats = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let dt = now - last_tick;
            last_tick = now;

            total_events += self.step(dt)? as u64;
            cycles += 1;

            let now = Local::now();
            if now - last_stats > stats_interval {
                let elapsed = (now - last_stats).num_seconds();
                info!(
                    "Session stats: {} cycles, {} host events in {}s ({:.1} cycles/sec)",
                    cycles,
                    total_events,
                    elapsed,
                    cycles as f64 / elapsed as f64
                );
                cycles = 0;
                total_events = 0;
                last_stats = now;
            }
        }
    }

    fn apply_signal(&mut self, event: HostEvent) -> Result<(), SessionError> {
        match event.signal {
            HostSignal::Connected { index, descriptor } => {
                self.registry.on_connected(index, descriptor)?;
                self.manager.register_device(&mut self.scene, index)?;
            }
            HostSignal::Disconnected { index } => {
                self.manager.remove_device(&mut self.scene, index)?;
                self.registry.on_disconnected(index)?;
            }
            HostSignal::Input { index, edge } => {
                debug!(
                    "Input {:?} for device {} at {}",
                    edge,
                    index,
                    event.at.format("%H:%M:%S%.3f")
                );
                self.manager.dispatch(
                    &mut self.scene,
                    index,
                    self.registry.control_layout(index),
                    edge,
                )?;
            }
        }
        Ok(())
    }

    fn poll_gamepads(&mut self) {
        if !self.backend.is_presenting() {
            debug!("Not presenting, gamepad polling skipped");
            return;
        }
        for index in 0..MAX_DEVICES {
            let Some(snapshot) = self.backend.snapshot(index) else {
                continue;
            };
            match self.registry.refresh(index, &snapshot) {
                Ok(true) => debug!("Device {} button cache refreshed", index),
                Ok(false) => {}
                Err(e) => warn!("Device {} gamepad refresh aborted: {}", index, e),
            }
        }
    }
}

/// Handle for running a session on its own task.
pub struct SessionHandle {
    status_receiver: watch::Receiver<StatusBoard>,
}

impl SessionHandle {
    /// Builds the session and spawns its loop as a tokio task.
    pub fn spawn(
        scene: Scene,
        volume: NodeId,
        backend: Box<dyn HostBackend>,
        service: Arc<dyn ProfileService>,
        interaction_settings: InteractionSettings,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let (session, status_receiver) = InteractionSession::create(
            scene,
            volume,
            backend,
            service,
            interaction_settings,
            settings,
        )?;

        info!("Spawning interaction session task");
        let task_handle = tokio::spawn(async move {
            let presenting = session.begin_presenting();
            if let Err(e) = presenting.run_loop().await {
                error!("Interaction session terminated with error: {}", e);
            }
        });
        debug!("Tokio task spawned with handle: {:?}", task_handle);

        Ok(Self { status_receiver })
    }

    /// Watch receiver for the per-device status board.
    pub fn subscribe(&self) -> watch::Receiver<StatusBoard> {
        self.status_receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{
        DeviceStatus, GamepadSnapshot, Handedness, InputSourceDescriptor, Pose,
    };
    use crate::host::{ScriptHandle, ScriptedBackend};
    use crate::interaction::InputEdge;
    use crate::profile::StaticProfileService;
    use glam::{Quat, Vec3};

    struct TestSession {
        session: InteractionSession<Presenting>,
        handle: ScriptHandle,
        volume: NodeId,
        cube: NodeId,
    }

    async fn presenting_session() -> TestSession {
        let mut scene = Scene::new();
        let volume = scene.add_node(scene.root(), "volume").unwrap();
        let cube = scene.add_node(volume, "cube").unwrap();
        scene
            .set_translation(cube, Vec3::new(0.0, 1.6, -2.0))
            .unwrap();
        scene.set_bounding_radius(cube, 0.5).unwrap();

        let (backend, handle) = ScriptedBackend::new();
        let service = Arc::new(StaticProfileService::bundled().unwrap());
        let (session, _status_rx) = InteractionSession::create(
            scene,
            volume,
            Box::new(backend),
            service,
            InteractionSettings::default(),
            SessionSettings::default(),
        )
        .unwrap();

        TestSession {
            session: session.begin_presenting(),
            handle,
            volume,
            cube,
        }
    }

    fn connect_signal() -> HostSignal {
        HostSignal::Connected {
            index: 0,
            descriptor: InputSourceDescriptor::new(Handedness::Right, &[]),
        }
    }

    fn facing_pose() -> Pose {
        Pose {
            position: Vec3::new(0.0, 1.6, 0.0),
            orientation: Quat::IDENTITY,
        }
    }

    /// Connects device 0 and steps until its layout is resolved.
    async fn connect_and_resolve(test: &mut TestSession) {
        test.handle.feed(connect_signal());
        test.handle.set_pose(0, facing_pose());
        test.session.step(Duration::ZERO).unwrap();
        // Let the resolution task deliver its result, then apply it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        test.session.step(Duration::ZERO).unwrap();
        assert_eq!(test.session.device_status()[0], DeviceStatus::Ready);
    }

    #[tokio::test]
    async fn connect_resolves_layout_through_the_loop() {
        let mut test = presenting_session().await;
        connect_and_resolve(&mut test).await;
        assert!(test.session.manager().is_registered(0));
        assert_eq!(
            test.session.registry().control_layout(0).unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn full_grab_round_trip_over_host_signals() {
        let mut test = presenting_session().await;
        connect_and_resolve(&mut test).await;
        let before = test.session.scene().world_transform(test.cube).unwrap();

        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SelectStart,
        });
        test.session.step(Duration::ZERO).unwrap();
        assert_eq!(
            test.session.selection(0).unwrap().selected(),
            Some(test.cube)
        );

        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SqueezeStart,
        });
        test.session.step(Duration::ZERO).unwrap();
        assert_eq!(
            test.session.selection(0).unwrap().attached(),
            Some(test.cube)
        );

        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SqueezeEnd,
        });
        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SelectEnd,
        });
        test.session.step(Duration::ZERO).unwrap();

        assert!(test.session.selection(0).unwrap().is_idle());
        let scene = test.session.scene();
        assert_eq!(scene.node(test.cube).unwrap().parent(), Some(test.volume));
        let after = scene.world_transform(test.cube).unwrap();
        let (_, _, before_t) = before.to_scale_rotation_translation();
        let (_, _, after_t) = after.to_scale_rotation_translation();
        assert!(before_t.distance(after_t) < 1e-4);
    }

    #[tokio::test]
    async fn gamepad_polling_respects_the_cadence() {
        let mut test = presenting_session().await;
        connect_and_resolve(&mut test).await;
        test.handle.set_snapshot(
            0,
            GamepadSnapshot {
                buttons: vec![0.7, 0.0, 0.0, 0.0],
                axes: vec![0.0, 0.0, 0.0, 0.0],
            },
        );

        // Two 100ms steps stay under the 300ms cadence.
        test.session.step(Duration::from_millis(100)).unwrap();
        test.session.step(Duration::from_millis(100)).unwrap();
        assert!(test
            .session
            .registry()
            .button_state(0)
            .unwrap()
            .is_empty());

        // The third crosses it.
        test.session.step(Duration::from_millis(100)).unwrap();
        let cache = test.session.registry().button_state(0).unwrap();
        assert!((cache.value("xr_standard_trigger") - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn polling_skips_when_not_presenting() {
        let mut test = presenting_session().await;
        connect_and_resolve(&mut test).await;
        test.handle.set_snapshot(
            0,
            GamepadSnapshot {
                buttons: vec![1.0, 0.0, 0.0, 0.0],
                axes: vec![0.0, 0.0, 0.0, 0.0],
            },
        );
        test.handle.set_presenting(false);

        test.session.step(Duration::from_millis(400)).unwrap();
        assert!(test
            .session
            .registry()
            .button_state(0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn disconnect_mid_grab_returns_the_object() {
        let mut test = presenting_session().await;
        connect_and_resolve(&mut test).await;

        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SelectStart,
        });
        test.session.step(Duration::ZERO).unwrap();
        test.handle.feed(HostSignal::Input {
            index: 0,
            edge: InputEdge::SqueezeStart,
        });
        test.session.step(Duration::ZERO).unwrap();

        test.handle.feed(HostSignal::Disconnected { index: 0 });
        test.session.step(Duration::ZERO).unwrap();

        assert_eq!(test.session.device_status()[0], DeviceStatus::Disconnected);
        assert!(!test.session.manager().is_registered(0));
        let scene = test.session.scene();
        assert_eq!(scene.node(test.cube).unwrap().parent(), Some(test.volume));
    }

    #[tokio::test]
    async fn signals_for_bad_indices_are_dropped_not_fatal() {
        let mut test = presenting_session().await;
        test.handle.feed(HostSignal::Connected {
            index: 7,
            descriptor: InputSourceDescriptor::new(Handedness::Left, &[]),
        });
        // The bad signal is logged and dropped; the step itself succeeds.
        test.session.step(Duration::ZERO).unwrap();
        assert!(!test.session.manager().is_registered(0));
    }
}
