//! Host backends
//!
//! A [`HostBackend`] stands in for the render host: it delivers connection
//! lifecycle and input edges as timestamped events, reports whether a session
//! is presenting, and supplies per-device poses and gamepad snapshots.
//!
//! Two implementations ship:
//! - [`ScriptedBackend`] - deterministic, driven through a [`ScriptHandle`];
//!   used by the demo choreography and the session tests
//! - [`gamepad::GamepadBackend`] - maps a desktop gamepad onto a simulated
//!   controller so the interaction layer can be exercised without a headset

pub mod gamepad;

pub use gamepad::{GamepadBackend, GamepadBackendSettings};

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::device::{GamepadSnapshot, InputSourceDescriptor, Pose, MAX_DEVICES};
use crate::interaction::InputEdge;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to initialize host backend: {0}")]
    Init(String),
}

/// One signal from the host, addressed to a device slot.
#[derive(Debug, Clone)]
pub enum HostSignal {
    Connected {
        index: usize,
        descriptor: InputSourceDescriptor,
    },
    Disconnected {
        index: usize,
    },
    Input {
        index: usize,
        edge: InputEdge,
    },
}

/// Timestamped host signal, in delivery order.
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub at: DateTime<Local>,
    pub signal: HostSignal,
}

impl HostEvent {
    pub fn now(signal: HostSignal) -> Self {
        Self {
            at: Local::now(),
            signal,
        }
    }
}

/// Source of host signals and per-device hardware state.
///
/// The session loop drains events once per tick and reads poses and snapshots
/// afterwards, so implementations can update internal state inside
/// [`HostBackend::drain_events`].
pub trait HostBackend: Send {
    fn drain_events(&mut self) -> Vec<HostEvent>;

    /// Whether an immersive session is active. Polling is skipped otherwise.
    fn is_presenting(&self) -> bool;

    fn pose(&self, index: usize) -> Option<Pose>;

    /// Flat hardware snapshot for the device, `None` when unavailable.
    fn snapshot(&self, index: usize) -> Option<GamepadSnapshot>;
}

#[derive(Debug, Default)]
struct ScriptState {
    queued: Vec<HostEvent>,
    presenting: bool,
    poses: [Option<Pose>; MAX_DEVICES],
    snapshots: [Option<GamepadSnapshot>; MAX_DEVICES],
}

/// Deterministic backend fed from outside through a [`ScriptHandle`].
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

/// Feeding side of a [`ScriptedBackend`]. Clone freely.
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState {
            presenting: true,
            ..ScriptState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

fn lock_state(state: &Mutex<ScriptState>) -> std::sync::MutexGuard<'_, ScriptState> {
    // A panic under the lock leaves no torn state worth refusing to read.
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ScriptHandle {
    fn with_state<R>(&self, f: impl FnOnce(&mut ScriptState) -> R) -> R {
        let mut state = lock_state(&self.state);
        f(&mut state)
    }

    /// Queues a signal for the next drain.
    pub fn feed(&self, signal: HostSignal) {
        self.with_state(|state| state.queued.push(HostEvent::now(signal)));
    }

    pub fn set_presenting(&self, presenting: bool) {
        self.with_state(|state| state.presenting = presenting);
    }

    pub fn set_pose(&self, index: usize, pose: Pose) {
        self.with_state(|state| {
            if let Some(slot) = state.poses.get_mut(index) {
                *slot = Some(pose);
            }
        });
    }

    pub fn set_snapshot(&self, index: usize, snapshot: GamepadSnapshot) {
        self.with_state(|state| {
            if let Some(slot) = state.snapshots.get_mut(index) {
                *slot = Some(snapshot);
            }
        });
    }

    pub fn clear_snapshot(&self, index: usize) {
        self.with_state(|state| {
            if let Some(slot) = state.snapshots.get_mut(index) {
                *slot = None;
            }
        });
    }
}

impl HostBackend for ScriptedBackend {
    fn drain_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut lock_state(&self.state).queued)
    }

    fn is_presenting(&self) -> bool {
        lock_state(&self.state).presenting
    }

    fn pose(&self, index: usize) -> Option<Pose> {
        lock_state(&self.state).poses.get(index).copied().flatten()
    }

    fn snapshot(&self, index: usize) -> Option<GamepadSnapshot> {
        lock_state(&self.state).snapshots.get(index).cloned().flatten()
    }
}
