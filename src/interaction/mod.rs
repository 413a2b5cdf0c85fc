//! Interaction subsystem: picking and the selection/attachment machine
//!
//! 1. [`picker`] - per-device ray cast against the interaction volume
//! 2. [`state`] - the per-device selection state and its invariants
//! 3. [`manager`] - event dispatch, per-tick picking, grab/release side effects
//!
//! Everything here runs synchronously inside the session tick. The manager is
//! an explicit instance holding all per-device state; hosts feed it dispatched
//! input edges instead of wiring their own event listeners.

pub mod manager;
pub mod picker;
pub mod state;

pub use manager::{InteractionManager, InteractionSettings};
pub use picker::{device_ray, pick_nearest, RayHit};
pub use state::SelectionState;

use thiserror::Error;

use crate::scene::SceneError;

/// Edge-triggered input signal for one device, as dispatched by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEdge {
    SelectStart,
    SelectEnd,
    SqueezeStart,
    SqueezeEnd,
}

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("device index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("no interaction state registered for device {0}")]
    UnknownDevice(usize),
}
