//! Device subsystem: connection lifecycle and polled control state
//!
//! 1. [`registry`] - tracks the two controller slots, resolves control layouts
//!    asynchronously and publishes per-device status
//! 2. [`state_cache`] - snapshot-to-cache copy of button/axis values on the
//!    polling cadence
//!
//! The index contract is fixed: slot 0 is the right hand, slot 1 the left.
//! The system this replaces used both orderings in different places; one had
//! to be picked and documented.

pub mod registry;
pub mod state_cache;

pub use registry::{DeviceRegistry, LayoutResolution, RegistryError};
pub use state_cache::{ButtonStateCache, ControlSample, StateCacheError};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Number of controller slots the registry tracks.
pub const MAX_DEVICES: usize = 2;

/// Which hand a device slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Right,
    Left,
}

impl Handedness {
    /// Slot contract: index 0 is the right hand, index 1 the left.
    pub fn from_index(index: usize) -> Option<Handedness> {
        match index {
            0 => Some(Handedness::Right),
            1 => Some(Handedness::Left),
            _ => None,
        }
    }

    /// Key used for layout lookup in input profile descriptions.
    pub fn profile_key(&self) -> &'static str {
        match self {
            Handedness::Right => "right",
            Handedness::Left => "left",
        }
    }
}

impl std::fmt::Display for Handedness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handedness::Right => write!(f, "right"),
            Handedness::Left => write!(f, "left"),
        }
    }
}

/// How a device's pointing ray is produced, as reported on connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetRayMode {
    #[default]
    TrackedPointer,
    Gaze,
    Screen,
}

/// Raw description of an input source, delivered with the connected signal.
#[derive(Debug, Clone)]
pub struct InputSourceDescriptor {
    /// Advertised profile ids, most specific first.
    pub profiles: Vec<String>,
    pub handedness: Handedness,
    pub target_ray_mode: TargetRayMode,
}

impl InputSourceDescriptor {
    pub fn new(handedness: Handedness, profiles: &[String]) -> Self {
        Self {
            profiles: profiles.to_vec(),
            handedness,
            target_ray_mode: TargetRayMode::default(),
        }
    }
}

/// World-space pose of a device, supplied by the host every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// One poll of the underlying hardware: flat button and axis value arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub buttons: Vec<f32>,
    pub axes: Vec<f32>,
}

/// Observable per-slot lifecycle state, published over a watch channel so a
/// host can tell an inert device from a working one without reading logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceStatus {
    #[default]
    Disconnected,

    /// Connected, profile resolution still in flight. Inert for polling.
    ResolvingLayout,

    /// Connected with a validated control layout.
    Ready,

    /// Connected but profile resolution failed. Stays registered, never polls.
    Inert,
}

/// Status of both controller slots, index-aligned with the registry.
pub type StatusBoard = [DeviceStatus; MAX_DEVICES];
