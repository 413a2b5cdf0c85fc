//! Desktop gamepad backend
//!
//! Maps a regular gamepad onto a simulated right-hand controller so the whole
//! interaction stack can be exercised at a desk:
//!
//! - right trigger -> select, left trigger -> squeeze
//! - left stick moves the simulated controller, right stick turns it
//! - the gamepad's buttons and sticks also feed the polled hardware snapshot,
//!   laid out to match the bundled generic profile
//!
//! Slot 0 only; a desk simulation has one hand on the pad.

use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use glam::{EulerRot, Quat, Vec3};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::device::{GamepadSnapshot, Handedness, InputSourceDescriptor, Pose};
use crate::host::{HostBackend, HostError, HostEvent, HostSignal};
use crate::interaction::InputEdge;
use crate::profile::service::DEFAULT_PROFILE_ID;

/// Simulated controller slot driven by the gamepad.
const DEVICE_INDEX: usize = 0;

#[derive(Clone, Debug)]
pub struct GamepadBackendSettings {
    /// Stick values below this magnitude are treated as centered.
    pub stick_deadzone: f32,

    /// Simulated hand translation speed, meters per second at full deflection.
    pub move_speed: f32,

    /// Simulated hand turn rate, radians per second at full deflection.
    pub turn_speed: f32,
}

impl Default for GamepadBackendSettings {
    fn default() -> Self {
        Self {
            stick_deadzone: 0.05,
            move_speed: 1.5,
            turn_speed: 1.6,
        }
    }
}

/// Pose integration state, kept separate so the math stays testable without
/// gamepad hardware.
#[derive(Debug, Clone, Copy)]
struct SimPose {
    position: Vec3,
    yaw: f32,
    pitch: f32,
}

impl SimPose {
    fn start() -> Self {
        Self {
            position: Vec3::new(0.0, 1.6, 0.0),
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0),
        }
    }
}

fn integrate(
    sim: &mut SimPose,
    move_stick: (f32, f32),
    turn_stick: (f32, f32),
    dt: f32,
    settings: &GamepadBackendSettings,
) {
    sim.yaw -= turn_stick.0 * settings.turn_speed * dt;
    sim.pitch = (sim.pitch + turn_stick.1 * settings.turn_speed * dt)
        .clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);

    // Move in the yaw plane: stick up is forward along the current -Z.
    let heading = Quat::from_rotation_y(sim.yaw);
    let step = heading * Vec3::new(move_stick.0, 0.0, -move_stick.1);
    sim.position += step * settings.move_speed * dt;
}

pub struct GamepadBackend {
    gilrs: Gilrs,
    settings: GamepadBackendSettings,
    active_gamepad: Option<GamepadId>,
    announced: bool,
    sim: SimPose,
    move_stick: (f32, f32),
    turn_stick: (f32, f32),
    last_drain: Option<Instant>,
}

impl GamepadBackend {
    pub fn new(settings: GamepadBackendSettings) -> Result<Self, HostError> {
        info!("Initializing gilrs gamepad interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(HostError::Init(e.to_string()));
            }
        };

        let active_gamepad = gilrs.gamepads().next().map(|(id, gamepad)| {
            info!("Using gamepad {} ({})", gamepad.name(), id);
            id
        });
        if active_gamepad.is_none() {
            warn!("No gamepad connected, waiting for one to appear");
        }

        Ok(Self {
            gilrs,
            settings,
            active_gamepad,
            announced: false,
            sim: SimPose::start(),
            move_stick: (0.0, 0.0),
            turn_stick: (0.0, 0.0),
            last_drain: None,
        })
    }

    fn simulated_descriptor() -> InputSourceDescriptor {
        InputSourceDescriptor::new(Handedness::Right, &[DEFAULT_PROFILE_ID.to_string()])
    }
}

// Maps gamepad triggers onto the select/squeeze edges of the simulated hand.
fn map_button_edge(button: Button, pressed: bool) -> Option<InputEdge> {
    match (button, pressed) {
        (Button::RightTrigger2, true) => Some(InputEdge::SelectStart),
        (Button::RightTrigger2, false) => Some(InputEdge::SelectEnd),
        (Button::LeftTrigger2, true) => Some(InputEdge::SqueezeStart),
        (Button::LeftTrigger2, false) => Some(InputEdge::SqueezeEnd),
        _ => None,
    }
}

impl HostBackend for GamepadBackend {
    fn drain_events(&mut self) -> Vec<HostEvent> {
        let mut events = Vec::new();

        if !self.announced && self.active_gamepad.is_some() {
            info!("Announcing simulated controller for slot {}", DEVICE_INDEX);
            events.push(HostEvent::now(HostSignal::Connected {
                index: DEVICE_INDEX,
                descriptor: Self::simulated_descriptor(),
            }));
            self.announced = true;
        }

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active) = self.active_gamepad {
                if id != active && !matches!(event, EventType::Connected) {
                    debug!("Skipping event from non-active gamepad {:?}", id);
                    continue;
                }
            }

            match event {
                EventType::Connected => {
                    if self.active_gamepad.is_none() {
                        info!("Gamepad {:?} connected, taking it as the simulated hand", id);
                        self.active_gamepad = Some(id);
                        if !self.announced {
                            events.push(HostEvent::now(HostSignal::Connected {
                                index: DEVICE_INDEX,
                                descriptor: Self::simulated_descriptor(),
                            }));
                            self.announced = true;
                        }
                    }
                }
                EventType::Disconnected => {
                    if self.active_gamepad == Some(id) {
                        warn!("Active gamepad disconnected");
                        self.active_gamepad = None;
                        if self.announced {
                            events.push(HostEvent::now(HostSignal::Disconnected {
                                index: DEVICE_INDEX,
                            }));
                            self.announced = false;
                        }
                    }
                }
                EventType::ButtonPressed(button, _) => {
                    if let Some(edge) = map_button_edge(button, true) {
                        debug!("Button {:?} pressed -> {:?}", button, edge);
                        events.push(HostEvent::now(HostSignal::Input {
                            index: DEVICE_INDEX,
                            edge,
                        }));
                    }
                }
                EventType::ButtonReleased(button, _) => {
                    if let Some(edge) = map_button_edge(button, false) {
                        debug!("Button {:?} released -> {:?}", button, edge);
                        events.push(HostEvent::now(HostSignal::Input {
                            index: DEVICE_INDEX,
                            edge,
                        }));
                    }
                }
                EventType::AxisChanged(axis, value, _) => {
                    let value = apply_deadzone(value, self.settings.stick_deadzone);
                    match axis {
                        Axis::LeftStickX => self.move_stick.0 = value,
                        Axis::LeftStickY => self.move_stick.1 = value,
                        Axis::RightStickX => self.turn_stick.0 = value,
                        Axis::RightStickY => self.turn_stick.1 = value,
                        _ => debug!("Ignoring unsupported axis {:?}", axis),
                    }
                }
                _ => {}
            }
        }

        let now = Instant::now();
        let dt = self
            .last_drain
            .map(|last| (now - last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_drain = Some(now);
        integrate(
            &mut self.sim,
            self.move_stick,
            self.turn_stick,
            dt,
            &self.settings,
        );

        events
    }

    fn is_presenting(&self) -> bool {
        self.active_gamepad.is_some()
    }

    fn pose(&self, index: usize) -> Option<Pose> {
        (index == DEVICE_INDEX && self.announced).then(|| self.sim.pose())
    }

    /// Snapshot laid out to match the bundled generic profile: buttons are
    /// [trigger, squeeze, touchpad, thumbstick], axes are
    /// [touchpad x, touchpad y, thumbstick x, thumbstick y].
    fn snapshot(&self, index: usize) -> Option<GamepadSnapshot> {
        if index != DEVICE_INDEX {
            return None;
        }
        let id = self.active_gamepad?;
        let gamepad = self.gilrs.connected_gamepad(id)?;

        let button_value = |button: Button| -> f32 {
            gamepad
                .button_data(button)
                .map(|data| data.value())
                .unwrap_or(0.0)
        };
        Some(GamepadSnapshot {
            buttons: vec![
                button_value(Button::RightTrigger2),
                button_value(Button::LeftTrigger2),
                button_value(Button::South),
                button_value(Button::RightThumb),
            ],
            axes: vec![
                gamepad.value(Axis::LeftStickX),
                gamepad.value(Axis::LeftStickY),
                gamepad.value(Axis::RightStickX),
                gamepad.value(Axis::RightStickY),
            ],
        })
    }
}

// Rescales stick values so the range outside the deadzone maps back to [0, 1].
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_zeroes_small_values_and_rescales_the_rest() {
        assert_eq!(apply_deadzone(0.03, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.03, 0.05), 0.0);
        assert_eq!(apply_deadzone(1.0, 0.05), 1.0);
        assert!(apply_deadzone(0.5, 0.05) < 0.5);
        assert!(apply_deadzone(-1.0, 0.05) == -1.0);
    }

    #[test]
    fn forward_stick_moves_along_negative_z() {
        let settings = GamepadBackendSettings::default();
        let mut sim = SimPose::start();
        integrate(&mut sim, (0.0, 1.0), (0.0, 0.0), 1.0, &settings);
        assert!(sim.position.z < 0.0);
        assert!((sim.position.z + settings.move_speed).abs() < 1e-5);
        assert_eq!(sim.position.y, 1.6);
    }

    #[test]
    fn turning_then_moving_follows_the_new_heading() {
        let settings = GamepadBackendSettings {
            turn_speed: std::f32::consts::FRAC_PI_2,
            ..GamepadBackendSettings::default()
        };
        let mut sim = SimPose::start();
        // Quarter turn to the right, then a full second of forward movement.
        integrate(&mut sim, (0.0, 0.0), (1.0, 0.0), 1.0, &settings);
        integrate(&mut sim, (0.0, 1.0), (0.0, 0.0), 1.0, &settings);
        // Forward now points down +X instead of -Z.
        assert!((sim.position.x - settings.move_speed).abs() < 1e-4);
        assert!(sim.position.z.abs() < 1e-4);
    }
}
