//! Interaction manager
//!
//! Owns all per-device interaction state and applies the selection/attachment
//! protocol to a scene it borrows per call. The host dispatches edge-triggered
//! input through [`InteractionManager::dispatch`] and drives per-frame picking
//! through [`InteractionManager::tick_all`]; there is no ambient state and no
//! event listeners mutating captured context.
//!
//! Grabbing reparents the selected object under the device node and releasing
//! reparents it back into the volume, both via the world-pose-preserving
//! [`Scene::attach`], so an object never jumps when it changes hands.

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::device::{Handedness, Pose, MAX_DEVICES};
use crate::interaction::picker::{device_ray, pick_nearest};
use crate::interaction::state::SelectionState;
use crate::interaction::{InputEdge, InteractionError};
use crate::profile::{ControlLayout, SQUEEZE_CLASS, TRIGGER_CLASS};
use crate::scene::{NodeId, Scene};

/// Tunables for the interaction layer.
#[derive(Clone, Debug)]
pub struct InteractionSettings {
    /// Laser indicator length while selecting with no hit, in meters.
    pub default_ray_length: f32,

    /// Bounding radius of the highlight proxy node.
    pub highlight_radius: f32,

    /// Uniform scale of the highlight proxy, slightly above 1 so it wraps the
    /// object it marks.
    pub highlight_scale: f32,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            default_ray_length: 10.0, // reads as "infinite" at room scale
            highlight_radius: 0.08,
            highlight_scale: 1.2,
        }
    }
}

/// Scene nodes and selection state of one registered device.
#[derive(Debug, Clone, Copy)]
struct DeviceInteraction {
    controller: NodeId,
    laser: NodeId,
    selection: SelectionState,
    select_held: bool,
    squeeze_held: bool,
}

/// Explicit instance holding all per-device interaction state.
pub struct InteractionManager {
    settings: InteractionSettings,
    volume: NodeId,
    highlight: NodeId,
    devices: [Option<DeviceInteraction>; MAX_DEVICES],
}

impl InteractionManager {
    /// Creates the manager and its shared highlight proxy node.
    ///
    /// `volume` stays owned by the caller; the manager only remembers its id.
    pub fn new(
        scene: &mut Scene,
        volume: NodeId,
        settings: InteractionSettings,
    ) -> Result<Self, InteractionError> {
        scene.node(volume)?;
        let highlight = scene.add_node(scene.root(), "highlight")?;
        scene.set_bounding_radius(highlight, settings.highlight_radius)?;
        scene.set_scale(highlight, Vec3::splat(settings.highlight_scale))?;
        scene.set_visible(highlight, false)?;
        Ok(Self {
            settings,
            volume,
            highlight,
            devices: [None; MAX_DEVICES],
        })
    }

    /// Creates the controller and laser nodes for a newly connected device.
    pub fn register_device(
        &mut self,
        scene: &mut Scene,
        index: usize,
    ) -> Result<(), InteractionError> {
        let handedness =
            Handedness::from_index(index).ok_or(InteractionError::IndexOutOfRange(index))?;
        if self.devices[index].is_some() {
            warn!("Device {} registered twice, replacing its nodes", index);
            self.remove_device(scene, index)?;
        }

        let controller = scene.add_node(scene.root(), &format!("controller-{handedness}"))?;
        let laser = scene.add_node(controller, "laser")?;
        scene.set_scale(laser, Vec3::new(1.0, 1.0, 0.0))?;

        self.devices[index] = Some(DeviceInteraction {
            controller,
            laser,
            selection: SelectionState::Idle,
            select_held: false,
            squeeze_held: false,
        });
        debug!("Device {} interaction nodes created", index);
        Ok(())
    }

    /// Forces the device to Idle and removes its scene nodes.
    ///
    /// A held object is first returned to the volume with its world pose
    /// intact, so a disconnect mid-grab never destroys a volume member.
    pub fn remove_device(
        &mut self,
        scene: &mut Scene,
        index: usize,
    ) -> Result<(), InteractionError> {
        if index >= MAX_DEVICES {
            return Err(InteractionError::IndexOutOfRange(index));
        }
        let Some(device) = self.devices[index].take() else {
            debug!("Device {} had no interaction state to remove", index);
            return Ok(());
        };

        if let Some(object) = device.selection.attached() {
            scene.attach(object, self.volume)?;
            info!(
                "Device {} disconnected while holding {}, returned it to the volume",
                index, object
            );
        }
        self.park_highlight(scene)?;
        scene.remove_subtree(device.controller)?;
        debug!("Device {} interaction nodes removed", index);
        Ok(())
    }

    /// Applies the device pose supplied by the host for this frame.
    pub fn set_pose(
        &self,
        scene: &mut Scene,
        index: usize,
        pose: Pose,
    ) -> Result<(), InteractionError> {
        let device = self.device(index)?;
        scene.set_translation(device.controller, pose.position)?;
        scene.set_rotation(device.controller, pose.orientation)?;
        Ok(())
    }

    /// Dispatches one input edge to the device's state machine.
    ///
    /// Edges are gated on the resolved layout: a device without a layout, or
    /// whose layout lacks the matching control class, ignores the edge. That
    /// keeps a profile-less device fully inert, as the degradation policy
    /// requires.
    pub fn dispatch(
        &mut self,
        scene: &mut Scene,
        index: usize,
        layout: Option<&ControlLayout>,
        edge: InputEdge,
    ) -> Result<(), InteractionError> {
        self.device(index)?;

        let class = match edge {
            InputEdge::SelectStart | InputEdge::SelectEnd => TRIGGER_CLASS,
            InputEdge::SqueezeStart | InputEdge::SqueezeEnd => SQUEEZE_CLASS,
        };
        let Some(layout) = layout else {
            debug!("Device {} has no layout yet, ignoring {:?}", index, edge);
            return Ok(());
        };
        if !layout.has_control_class(class) {
            debug!(
                "Device {} layout has no {} control, ignoring {:?}",
                index, class, edge
            );
            return Ok(());
        }

        match edge {
            InputEdge::SelectStart => self.on_select_start(scene, index),
            InputEdge::SelectEnd => self.on_select_end(scene, index),
            InputEdge::SqueezeStart => self.on_squeeze_start(scene, index),
            InputEdge::SqueezeEnd => self.on_squeeze_end(scene, index),
        }
    }

    /// Per-frame pass: every selecting device re-picks and updates its laser
    /// and the highlight proxy.
    pub fn tick_all(&mut self, scene: &mut Scene) -> Result<(), InteractionError> {
        for index in 0..MAX_DEVICES {
            let Some(mut device) = self.devices[index] else {
                continue;
            };
            if !device.selection.is_selecting() {
                continue;
            }

            let world = scene.world_transform(device.controller)?;
            let (origin, direction) = device_ray(&world);
            match pick_nearest(scene, self.volume, origin, direction)? {
                Some(hit) => {
                    device.selection = SelectionState::Selecting {
                        selected: Some(hit.object),
                    };
                    scene.set_parent(self.highlight, hit.object)?;
                    scene.set_translation(self.highlight, Vec3::ZERO)?;
                    scene.set_visible(self.highlight, true)?;
                    scene.set_scale(device.laser, Vec3::new(1.0, 1.0, hit.distance))?;
                }
                None => {
                    device.selection = SelectionState::Selecting { selected: None };
                    self.park_highlight(scene)?;
                    scene.set_scale(
                        device.laser,
                        Vec3::new(1.0, 1.0, self.settings.default_ray_length),
                    )?;
                }
            }
            self.devices[index] = Some(device);
        }
        Ok(())
    }

    pub fn selection(&self, index: usize) -> Result<SelectionState, InteractionError> {
        Ok(self.device(index)?.selection)
    }

    pub fn is_registered(&self, index: usize) -> bool {
        index < MAX_DEVICES && self.devices[index].is_some()
    }

    pub fn controller_node(&self, index: usize) -> Result<NodeId, InteractionError> {
        Ok(self.device(index)?.controller)
    }

    pub fn laser_node(&self, index: usize) -> Result<NodeId, InteractionError> {
        Ok(self.device(index)?.laser)
    }

    pub fn highlight_node(&self) -> NodeId {
        self.highlight
    }

    pub fn volume(&self) -> NodeId {
        self.volume
    }

    fn on_select_start(&mut self, scene: &mut Scene, index: usize) -> Result<(), InteractionError> {
        let mut device = self.device(index)?;
        device.select_held = true;
        if device.selection.is_idle() {
            device.selection = SelectionState::Selecting { selected: None };
            scene.set_scale(
                device.laser,
                Vec3::new(1.0, 1.0, self.settings.default_ray_length),
            )?;
            debug!("Device {} started selecting", index);
        }
        self.devices[index] = Some(device);
        Ok(())
    }

    fn on_select_end(&mut self, scene: &mut Scene, index: usize) -> Result<(), InteractionError> {
        let mut device = self.device(index)?;
        device.select_held = false;
        if device.selection.is_selecting() {
            device.selection = SelectionState::Idle;
            self.park_highlight(scene)?;
            scene.set_scale(device.laser, Vec3::new(1.0, 1.0, 0.0))?;
            debug!("Device {} stopped selecting", index);
        }
        self.devices[index] = Some(device);
        Ok(())
    }

    fn on_squeeze_start(
        &mut self,
        scene: &mut Scene,
        index: usize,
    ) -> Result<(), InteractionError> {
        let mut device = self.device(index)?;
        device.squeeze_held = true;

        if device.selection.is_attached() {
            debug!("Device {} squeezed while already holding an object", index);
            self.devices[index] = Some(device);
            return Ok(());
        }

        let in_volume = match device.selection.selected() {
            Some(selected) => scene.children(self.volume)?.contains(&selected),
            None => false,
        };
        match device.selection.selected() {
            Some(selected) if self.attached_elsewhere(index, selected) => {
                warn!(
                    "Device {} grab refused, {} is held by the other device",
                    index, selected
                );
                device.selection = SelectionState::Selecting { selected: None };
            }
            Some(selected) if !in_volume => {
                warn!(
                    "Device {} grab refused, {} left the volume since it was picked",
                    index, selected
                );
                device.selection = SelectionState::Selecting { selected: None };
            }
            Some(selected) => {
                // Park the proxy first so it does not travel with the grab.
                self.park_highlight(scene)?;
                scene.attach(selected, device.controller)?;
                scene.set_scale(device.laser, Vec3::new(1.0, 1.0, 0.0))?;
                device.selection = SelectionState::Attached { object: selected };
                info!("Device {} attached {}", index, selected);
            }
            None => {
                debug!("Device {} squeezed with nothing selected", index);
            }
        }
        self.devices[index] = Some(device);
        Ok(())
    }

    fn on_squeeze_end(&mut self, scene: &mut Scene, index: usize) -> Result<(), InteractionError> {
        let mut device = self.device(index)?;
        device.squeeze_held = false;

        if let Some(object) = device.selection.attached() {
            scene.attach(object, self.volume)?;
            info!("Device {} released {} back into the volume", index, object);

            // Selecting resumes when the select button is still down.
            if device.select_held {
                device.selection = SelectionState::Selecting { selected: None };
                scene.set_scale(
                    device.laser,
                    Vec3::new(1.0, 1.0, self.settings.default_ray_length),
                )?;
            } else {
                device.selection = SelectionState::Idle;
                scene.set_scale(device.laser, Vec3::new(1.0, 1.0, 0.0))?;
            }
        }
        self.devices[index] = Some(device);
        Ok(())
    }

    fn attached_elsewhere(&self, index: usize, object: NodeId) -> bool {
        self.devices
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .filter_map(|(_, device)| device.as_ref())
            .any(|device| device.selection.attached() == Some(object))
    }

    fn park_highlight(&self, scene: &mut Scene) -> Result<(), InteractionError> {
        scene.set_visible(self.highlight, false)?;
        scene.set_parent(self.highlight, scene.root())?;
        Ok(())
    }

    fn device(&self, index: usize) -> Result<DeviceInteraction, InteractionError> {
        self.devices
            .get(index)
            .copied()
            .ok_or(InteractionError::IndexOutOfRange(index))?
            .ok_or(InteractionError::UnknownDevice(index))
    }
}
