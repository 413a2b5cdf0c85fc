//! Ray picker
//!
//! Builds a pointing ray from a device's world transform and tests it against
//! every direct member of the interaction volume. The scan is flat and O(n);
//! volumes in the target scenes hold a couple hundred objects at most, so no
//! acceleration structure is kept.
//!
//! Members are treated as bounding spheres. A member is hit when the ray
//! passes within its scaled bounding radius in front of the origin; the hit
//! distance is the along-ray distance of closest approach to the member's
//! center, which keeps reported distances independent of collider size.

use glam::{Affine3A, Vec3};

use crate::scene::{NodeId, Scene, SceneError};

/// Nearest intersection of a device ray with the interaction volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub object: NodeId,
    pub distance: f32,
}

/// Pointing ray of a device: world position, and the device's local -Z axis
/// rotated into world space with translation and scale stripped.
pub fn device_ray(world: &Affine3A) -> (Vec3, Vec3) {
    let (_, rotation, translation) = world.to_scale_rotation_translation();
    (translation, rotation * Vec3::NEG_Z)
}

/// Casts a ray against the volume's direct members, nearest hit wins.
///
/// An empty volume yields `None`. Members behind the ray origin are ignored.
pub fn pick_nearest(
    scene: &Scene,
    volume: NodeId,
    origin: Vec3,
    direction: Vec3,
) -> Result<Option<RayHit>, SceneError> {
    let mut nearest: Option<RayHit> = None;
    for &member in scene.children(volume)? {
        let (scale, _, center) = scene
            .world_transform(member)?
            .to_scale_rotation_translation();
        let radius = scene.node(member)?.bounding_radius() * scale.max_element();
        if radius <= 0.0 {
            continue;
        }

        let along = (center - origin).dot(direction);
        if along <= 0.0 {
            continue;
        }
        let closest_point = origin + direction * along;
        if closest_point.distance(center) > radius {
            continue;
        }
        if nearest.map_or(true, |hit| along < hit.distance) {
            nearest = Some(RayHit {
                object: member,
                distance: along,
            });
        }
    }
    Ok(nearest)
}
