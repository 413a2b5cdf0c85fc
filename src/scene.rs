//! Minimal transform hierarchy for interaction bookkeeping.
//!
//! This is not a renderer. The interaction manager only needs world transforms,
//! parent/child ownership, and two reparenting primitives:
//!
//! 1. [`Scene::attach`] - change parent, preserve world pose (used for grabbing)
//! 2. [`Scene::set_parent`] - change parent, keep local transform (used for the
//!    highlight proxy, which should snap onto its new parent)
//!
//! Nodes carry a bounding radius so the ray picker can treat every member of an
//! interaction volume as a sphere.

use glam::{Affine3A, Quat, Vec3};
use thiserror::Error;

/// Stable identifier of a scene node. Ids are never reused within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown scene node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} cannot be reparented into its own subtree")]
    WouldCycle(NodeId),

    #[error("the scene root cannot be reparented or removed")]
    RootIsFixed,
}

/// One node of the hierarchy: a local TRS transform plus picking metadata.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    bounding_radius: f32,
    visible: bool,
}

impl Node {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            bounding_radius: 0.0,
            visible: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Local transform assembled from the node's TRS components.
    pub fn local_transform(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A scene: slab of nodes under a fixed root.
#[derive(Debug)]
pub struct Scene {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Scene {
    pub fn new() -> Self {
        let root = Node::new("root", None);
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str) -> Result<NodeId, SceneError> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(name, Some(parent))));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(SceneError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(SceneError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], SceneError> {
        Ok(&self.node(id)?.children)
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) -> Result<(), SceneError> {
        self.node_mut(id)?.translation = translation;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), SceneError> {
        self.node_mut(id)?.rotation = rotation;
        Ok(())
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), SceneError> {
        self.node_mut(id)?.scale = scale;
        Ok(())
    }

    pub fn set_bounding_radius(&mut self, id: NodeId, radius: f32) -> Result<(), SceneError> {
        self.node_mut(id)?.bounding_radius = radius;
        Ok(())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    /// World transform: product of local transforms from the root down to `id`.
    pub fn world_transform(&self, id: NodeId) -> Result<Affine3A, SceneError> {
        let node = self.node(id)?;
        let local = node.local_transform();
        match node.parent {
            Some(parent) => Ok(self.world_transform(parent)? * local),
            None => Ok(local),
        }
    }

    /// True if `ancestor` appears on the parent chain of `id` (or equals it).
    pub fn is_in_subtree(&self, id: NodeId, ancestor: NodeId) -> Result<bool, SceneError> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return Ok(true);
            }
            cursor = self.node(current)?.parent;
        }
        Ok(false)
    }

    /// Reparents `id` under `new_parent`, preserving the node's world pose.
    ///
    /// The new local transform is `inverse(new_parent.world) * id.world`, so the
    /// node does not move in world space.
    pub fn attach(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        let world = self.world_transform(id)?;
        let parent_world = self.world_transform(new_parent)?;
        self.relink(id, new_parent)?;

        let local = parent_world.inverse() * world;
        let (scale, rotation, translation) = local.to_scale_rotation_translation();
        let node = self.node_mut(id)?;
        node.scale = scale;
        node.rotation = rotation;
        node.translation = translation;
        Ok(())
    }

    /// Reparents `id` under `new_parent`, keeping the local transform as is.
    /// The node jumps into the new parent's coordinate space.
    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        self.relink(id, new_parent)
    }

    /// Removes `id` and its whole subtree from the scene.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootIsFixed);
        }
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|&child| child != id);
        }
        self.drop_recursive(id);
        Ok(())
    }

    fn drop_recursive(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id.0 as usize).and_then(|slot| slot.take()) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.drop_recursive(child);
        }
    }

    fn relink(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootIsFixed);
        }
        self.node(new_parent)?;
        if self.is_in_subtree(new_parent, id)? {
            return Err(SceneError::WouldCycle(id));
        }
        if let Some(old_parent) = self.node(id)?.parent {
            self.node_mut(old_parent)?.children.retain(|&child| child != id);
        }
        self.node_mut(id)?.parent = Some(new_parent);
        self.node_mut(new_parent)?.children.push(id);
        Ok(())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_affine_eq(a: Affine3A, b: Affine3A) {
        let (sa, ra, ta) = a.to_scale_rotation_translation();
        let (sb, rb, tb) = b.to_scale_rotation_translation();
        assert!(sa.distance(sb) < 1e-4, "scale {sa} vs {sb}");
        assert!(ta.distance(tb) < 1e-4, "translation {ta} vs {tb}");
        assert!(ra.dot(rb).abs() > 1.0 - 1e-4, "rotation {ra} vs {rb}");
    }

    #[test]
    fn world_transform_composes_down_the_chain() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root(), "a").unwrap();
        let b = scene.add_node(a, "b").unwrap();
        scene.set_translation(a, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        scene.set_translation(b, Vec3::new(0.0, 2.0, 0.0)).unwrap();

        let (_, _, world) = scene
            .world_transform(b)
            .unwrap()
            .to_scale_rotation_translation();
        assert!(world.distance(Vec3::new(1.0, 2.0, 0.0)) < 1e-6);
    }

    #[test]
    fn attach_preserves_world_pose() {
        let mut scene = Scene::new();
        let holder = scene.add_node(scene.root(), "holder").unwrap();
        let object = scene.add_node(scene.root(), "object").unwrap();
        scene
            .set_translation(holder, Vec3::new(0.5, 1.6, -0.3))
            .unwrap();
        scene
            .set_rotation(holder, Quat::from_rotation_y(0.7))
            .unwrap();
        scene
            .set_translation(object, Vec3::new(0.0, 1.0, -2.0))
            .unwrap();
        scene
            .set_rotation(object, Quat::from_rotation_x(0.3))
            .unwrap();

        let before = scene.world_transform(object).unwrap();
        scene.attach(object, holder).unwrap();
        assert_eq!(scene.node(object).unwrap().parent(), Some(holder));
        assert_affine_eq(before, scene.world_transform(object).unwrap());

        // Round trip back to the root keeps the pose as well.
        scene.attach(object, scene.root()).unwrap();
        assert_affine_eq(before, scene.world_transform(object).unwrap());
    }

    #[test]
    fn set_parent_keeps_local_transform() {
        let mut scene = Scene::new();
        let holder = scene.add_node(scene.root(), "holder").unwrap();
        let marker = scene.add_node(scene.root(), "marker").unwrap();
        scene
            .set_translation(holder, Vec3::new(3.0, 0.0, 0.0))
            .unwrap();

        scene.set_parent(marker, holder).unwrap();
        assert_eq!(scene.node(marker).unwrap().translation(), Vec3::ZERO);
        let (_, _, world) = scene
            .world_transform(marker)
            .unwrap()
            .to_scale_rotation_translation();
        assert!(world.distance(Vec3::new(3.0, 0.0, 0.0)) < 1e-6);
    }

    #[test]
    fn reparenting_into_own_subtree_is_rejected() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root(), "a").unwrap();
        let b = scene.add_node(a, "b").unwrap();
        assert!(matches!(
            scene.attach(a, b),
            Err(SceneError::WouldCycle(_))
        ));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let mut scene = Scene::new();
        let a = scene.add_node(scene.root(), "a").unwrap();
        let b = scene.add_node(a, "b").unwrap();
        scene.remove_subtree(a).unwrap();
        assert!(!scene.contains(a));
        assert!(!scene.contains(b));
        assert!(scene.children(scene.root()).unwrap().is_empty());
    }
}
