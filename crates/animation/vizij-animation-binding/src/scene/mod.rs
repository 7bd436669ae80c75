//! Scene-graph service consumed by the controller.
//!
//! The controller never owns scene state. Hosts implement [`SceneGraph`] over
//! their own hierarchy and pass it into every controller call that needs it.
//! [`MemoryScene`] is a self-contained implementation used by tools and tests.

mod memory;

pub use memory::{MemoryScene, NodeDesc, RenderableDesc, SceneDesc};

use glam::Affine3A;

use crate::bounds::Aabb;
use crate::ids::{BoneId, ControllerId, NodeId, RenderableId};

pub trait SceneGraph {
    /// True while the engine runs gameplay (as opposed to edit-time).
    fn is_running(&self) -> bool;

    fn contains(&self, node: NodeId) -> bool;
    fn node_name(&self, node: NodeId) -> Option<&str>;
    fn children(&self, node: NodeId) -> &[NodeId];
    fn world_matrix(&self, node: NodeId) -> Affine3A;
    /// Active in hierarchy: the node and all of its ancestors are active.
    fn is_active(&self, node: NodeId) -> bool;

    /// Whether `node` hosts an animation controller component.
    fn hosts_controller(&self, node: NodeId) -> bool;

    // Bone collaborator.
    fn bone(&self, node: NodeId) -> Option<BoneId>;
    fn bone_name(&self, bone: BoneId) -> Option<&str>;
    fn bone_node(&self, bone: BoneId) -> Option<NodeId>;
    fn set_bone_owner(&mut self, bone: BoneId, owner: Option<ControllerId>);

    // Renderable collaborator.
    fn renderable(&self, node: NodeId) -> Option<RenderableId>;
    /// World-space bounds computed by the renderable itself.
    fn renderable_bounds(&self, renderable: RenderableId) -> Option<Aabb>;
    fn set_use_override_bounds(&mut self, renderable: RenderableId, enable: bool);
    fn set_override_bounds(&mut self, renderable: RenderableId, bounds: Aabb);
    /// Morph channel names of the renderable's mesh. `None` when the
    /// renderable is gone, has no loaded mesh, or the mesh has no morph shapes.
    fn morph_channels(&self, renderable: RenderableId) -> Option<&[String]>;
    fn register_animation(&mut self, renderable: RenderableId, controller: ControllerId);
    fn unregister_animation(&mut self, renderable: RenderableId);

    /// Resolve a slash-separated path of child names starting at `root`.
    /// Empty segments are ignored, so an empty path resolves to `root`.
    fn find_path(&self, root: NodeId, path: &str) -> Option<NodeId> {
        if !self.contains(root) {
            return None;
        }
        let mut current = root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self
                .children(current)
                .iter()
                .copied()
                .find(|c| self.node_name(*c) == Some(part))?;
        }
        Some(current)
    }
}
