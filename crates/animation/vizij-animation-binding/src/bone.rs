//! Bone discovery beneath a controller node.

use crate::ids::{BoneId, NodeId};
use crate::scene::SceneGraph;

/// A bone component together with the node hosting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoneBinding {
    pub bone: BoneId,
    pub node: NodeId,
    pub name: String,
}

impl BoneBinding {
    /// Look up a live bone. `None` when the bone or its node is gone.
    pub fn resolve(scene: &dyn SceneGraph, bone: BoneId) -> Option<Self> {
        let node = scene.bone_node(bone)?;
        if !scene.contains(node) {
            return None;
        }
        let name = scene.bone_name(bone)?.to_string();
        Some(Self { bone, node, name })
    }
}

/// Collect bones in the sub-hierarchy of `root` (root included), depth first
/// in child order. Descendants that host their own controller are skipped
/// together with their subtree.
pub fn find_child_bones(scene: &dyn SceneGraph, root: NodeId) -> Vec<BoneBinding> {
    let mut out = Vec::new();
    if !scene.contains(root) {
        return out;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node != root && scene.hosts_controller(node) {
            continue;
        }
        if let Some(binding) = scene.bone(node).and_then(|b| BoneBinding::resolve(scene, b)) {
            out.push(binding);
        }
        stack.extend(scene.children(node).iter().rev().copied());
    }
    out
}
