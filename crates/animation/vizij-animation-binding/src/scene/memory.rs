use glam::{Affine3A, Quat, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::SceneGraph;
use crate::bounds::Aabb;
use crate::error::{BindingError, Result};
use crate::ids::{BoneId, ControllerId, NodeId, RenderableId};

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Affine3A,
    active: bool,
    controller: bool,
    bone: Option<BoneId>,
    renderable: Option<RenderableId>,
}

#[derive(Debug, Clone)]
struct BoneData {
    name: String,
    node: NodeId,
    owner: Option<ControllerId>,
}

#[derive(Debug, Clone)]
struct RenderableData {
    node: NodeId,
    /// Bounds in the node's local space; reported in world space.
    local_bounds: Aabb,
    morph_channels: Option<Vec<String>>,
    use_override_bounds: bool,
    override_bounds: Aabb,
    animation: Option<ControllerId>,
}

/// In-memory scene hierarchy with bone and renderable components.
#[derive(Debug, Default)]
pub struct MemoryScene {
    running: bool,
    nodes: SlotMap<NodeId, NodeData>,
    bones: SlotMap<BoneId, BoneData>,
    renderables: SlotMap<RenderableId, RenderableData>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn add_node(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.insert(NodeData {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            local: Affine3A::IDENTITY,
            active: true,
            controller: false,
            bone: None,
            renderable: None,
        });
        if let Some(p) = parent {
            self.attach(id, p);
        }
        id
    }

    /// Reparent `child` under `parent`, detaching it from its previous parent.
    /// Refuses moves that would place a node under itself or a descendant.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> bool {
        if !self.nodes.contains_key(parent) {
            return false;
        }
        let old = match self.nodes.get(child) {
            Some(n) => n.parent,
            None => return false,
        };
        let mut cursor = Some(parent);
        while let Some(n) = cursor {
            if n == child {
                debug!("attach: {:?} would become its own ancestor", child);
                return false;
            }
            cursor = self.nodes.get(n).and_then(|d| d.parent);
        }
        if let Some(old) = old.and_then(|o| self.nodes.get_mut(o)) {
            old.children.retain(|c| *c != child);
        }
        if let Some(n) = self.nodes.get_mut(child) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        true
    }

    pub fn rename_node(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.name = name.to_string();
        }
    }

    pub fn set_local_transform(&mut self, node: NodeId, local: Affine3A) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.local = local;
        }
    }

    pub fn set_active(&mut self, node: NodeId, active: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.active = active;
        }
    }

    /// Mark `node` as hosting an animation controller component.
    pub fn set_controller_host(&mut self, node: NodeId, hosts: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.controller = hosts;
        }
    }

    /// Attach a bone component to `node`, replacing any existing one.
    pub fn add_bone(&mut self, node: NodeId, name: &str) -> Option<BoneId> {
        if !self.nodes.contains_key(node) {
            return None;
        }
        if let Some(old) = self.nodes[node].bone.take() {
            self.bones.remove(old);
        }
        let bone = self.bones.insert(BoneData {
            name: name.to_string(),
            node,
            owner: None,
        });
        self.nodes[node].bone = Some(bone);
        Some(bone)
    }

    pub fn remove_bone(&mut self, bone: BoneId) -> bool {
        match self.bones.remove(bone) {
            Some(data) => {
                if let Some(n) = self.nodes.get_mut(data.node) {
                    n.bone = None;
                }
                true
            }
            None => false,
        }
    }

    pub fn rename_bone(&mut self, bone: BoneId, name: &str) {
        if let Some(b) = self.bones.get_mut(bone) {
            b.name = name.to_string();
        }
    }

    pub fn bone_owner(&self, bone: BoneId) -> Option<ControllerId> {
        self.bones.get(bone).and_then(|b| b.owner)
    }

    pub fn add_renderable(
        &mut self,
        node: NodeId,
        local_bounds: Aabb,
        morph_channels: Option<Vec<String>>,
    ) -> Option<RenderableId> {
        if !self.nodes.contains_key(node) {
            return None;
        }
        if let Some(old) = self.nodes[node].renderable.take() {
            self.renderables.remove(old);
        }
        let r = self.renderables.insert(RenderableData {
            node,
            local_bounds,
            morph_channels,
            use_override_bounds: false,
            override_bounds: Aabb::EMPTY,
            animation: None,
        });
        self.nodes[node].renderable = Some(r);
        Some(r)
    }

    pub fn remove_renderable(&mut self, renderable: RenderableId) -> bool {
        match self.renderables.remove(renderable) {
            Some(data) => {
                if let Some(n) = self.nodes.get_mut(data.node) {
                    n.renderable = None;
                }
                true
            }
            None => false,
        }
    }

    /// Override state of a renderable: `(use_override, override_box)`.
    pub fn renderable_override(&self, renderable: RenderableId) -> Option<(bool, Aabb)> {
        self.renderables
            .get(renderable)
            .map(|r| (r.use_override_bounds, r.override_bounds))
    }

    pub fn renderable_animation(&self, renderable: RenderableId) -> Option<ControllerId> {
        self.renderables.get(renderable).and_then(|r| r.animation)
    }

    /// Build a scene from a description. Returned ids follow description order.
    pub fn from_desc(desc: &SceneDesc) -> Result<(Self, Vec<NodeId>)> {
        let mut scene = MemoryScene::new();
        scene.running = desc.running;
        let mut ids: Vec<NodeId> = Vec::with_capacity(desc.nodes.len());
        for (index, nd) in desc.nodes.iter().enumerate() {
            let parent = match nd.parent {
                Some(p) if p >= desc.nodes.len() => {
                    return Err(BindingError::UnknownParent { index, parent: p })
                }
                Some(p) if p >= index => return Err(BindingError::ParentOrder { index }),
                Some(p) => Some(ids[p]),
                None => None,
            };
            let id = scene.add_node(&nd.name, parent);
            scene.set_local_transform(
                id,
                Affine3A::from_scale_rotation_translation(nd.scale, nd.rotation, nd.translation),
            );
            scene.set_active(id, nd.active);
            scene.set_controller_host(id, nd.controller);
            if let Some(bone) = &nd.bone {
                scene.add_bone(id, bone);
            }
            if let Some(r) = &nd.renderable {
                scene.add_renderable(id, r.bounds, r.morph_channels.clone());
            }
            ids.push(id);
        }
        Ok((scene, ids))
    }
}

impl SceneGraph for MemoryScene {
    fn is_running(&self) -> bool {
        self.running
    }

    fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn world_matrix(&self, node: NodeId) -> Affine3A {
        let mut m = Affine3A::IDENTITY;
        let mut cur = Some(node);
        while let Some(id) = cur {
            match self.nodes.get(id) {
                Some(n) => {
                    m = n.local * m;
                    cur = n.parent;
                }
                None => break,
            }
        }
        m
    }

    fn is_active(&self, node: NodeId) -> bool {
        let mut cur = Some(node);
        let mut seen = false;
        while let Some(id) = cur {
            match self.nodes.get(id) {
                Some(n) if n.active => {
                    seen = true;
                    cur = n.parent;
                }
                _ => return false,
            }
        }
        seen
    }

    fn hosts_controller(&self, node: NodeId) -> bool {
        self.nodes.get(node).map(|n| n.controller).unwrap_or(false)
    }

    fn bone(&self, node: NodeId) -> Option<BoneId> {
        self.nodes.get(node).and_then(|n| n.bone)
    }

    fn bone_name(&self, bone: BoneId) -> Option<&str> {
        self.bones.get(bone).map(|b| b.name.as_str())
    }

    fn bone_node(&self, bone: BoneId) -> Option<NodeId> {
        self.bones.get(bone).map(|b| b.node)
    }

    fn set_bone_owner(&mut self, bone: BoneId, owner: Option<ControllerId>) {
        if let Some(b) = self.bones.get_mut(bone) {
            b.owner = owner;
        }
    }

    fn renderable(&self, node: NodeId) -> Option<RenderableId> {
        self.nodes.get(node).and_then(|n| n.renderable)
    }

    fn renderable_bounds(&self, renderable: RenderableId) -> Option<Aabb> {
        let r = self.renderables.get(renderable)?;
        Some(r.local_bounds.transform_affine(&self.world_matrix(r.node)))
    }

    fn set_use_override_bounds(&mut self, renderable: RenderableId, enable: bool) {
        if let Some(r) = self.renderables.get_mut(renderable) {
            r.use_override_bounds = enable;
        }
    }

    fn set_override_bounds(&mut self, renderable: RenderableId, bounds: Aabb) {
        if let Some(r) = self.renderables.get_mut(renderable) {
            r.override_bounds = bounds;
        }
    }

    fn morph_channels(&self, renderable: RenderableId) -> Option<&[String]> {
        self.renderables
            .get(renderable)
            .and_then(|r| r.morph_channels.as_deref())
    }

    fn register_animation(&mut self, renderable: RenderableId, controller: ControllerId) {
        if let Some(r) = self.renderables.get_mut(renderable) {
            r.animation = Some(controller);
        }
    }

    fn unregister_animation(&mut self, renderable: RenderableId) {
        if let Some(r) = self.renderables.get_mut(renderable) {
            r.animation = None;
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}

/// Serializable scene description. Parents must precede their children.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneDesc {
    #[serde(default)]
    pub running: bool,
    pub nodes: Vec<NodeDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default = "default_rotation")]
    pub rotation: Quat,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub controller: bool,
    /// Name of the bone component hosted by this node, if any.
    #[serde(default)]
    pub bone: Option<String>,
    #[serde(default)]
    pub renderable: Option<RenderableDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderableDesc {
    pub bounds: Aabb,
    #[serde(default)]
    pub morph_channels: Option<Vec<String>>,
}
