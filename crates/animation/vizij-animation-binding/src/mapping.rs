//! Reconciliation of clip curve names against the scene hierarchy.
//!
//! The manager keeps an ordered table of node registrations and mirrors every
//! change onto the evaluator, so each entry corresponds to exactly one live
//! `map_curve_to_node` registration. Root and bone entries are structural and
//! survive clip changes; scene-object entries are rebuilt whenever the primary
//! clip changes.

use log::{debug, trace};

use crate::bone::{find_child_bones, BoneBinding};
use crate::clip::ClipHandle;
use crate::evaluator::CurveEvaluator;
use crate::ids::{BoneId, ControllerId, NodeId};
use crate::scene::SceneGraph;

/// Curve name reserved for the controller's own node (root motion).
pub const ROOT_CURVE: &str = "";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MappingKind {
    /// The controller's own node under [`ROOT_CURVE`].
    Root,
    Bone(BoneId),
    /// Node resolved from a curve path of the primary clip.
    SceneObject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    /// `None` for curve paths that did not resolve to a node.
    pub node: Option<NodeId>,
    pub curve: String,
    pub kind: MappingKind,
}

impl MappingEntry {
    /// Root and bone entries; these are kept across clip changes.
    pub fn is_bone_mapping(&self) -> bool {
        !matches!(self.kind, MappingKind::SceneObject)
    }

    pub fn bone(&self) -> Option<BoneId> {
        match self.kind {
            MappingKind::Bone(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClipMappingManager {
    entries: Vec<MappingEntry>,
}

impl ClipMappingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bone_entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| e.bone().is_some())
    }

    pub fn scene_object_entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| !e.is_bone_mapping())
    }

    pub fn contains_node(&self, node: Option<NodeId>) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    /// Forget every entry without touching an evaluator. Used when the
    /// evaluator holding the registrations is dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn register(&mut self, evaluator: &mut dyn CurveEvaluator, entry: MappingEntry) {
        trace!("map curve '{}' -> {:?} ({:?})", entry.curve, entry.node, entry.kind);
        evaluator.map_curve_to_node(&entry.curve, entry.node);
        self.entries.push(entry);
    }

    /// Rebuild the table from scratch: the root entry followed by every bone in
    /// the sub-hierarchy of `root`. Found bones are claimed by `owner`; a bone
    /// on `root` itself stands in for the root entry.
    pub fn set_bone_mappings(
        &mut self,
        scene: &mut dyn SceneGraph,
        evaluator: &mut dyn CurveEvaluator,
        root: NodeId,
        owner: ControllerId,
    ) {
        for entry in self.entries.drain(..) {
            evaluator.unmap_node(entry.node);
        }

        let bones = find_child_bones(scene, root);
        // A bone on the controller node takes over the root record.
        if !bones.iter().any(|b| b.node == root) {
            self.register(evaluator, Self::root_entry(root));
        }

        for binding in bones {
            scene.set_bone_owner(binding.bone, Some(owner));
            self.register(
                evaluator,
                MappingEntry {
                    node: Some(binding.node),
                    curve: binding.name,
                    kind: MappingKind::Bone(binding.bone),
                },
            );
        }
    }

    fn root_entry(root: NodeId) -> MappingEntry {
        MappingEntry {
            node: Some(root),
            curve: ROOT_CURVE.to_string(),
            kind: MappingKind::Root,
        }
    }

    /// Drop scene-object entries and derive new ones from the transform curves
    /// of `primary`. Unresolved paths are registered with a `None` node.
    pub fn update_scene_object_mapping(
        &mut self,
        scene: &dyn SceneGraph,
        evaluator: &mut dyn CurveEvaluator,
        root: NodeId,
        primary: Option<&ClipHandle>,
    ) {
        let (kept, stale): (Vec<MappingEntry>, Vec<MappingEntry>) = self
            .entries
            .drain(..)
            .partition(MappingEntry::is_bone_mapping);
        for entry in &stale {
            evaluator.unmap_node(entry.node);
        }
        self.entries = kept;

        let Some(clip) = primary.and_then(ClipHandle::get) else {
            return;
        };

        for curve in clip.curves.transform_curves() {
            if curve.flags.imported {
                continue;
            }
            let covered = self
                .entries
                .iter()
                .any(|e| e.is_bone_mapping() && e.curve == curve.name);
            if covered {
                continue;
            }
            let node = scene.find_path(root, &curve.name);
            if node.is_none() {
                trace!("curve '{}' does not resolve under the controller node", curve.name);
            }
            if self.contains_node(node) {
                continue;
            }
            self.register(
                evaluator,
                MappingEntry {
                    node,
                    curve: curve.name.clone(),
                    kind: MappingKind::SceneObject,
                },
            );
        }
    }

    /// Register a bone that joined the hierarchy after the table was built.
    pub fn add_bone(
        &mut self,
        scene: &dyn SceneGraph,
        evaluator: &mut dyn CurveEvaluator,
        root: NodeId,
        bone: BoneId,
    ) {
        if self.bone_entries().any(|e| e.bone() == Some(bone)) {
            self.notify_bone_changed(scene, evaluator, bone);
            return;
        }
        let Some(binding) = BoneBinding::resolve(scene, bone) else {
            debug!("add_bone: {:?} is not a live bone", bone);
            return;
        };
        if binding.node == root {
            debug!("add_bone: '{}' takes over the controller node", binding.name);
        }

        let entry = MappingEntry {
            node: Some(binding.node),
            curve: binding.name,
            kind: MappingKind::Bone(bone),
        };
        match self.entries.iter().position(|e| e.node == entry.node) {
            Some(pos) if self.entries[pos].bone().is_some() => {
                debug!("add_bone: node of '{}' is already mapped", entry.curve);
            }
            // Root and scene-object records yield their node to the bone,
            // keeping the root slot at the front of the table.
            Some(pos) => {
                evaluator.unmap_node(self.entries[pos].node);
                trace!("map curve '{}' -> {:?} ({:?})", entry.curve, entry.node, entry.kind);
                evaluator.map_curve_to_node(&entry.curve, entry.node);
                self.entries[pos] = entry;
            }
            None => self.register(evaluator, entry),
        }
    }

    /// Remove every entry for `bone` and its registration. A bone leaving the
    /// controller node hands that node back to the root record.
    pub fn remove_bone(&mut self, evaluator: &mut dyn CurveEvaluator, root: NodeId, bone: BoneId) {
        let (removed, kept): (Vec<MappingEntry>, Vec<MappingEntry>) = self
            .entries
            .drain(..)
            .partition(|e| e.bone() == Some(bone));
        self.entries = kept;
        for entry in &removed {
            evaluator.unmap_node(entry.node);
            if entry.node == Some(root) && !self.contains_node(Some(root)) {
                let root_entry = Self::root_entry(root);
                evaluator.map_curve_to_node(&root_entry.curve, root_entry.node);
                self.entries.insert(0, root_entry);
            }
        }
    }

    /// Re-register the entries of `bone` under its current name.
    pub fn notify_bone_changed(
        &mut self,
        scene: &dyn SceneGraph,
        evaluator: &mut dyn CurveEvaluator,
        bone: BoneId,
    ) {
        let Some(name) = scene.bone_name(bone) else {
            debug!("notify_bone_changed: {:?} is not a live bone", bone);
            return;
        };
        for entry in self.entries.iter_mut().filter(|e| e.bone() == Some(bone)) {
            evaluator.unmap_node(entry.node);
            evaluator.map_curve_to_node(name, entry.node);
            entry.curve = name.to_string();
        }
    }
}
