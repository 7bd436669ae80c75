//! Scene component driving curve playback for a node and its bones.
//!
//! The controller buffers its configuration, owns the evaluator while active
//! or previewing, and keeps evaluator registrations in step with the clip and
//! the scene hierarchy. Every runtime operation degrades to a no-op when the
//! evaluator or a collaborator is missing.

use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use log::{debug, trace, warn};

use crate::bounds::Aabb;
use crate::clip::{Blend1DInfo, Blend2DInfo, ClipHandle, ClipState, WrapMode};
use crate::config::ControllerConfig;
use crate::evaluator::{CurveEvaluator, EvaluatorFactory};
use crate::events::{AnimationEventSink, EventRelay, EventSubscription};
use crate::hooks::FloatPropertyBridge;
use crate::ids::{BoneId, ControllerId, NodeId, RenderableId};
use crate::mapping::ClipMappingManager;
use crate::scene::SceneGraph;

/// Lifecycle state derived from evaluator presence and the preview flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Inactive,
    Active,
    Preview,
}

pub struct AnimationController {
    id: ControllerId,
    node: NodeId,
    factory: Box<dyn EvaluatorFactory>,
    evaluator: Option<Box<dyn CurveEvaluator>>,
    subscription: Option<EventSubscription>,
    config: ControllerConfig,
    preview: bool,
    default_clip: Option<ClipHandle>,
    /// Mirrors slot 0 of the evaluator as of the last reconciliation.
    primary_clip: Option<ClipHandle>,
    renderable: Option<RenderableId>,
    mappings: ClipMappingManager,
    relay: EventRelay,
    float_bridge: Option<Box<dyn FloatPropertyBridge>>,
}

impl AnimationController {
    pub fn new(node: NodeId, factory: impl EvaluatorFactory + 'static) -> Self {
        Self::with_config(node, factory, ControllerConfig::default())
    }

    pub fn with_config(
        node: NodeId,
        factory: impl EvaluatorFactory + 'static,
        config: ControllerConfig,
    ) -> Self {
        Self {
            id: ControllerId::new(),
            node,
            factory: Box::new(factory),
            evaluator: None,
            subscription: None,
            config,
            preview: false,
            default_clip: None,
            primary_clip: None,
            renderable: None,
            mappings: ClipMappingManager::new(),
            relay: EventRelay::new(),
            float_bridge: None,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        match (&self.evaluator, self.preview) {
            (None, _) => ControllerState::Inactive,
            (Some(_), true) => ControllerState::Preview,
            (Some(_), false) => ControllerState::Active,
        }
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn default_clip(&self) -> Option<&ClipHandle> {
        self.default_clip.as_ref()
    }

    pub fn primary_clip(&self) -> Option<&ClipHandle> {
        self.primary_clip.as_ref()
    }

    pub fn renderable(&self) -> Option<RenderableId> {
        self.renderable
    }

    pub fn mappings(&self) -> &ClipMappingManager {
        &self.mappings
    }

    /// Evaluator owned by the controller, if one exists.
    pub fn evaluator(&self) -> Option<&dyn CurveEvaluator> {
        self.evaluator.as_deref()
    }

    /// Evaluator that accepts playback commands: present and not previewing.
    fn live_evaluator(&mut self) -> Option<&mut (dyn CurveEvaluator + 'static)> {
        if self.preview {
            return None;
        }
        self.evaluator.as_deref_mut()
    }

    // ---- configuration ----

    pub fn set_default_clip(&mut self, clip: Option<ClipHandle>) {
        self.default_clip = clip.clone();
        let Some(clip) = clip.filter(ClipHandle::is_loaded) else {
            return;
        };
        if let Some(ev) = self.live_evaluator() {
            ev.play(&clip);
        }
    }

    pub fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.config.wrap_mode = mode;
        if let Some(ev) = self.live_evaluator() {
            ev.set_wrap_mode(mode);
        }
    }

    /// Non-finite speeds are ignored.
    pub fn set_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!("set_speed: ignoring non-finite speed {}", speed);
            return;
        }
        self.config.speed = speed;
        if let Some(ev) = self.live_evaluator() {
            ev.set_speed(speed);
        }
    }

    pub fn set_enable_cull(&mut self, enable: bool) {
        self.config.enable_cull = enable;
        if let Some(ev) = self.live_evaluator() {
            ev.set_culling(enable);
        }
    }

    // ---- playback ----

    pub fn play(&mut self, clip: &ClipHandle) {
        if let Some(ev) = self.live_evaluator() {
            ev.play(clip);
        }
    }

    pub fn blend_additive(&mut self, clip: &ClipHandle, weight: f32, fade_length: f32, layer: u32) {
        if let Some(ev) = self.live_evaluator() {
            ev.blend_additive(clip, weight, fade_length, layer);
        }
    }

    pub fn blend_1d(&mut self, info: &Blend1DInfo, t: f32) {
        if let Some(ev) = self.live_evaluator() {
            ev.blend_1d(info, t);
        }
    }

    pub fn blend_2d(&mut self, info: &Blend2DInfo, t: Vec2) {
        if let Some(ev) = self.live_evaluator() {
            ev.blend_2d(info, t);
        }
    }

    pub fn cross_fade(&mut self, clip: &ClipHandle, fade_length: f32) {
        if let Some(ev) = self.live_evaluator() {
            ev.cross_fade(clip, fade_length);
        }
    }

    /// Pose at an explicit time. Also honoured in preview.
    pub fn sample(&mut self, clip: &ClipHandle, time: f32) {
        if let Some(ev) = self.evaluator.as_mut() {
            ev.sample(clip, time);
        }
    }

    pub fn stop(&mut self, layer: u32) {
        if let Some(ev) = self.live_evaluator() {
            ev.stop(layer);
        }
    }

    pub fn stop_all(&mut self) {
        if let Some(ev) = self.live_evaluator() {
            ev.stop_all();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.evaluator.as_ref().is_some_and(|ev| ev.is_playing())
    }

    pub fn clip_state(&self, clip: &ClipHandle) -> Option<ClipState> {
        self.evaluator.as_ref()?.state(clip)
    }

    pub fn set_clip_state(&mut self, clip: &ClipHandle, state: ClipState) -> bool {
        match self.live_evaluator() {
            Some(ev) => ev.set_state(clip, state),
            None => false,
        }
    }

    pub fn num_clips(&self) -> usize {
        self.evaluator.as_ref().map_or(0, |ev| ev.num_clips())
    }

    pub fn clip(&self, index: usize) -> Option<ClipHandle> {
        self.evaluator.as_ref()?.clip(index)
    }

    pub fn generic_curve_value(&self, index: usize) -> Option<f32> {
        self.evaluator.as_ref()?.generic_curve_value(index)
    }

    pub fn map_curve_to_node(&mut self, curve: &str, node: Option<NodeId>) {
        if let Some(ev) = self.live_evaluator() {
            ev.map_curve_to_node(curve, node);
        }
    }

    pub fn unmap_node(&mut self, node: Option<NodeId>) {
        if let Some(ev) = self.live_evaluator() {
            ev.unmap_node(node);
        }
    }

    /// Forward a weight to the morph channel called `name` on the bound
    /// renderable's mesh. Unknown names are ignored.
    pub fn set_morph_channel_weight(&mut self, scene: &dyn SceneGraph, name: &str, weight: f32) {
        let Some(renderable) = self.renderable else {
            trace!("morph '{}': no renderable bound", name);
            return;
        };
        let Some(index) = scene
            .morph_channels(renderable)
            .and_then(|channels| channels.iter().position(|c| c == name))
        else {
            trace!("morph '{}': no such channel", name);
            return;
        };
        if let Some(ev) = self.live_evaluator() {
            ev.set_morph_channel_weight(index, weight);
        }
    }

    // ---- bounds ----

    pub fn set_bounds(&mut self, scene: &mut dyn SceneGraph, bounds: Aabb) {
        self.config.bounds = bounds;
        if !self.config.use_bounds {
            return;
        }
        if let Some(r) = self.renderable {
            scene.set_override_bounds(r, bounds);
        }
        let world = bounds.transform_affine(&scene.world_matrix(self.node));
        if let Some(ev) = self.live_evaluator() {
            ev.set_bounds(world);
        }
    }

    pub fn set_use_bounds(&mut self, scene: &mut dyn SceneGraph, enable: bool) {
        self.config.use_bounds = enable;
        self.update_bounds(scene, true);
    }

    /// Push culling bounds to the evaluator and, when `update_renderable` is
    /// set, the override state to the bound renderable.
    pub fn update_bounds(&mut self, scene: &mut dyn SceneGraph, update_renderable: bool) {
        let renderable = self.renderable.filter(|_| update_renderable);
        let bounds = if self.config.use_bounds {
            if let Some(r) = renderable {
                scene.set_use_override_bounds(r, true);
                scene.set_override_bounds(r, self.config.bounds);
            }
            self.config
                .bounds
                .transform_affine(&scene.world_matrix(self.node))
        } else {
            if let Some(r) = renderable {
                scene.set_use_override_bounds(r, false);
            }
            self.renderable
                .and_then(|r| scene.renderable_bounds(r))
                .unwrap_or_default()
        };
        if let Some(ev) = self.evaluator.as_mut() {
            ev.set_bounds(bounds);
        }
    }

    /// World transform of the controller node changed.
    pub fn on_transform_changed(&mut self, scene: &mut dyn SceneGraph) {
        if !scene.is_active(self.node) {
            return;
        }
        self.update_bounds(scene, false);
    }

    // ---- renderable association ----

    pub fn register_renderable(&mut self, scene: &mut dyn SceneGraph, renderable: RenderableId) {
        self.renderable = Some(renderable);
        self.update_bounds(scene, true);
    }

    pub fn unregister_renderable(&mut self) {
        self.renderable = None;
    }

    // ---- hooks ----

    pub fn add_event_sink(&mut self, sink: Rc<dyn AnimationEventSink>) {
        self.relay.add_sink(sink);
    }

    pub fn set_script_event_sink(&mut self, sink: Option<Rc<dyn AnimationEventSink>>) {
        self.relay.set_script_sink(sink);
    }

    pub fn set_float_property_bridge(&mut self, bridge: Option<Box<dyn FloatPropertyBridge>>) {
        self.float_bridge = bridge;
    }

    // ---- lifecycle ----

    pub fn on_enabled(&mut self, scene: &mut dyn SceneGraph) {
        if self.preview {
            self.teardown(scene);
            self.preview = false;
        }
        if scene.is_running() {
            self.restore(scene, false);
        }
    }

    pub fn on_disabled(&mut self, scene: &mut dyn SceneGraph) {
        self.teardown(scene);
    }

    pub fn on_destroyed(&mut self, scene: &mut dyn SceneGraph) {
        self.teardown(scene);
    }

    /// Enter or leave edit-time preview. Entering is refused while the scene
    /// runs. Returns whether preview is now enabled.
    pub fn toggle_preview(&mut self, scene: &mut dyn SceneGraph, enabled: bool) -> bool {
        if enabled {
            if scene.is_running() {
                warn!("preview requested while the scene is running; ignored");
                return false;
            }
            self.restore(scene, true);
            self.preview = true;
            return true;
        }
        if !scene.is_running() {
            self.teardown(scene);
        }
        self.preview = false;
        false
    }

    /// Build a fresh evaluator and bring every registration up to date.
    pub fn restore(&mut self, scene: &mut dyn SceneGraph, preview: bool) {
        if self.evaluator.is_some() {
            self.teardown(scene);
        }
        debug!("restoring controller {:?} (preview: {})", self.id.0, preview);

        let mut evaluator = self.factory.create();
        self.renderable = scene.renderable(self.node);

        if !preview {
            self.subscription = Some(EventSubscription::subscribe(evaluator.as_mut(), &self.relay));
            evaluator.set_wrap_mode(self.config.wrap_mode);
            evaluator.set_speed(self.config.speed);
            evaluator.set_culling(self.config.enable_cull);
        }
        self.evaluator = Some(evaluator);

        self.update_bounds(scene, true);

        if !preview {
            let Some(ev) = self.evaluator.as_mut() else {
                return;
            };
            if let Some(clip) = self.default_clip.as_ref().filter(|c| c.is_loaded()) {
                ev.play(clip);
            }
            self.primary_clip = ev.clip(0);
            let loaded = self.primary_clip.as_ref().filter(|c| c.is_loaded());
            if let (Some(bridge), Some(clip)) = (self.float_bridge.as_mut(), loaded) {
                bridge.rebuild(Some(clip));
            }
        }

        self.set_bone_mappings(scene);
        if !preview {
            self.update_scene_object_mapping(scene);
        }

        if let Some(r) = self.renderable {
            scene.register_animation(r, self.id);
        }
    }

    fn teardown(&mut self, scene: &mut dyn SceneGraph) {
        if let Some(r) = self.renderable {
            scene.unregister_animation(r);
        }
        if let Some(mut ev) = self.evaluator.take() {
            if let Some(sub) = self.subscription.take() {
                sub.cancel(ev.as_mut());
            }
            debug!("controller {:?} released its evaluator", self.id.0);
        }
        self.subscription = None;
        self.primary_clip = None;
        self.mappings.clear();
    }

    /// Per-frame tick. Reconciles scene-object mappings only when slot 0 holds
    /// a different clip than at the last reconciliation.
    pub fn update(&mut self, scene: &mut dyn SceneGraph, dt: f32) {
        if !scene.is_running() {
            return;
        }
        let Some(ev) = self.evaluator.as_mut() else {
            return;
        };
        ev.advance(dt);
        if ev.clip(0) != self.primary_clip {
            self.refresh_clip_mappings(scene);
        }
        if let (Some(bridge), Some(ev)) = (self.float_bridge.as_mut(), self.evaluator.as_deref()) {
            bridge.update(ev);
        }
    }

    fn refresh_clip_mappings(&mut self, scene: &dyn SceneGraph) {
        self.primary_clip = self.evaluator.as_ref().and_then(|ev| ev.clip(0));
        trace!(
            "primary clip is now {:?}",
            self.primary_clip.as_ref().map(ClipHandle::name)
        );
        if let Some(bridge) = self.float_bridge.as_mut() {
            bridge.rebuild(self.primary_clip.as_ref());
        }
        self.update_scene_object_mapping(scene);
    }

    fn set_bone_mappings(&mut self, scene: &mut dyn SceneGraph) {
        if let Some(ev) = self.evaluator.as_mut() {
            self.mappings
                .set_bone_mappings(scene, ev.as_mut(), self.node, self.id);
        }
    }

    fn update_scene_object_mapping(&mut self, scene: &dyn SceneGraph) {
        if let Some(ev) = self.evaluator.as_mut() {
            self.mappings.update_scene_object_mapping(
                scene,
                ev.as_mut(),
                self.node,
                self.primary_clip.as_ref(),
            );
        }
    }

    // ---- bone notifications ----

    /// A bone under this controller was attached.
    pub fn on_bone_added(&mut self, scene: &dyn SceneGraph, bone: BoneId) {
        if let Some(ev) = self.evaluator.as_mut() {
            self.mappings.add_bone(scene, ev.as_mut(), self.node, bone);
        }
    }

    /// A bone under this controller was detached or destroyed.
    pub fn on_bone_removed(&mut self, bone: BoneId) {
        if let Some(ev) = self.evaluator.as_mut() {
            self.mappings.remove_bone(ev.as_mut(), self.node, bone);
        }
    }

    /// A bone under this controller was renamed.
    pub fn on_bone_changed(&mut self, scene: &dyn SceneGraph, bone: BoneId) {
        if let Some(ev) = self.evaluator.as_mut() {
            self.mappings.notify_bone_changed(scene, ev.as_mut(), bone);
        }
    }
}

impl fmt::Debug for AnimationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationController")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("state", &self.state())
            .field("config", &self.config)
            .field("default_clip", &self.default_clip)
            .field("primary_clip", &self.primary_clip)
            .field("renderable", &self.renderable)
            .field("mappings", &self.mappings.entries().len())
            .field("relay", &self.relay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::AnimationClip;
    use crate::evaluator::PlaybackEvaluator;
    use crate::scene::MemoryScene;

    fn walk() -> ClipHandle {
        ClipHandle::loaded(AnimationClip {
            name: "walk".into(),
            length: 1.0,
            ..Default::default()
        })
    }

    fn setup(running: bool) -> (MemoryScene, AnimationController) {
        let mut scene = MemoryScene::new();
        scene.set_running(running);
        let node = scene.add_node("Character", None);
        scene.set_controller_host(node, true);
        (scene, AnimationController::new(node, PlaybackEvaluator::boxed))
    }

    #[test]
    fn setters_buffer_while_inactive() {
        let (_, mut c) = setup(true);
        c.set_speed(2.0);
        c.set_wrap_mode(WrapMode::Clamp);
        c.set_enable_cull(false);
        c.play(&walk());
        assert_eq!(c.state(), ControllerState::Inactive);
        assert_eq!(c.config().speed, 2.0);
        assert_eq!(c.num_clips(), 0);
        assert!(!c.is_playing());
    }

    #[test]
    fn non_finite_speed_is_ignored() {
        let (mut scene, mut c) = setup(true);
        c.set_speed(2.0);
        c.on_enabled(&mut scene);
        c.set_speed(f32::NAN);
        c.set_speed(f32::INFINITY);
        assert_eq!(c.config().speed, 2.0);

        let clip = walk();
        c.play(&clip);
        c.update(&mut scene, 0.25);
        let time = c.clip_state(&clip).unwrap().time;
        assert!((time - 0.5).abs() < 1e-5, "time={time}");
    }

    #[test]
    fn enable_while_running_plays_default_clip() {
        let (mut scene, mut c) = setup(true);
        let clip = walk();
        c.set_default_clip(Some(clip.clone()));
        c.on_enabled(&mut scene);
        assert_eq!(c.state(), ControllerState::Active);
        assert_eq!(c.primary_clip(), Some(&clip));
        assert!(c.is_playing());
    }

    #[test]
    fn enable_while_stopped_stays_inactive() {
        let (mut scene, mut c) = setup(false);
        c.on_enabled(&mut scene);
        assert_eq!(c.state(), ControllerState::Inactive);
    }

    #[test]
    fn disable_releases_evaluator() {
        let (mut scene, mut c) = setup(true);
        c.on_enabled(&mut scene);
        c.on_disabled(&mut scene);
        assert_eq!(c.state(), ControllerState::Inactive);
        assert!(c.mappings().is_empty());
        assert!(c.primary_clip().is_none());
    }

    #[test]
    fn unloaded_default_clip_is_not_played() {
        let (mut scene, mut c) = setup(true);
        c.set_default_clip(Some(ClipHandle::pending("later")));
        c.on_enabled(&mut scene);
        assert_eq!(c.num_clips(), 0);
    }
}
