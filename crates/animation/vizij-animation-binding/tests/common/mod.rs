#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use glam::Vec2;
use vizij_animation_binding::{
    Aabb, AnimationClip, AnimationController, Blend1DInfo, Blend2DInfo, ClipHandle, ClipState,
    CurveEvaluator, EventCallback, MemoryScene, NodeId, PlaybackEvaluator, SceneDesc,
    SubscriptionId, WrapMode,
};

/// Evaluator-side call observed by [`RecordingEvaluator`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Play(String),
    BlendAdditive(String, u32),
    Blend1D(f32),
    Blend2D(Vec2),
    CrossFade(String),
    Sample(String, f32),
    Stop(u32),
    StopAll,
    SetWrapMode(WrapMode),
    SetSpeed(f32),
    SetCulling(bool),
    SetBounds(Aabb),
    SetState(String),
    MapCurve(String, Option<NodeId>),
    UnmapNode(Option<NodeId>),
    SetMorph(usize, f32),
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
    /// Evaluators created so far.
    pub created: usize,
    /// Live curve registrations of the most recent evaluator.
    pub live_mappings: usize,
    pub subscribers: usize,
}

impl Recorder {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn last_bounds(&self) -> Option<Aabb> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::SetBounds(b) => Some(*b),
            _ => None,
        })
    }

    pub fn map_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::MapCurve(..)))
    }
}

pub type SharedRecorder = Rc<RefCell<Recorder>>;

/// Reference evaluator that logs every call into a shared [`Recorder`].
pub struct RecordingEvaluator {
    inner: PlaybackEvaluator,
    rec: SharedRecorder,
}

impl RecordingEvaluator {
    fn log(&self, call: Call) {
        self.rec.borrow_mut().calls.push(call);
    }

    fn sync(&self) {
        let mut rec = self.rec.borrow_mut();
        rec.live_mappings = self.inner.mapping_count();
        rec.subscribers = self.inner.subscriber_count();
    }
}

impl CurveEvaluator for RecordingEvaluator {
    fn play(&mut self, clip: &ClipHandle) {
        self.log(Call::Play(clip.name().to_string()));
        self.inner.play(clip);
    }

    fn blend_additive(&mut self, clip: &ClipHandle, weight: f32, fade_length: f32, layer: u32) {
        self.log(Call::BlendAdditive(clip.name().to_string(), layer));
        self.inner.blend_additive(clip, weight, fade_length, layer);
    }

    fn blend_1d(&mut self, info: &Blend1DInfo, t: f32) {
        self.log(Call::Blend1D(t));
        self.inner.blend_1d(info, t);
    }

    fn blend_2d(&mut self, info: &Blend2DInfo, t: Vec2) {
        self.log(Call::Blend2D(t));
        self.inner.blend_2d(info, t);
    }

    fn cross_fade(&mut self, clip: &ClipHandle, fade_length: f32) {
        self.log(Call::CrossFade(clip.name().to_string()));
        self.inner.cross_fade(clip, fade_length);
    }

    fn sample(&mut self, clip: &ClipHandle, time: f32) {
        self.log(Call::Sample(clip.name().to_string(), time));
        self.inner.sample(clip, time);
    }

    fn stop(&mut self, layer: u32) {
        self.log(Call::Stop(layer));
        self.inner.stop(layer);
    }

    fn stop_all(&mut self) {
        self.log(Call::StopAll);
        self.inner.stop_all();
    }

    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    fn advance(&mut self, dt: f32) {
        self.inner.advance(dt);
    }

    fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.log(Call::SetWrapMode(mode));
        self.inner.set_wrap_mode(mode);
    }

    fn set_speed(&mut self, speed: f32) {
        self.log(Call::SetSpeed(speed));
        self.inner.set_speed(speed);
    }

    fn set_culling(&mut self, enable: bool) {
        self.log(Call::SetCulling(enable));
        self.inner.set_culling(enable);
    }

    fn set_bounds(&mut self, bounds: Aabb) {
        self.log(Call::SetBounds(bounds));
        self.inner.set_bounds(bounds);
    }

    fn num_clips(&self) -> usize {
        self.inner.num_clips()
    }

    fn clip(&self, index: usize) -> Option<ClipHandle> {
        self.inner.clip(index)
    }

    fn state(&self, clip: &ClipHandle) -> Option<ClipState> {
        self.inner.state(clip)
    }

    fn set_state(&mut self, clip: &ClipHandle, state: ClipState) -> bool {
        self.log(Call::SetState(clip.name().to_string()));
        self.inner.set_state(clip, state)
    }

    fn map_curve_to_node(&mut self, curve: &str, node: Option<NodeId>) {
        self.log(Call::MapCurve(curve.to_string(), node));
        self.inner.map_curve_to_node(curve, node);
        self.sync();
    }

    fn unmap_node(&mut self, node: Option<NodeId>) {
        self.log(Call::UnmapNode(node));
        self.inner.unmap_node(node);
        self.sync();
    }

    fn generic_curve_value(&self, index: usize) -> Option<f32> {
        self.inner.generic_curve_value(index)
    }

    fn set_morph_channel_weight(&mut self, index: usize, weight: f32) {
        self.log(Call::SetMorph(index, weight));
        self.inner.set_morph_channel_weight(index, weight);
    }

    fn subscribe_events(&mut self, callback: EventCallback) -> SubscriptionId {
        self.log(Call::Subscribe);
        let id = self.inner.subscribe_events(callback);
        self.sync();
        id
    }

    fn unsubscribe_events(&mut self, id: SubscriptionId) {
        self.log(Call::Unsubscribe);
        self.inner.unsubscribe_events(id);
        self.sync();
    }
}

pub fn recording_factory(rec: SharedRecorder) -> impl Fn() -> Box<dyn CurveEvaluator> {
    move || -> Box<dyn CurveEvaluator> {
        {
            let mut r = rec.borrow_mut();
            r.created += 1;
            r.live_mappings = 0;
            r.subscribers = 0;
        }
        Box::new(RecordingEvaluator {
            inner: PlaybackEvaluator::new(),
            rec: rec.clone(),
        })
    }
}

pub fn recorded_controller(node: NodeId) -> (AnimationController, SharedRecorder) {
    let rec = SharedRecorder::default();
    let controller = AnimationController::new(node, recording_factory(rec.clone()));
    (controller, rec)
}

/// Scene fixture together with its node ids in description order.
pub fn load_scene(name: &str) -> Result<(MemoryScene, Vec<NodeId>)> {
    let desc: SceneDesc = vizij_test_fixtures::scenes::load(name)?;
    MemoryScene::from_desc(&desc).with_context(|| format!("build scene '{name}'"))
}

pub fn load_clip(name: &str) -> Result<ClipHandle> {
    let clip: AnimationClip = vizij_test_fixtures::clips::load(name)
        .with_context(|| format!("clip fixture '{name}'"))?;
    Ok(ClipHandle::loaded(clip))
}

pub fn clip_named(name: &str, length: f32) -> ClipHandle {
    ClipHandle::loaded(AnimationClip {
        name: name.into(),
        length,
        ..Default::default()
    })
}

pub fn approx_vec(a: glam::Vec3, b: glam::Vec3) {
    assert!((a - b).abs().max_element() <= 1e-5, "left={a} right={b}");
}
