//! Curve evaluator contract.
//!
//! The evaluator owns the playing clip set, evaluates curves each frame and
//! writes the results into the scene nodes registered through
//! [`CurveEvaluator::map_curve_to_node`]. Sampling and blending arithmetic are
//! entirely the evaluator's business; the controller only forwards commands
//! and keeps the registrations consistent.

mod playback;

pub use playback::{PlaybackEvaluator, MAIN_LAYER};

use glam::Vec2;

use crate::bounds::Aabb;
use crate::clip::{Blend1DInfo, Blend2DInfo, ClipHandle, ClipState, WrapMode};
use crate::ids::{NodeId, SubscriptionId};

/// Receives `(clip, event_name)` for every clip event crossed during playback.
pub type EventCallback = Box<dyn FnMut(&ClipHandle, &str)>;

pub trait CurveEvaluator {
    /// Replace main-layer playback with `clip`.
    fn play(&mut self, clip: &ClipHandle);
    fn blend_additive(&mut self, clip: &ClipHandle, weight: f32, fade_length: f32, layer: u32);
    fn blend_1d(&mut self, info: &Blend1DInfo, t: f32);
    fn blend_2d(&mut self, info: &Blend2DInfo, t: Vec2);
    fn cross_fade(&mut self, clip: &ClipHandle, fade_length: f32);
    /// Evaluate `clip` at an explicit time without playing it.
    fn sample(&mut self, clip: &ClipHandle, time: f32);
    fn stop(&mut self, layer: u32);
    fn stop_all(&mut self);
    fn is_playing(&self) -> bool;

    /// Advance playback by `dt` seconds, raising crossed clip events.
    fn advance(&mut self, dt: f32);

    fn set_wrap_mode(&mut self, mode: WrapMode);
    fn set_speed(&mut self, speed: f32);
    fn set_culling(&mut self, enable: bool);
    /// World-space bounds used for culling.
    fn set_bounds(&mut self, bounds: Aabb);

    fn num_clips(&self) -> usize;
    /// Clip in playback slot `index`; slot 0 is the primary clip.
    fn clip(&self, index: usize) -> Option<ClipHandle>;
    fn state(&self, clip: &ClipHandle) -> Option<ClipState>;
    /// Returns false when `clip` is not bound.
    fn set_state(&mut self, clip: &ClipHandle, state: ClipState) -> bool;

    /// Register `node` as the target of curve `curve`. A `None` node is kept
    /// as an inert registration.
    fn map_curve_to_node(&mut self, curve: &str, node: Option<NodeId>);
    fn unmap_node(&mut self, node: Option<NodeId>);

    fn generic_curve_value(&self, index: usize) -> Option<f32>;
    fn set_morph_channel_weight(&mut self, index: usize, weight: f32);

    fn subscribe_events(&mut self, callback: EventCallback) -> SubscriptionId;
    fn unsubscribe_events(&mut self, id: SubscriptionId);
}

/// Creates evaluator instances for a controller on each activation.
pub trait EvaluatorFactory {
    fn create(&self) -> Box<dyn CurveEvaluator>;
}

impl<F> EvaluatorFactory for F
where
    F: Fn() -> Box<dyn CurveEvaluator>,
{
    fn create(&self) -> Box<dyn CurveEvaluator> {
        self()
    }
}
