//! Reference evaluator tracking playback state only.
//!
//! Keeps clip slots, cursors, fades and registrations, and raises clip events
//! while advancing time. It does not sample curves, so generic curve values
//! are never available from it.

use std::fmt;

use glam::Vec2;
use hashbrown::HashMap;
use log::trace;

use super::{CurveEvaluator, EventCallback};
use crate::bounds::Aabb;
use crate::clip::{AnimationClip, Blend1DInfo, Blend2DInfo, ClipHandle, ClipState, WrapMode};
use crate::ids::{NodeId, SubscriptionId};

/// Layer index of non-additive playback. `stop(MAIN_LAYER)` stops it.
pub const MAIN_LAYER: u32 = u32::MAX;

#[derive(Clone, Debug)]
struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    length: f32,
}

impl Fade {
    fn new(from: f32, to: f32, length: f32) -> Self {
        Self {
            from,
            to,
            elapsed: 0.0,
            length,
        }
    }

    fn weight(&self) -> f32 {
        if self.length <= 0.0 {
            return self.to;
        }
        let u = (self.elapsed / self.length).min(1.0);
        self.from + (self.to - self.from) * u
    }

    fn done(&self) -> bool {
        self.elapsed >= self.length
    }
}

#[derive(Debug)]
struct ClipSlot {
    clip: ClipHandle,
    layer: u32,
    weight: f32,
    /// Unwrapped playback time; `time` is derived from it by the wrap mode.
    elapsed: f32,
    time: f32,
    playing: bool,
    fade: Option<Fade>,
}

impl ClipSlot {
    fn new(clip: ClipHandle, layer: u32, weight: f32) -> Self {
        Self {
            clip,
            layer,
            weight,
            elapsed: 0.0,
            time: 0.0,
            playing: true,
            fade: None,
        }
    }

    fn length(&self) -> f32 {
        self.clip.get().map(|c| c.length).unwrap_or(0.0)
    }

    fn faded_out(&self) -> bool {
        matches!(&self.fade, Some(f) if f.done() && f.to <= 0.0)
    }
}

#[derive(Debug, Clone)]
struct CurveMapping {
    curve: String,
    node: Option<NodeId>,
}

fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Reflect t into [0, span] with ping-pong behavior, period = 2 * span.
fn ping_pong(t: f32, span: f32) -> f32 {
    if span <= 0.0 {
        return 0.0;
    }
    let period = 2.0 * span;
    let m = fmod(t, period);
    if m <= span {
        m
    } else {
        period - m
    }
}

/// Map unwrapped time into clip time. The flag reports that a clamped clip
/// reached one of its ends.
fn wrap_time(mode: WrapMode, elapsed: f32, length: f32) -> (f32, bool) {
    if length <= 0.0 {
        return (0.0, mode == WrapMode::Clamp);
    }
    match mode {
        WrapMode::Loop => (fmod(elapsed, length), false),
        WrapMode::Clamp => {
            let t = elapsed.clamp(0.0, length);
            (t, elapsed >= length || elapsed < 0.0)
        }
        WrapMode::PingPong => (ping_pong(elapsed, length), false),
    }
}

struct Crossing {
    mode: WrapMode,
    prev_elapsed: f32,
    elapsed: f32,
    prev_time: f32,
    time: f32,
    length: f32,
}

impl Crossing {
    /// Whether forward playback passed `at` during this step.
    fn passes(&self, at: f32) -> bool {
        if self.mode == WrapMode::Loop && self.length > 0.0 {
            let wrapped =
                (self.elapsed / self.length).floor() > (self.prev_elapsed / self.length).floor();
            if wrapped {
                return at > self.prev_time || at <= self.time;
            }
            return at > self.prev_time && at <= self.time;
        }
        let (lo, hi) = if self.prev_time <= self.time {
            (self.prev_time, self.time)
        } else {
            (self.time, self.prev_time)
        };
        at > lo && at <= hi
    }

    fn collect(&self, clip: &AnimationClip, handle: &ClipHandle, out: &mut Vec<(ClipHandle, String)>) {
        for event in clip.events.iter().filter(|e| self.passes(e.time)) {
            out.push((handle.clone(), event.name.clone()));
        }
    }
}

pub struct PlaybackEvaluator {
    slots: Vec<ClipSlot>,
    wrap_mode: WrapMode,
    speed: f32,
    culling: bool,
    bounds: Aabb,
    mappings: Vec<CurveMapping>,
    morph_weights: HashMap<usize, f32>,
    callbacks: Vec<(SubscriptionId, EventCallback)>,
    next_subscription: u32,
}

impl Default for PlaybackEvaluator {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            wrap_mode: WrapMode::Loop,
            speed: 1.0,
            culling: true,
            bounds: Aabb::EMPTY,
            mappings: Vec::new(),
            morph_weights: HashMap::new(),
            callbacks: Vec::new(),
            next_subscription: 0,
        }
    }
}

impl fmt::Debug for PlaybackEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEvaluator")
            .field("slots", &self.slots)
            .field("wrap_mode", &self.wrap_mode)
            .field("speed", &self.speed)
            .field("culling", &self.culling)
            .field("bounds", &self.bounds)
            .field("mappings", &self.mappings)
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

impl PlaybackEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory closure suitable for `AnimationController::new`.
    pub fn boxed() -> Box<dyn CurveEvaluator> {
        Box::new(Self::new())
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn culling(&self) -> bool {
        self.culling
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn morph_weight(&self, index: usize) -> Option<f32> {
        self.morph_weights.get(&index).copied()
    }

    pub fn slot_weight(&self, index: usize) -> Option<f32> {
        self.slots.get(index).map(|s| s.weight)
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Curve currently registered for `node`.
    pub fn mapped_curve(&self, node: Option<NodeId>) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.node == node)
            .map(|m| m.curve.as_str())
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Replace main-layer slots with `weighted`, keeping the cursor of any
    /// clip that was already playing on the main layer when `keep_time`.
    fn set_main(&mut self, weighted: Vec<(ClipHandle, f32)>, keep_time: bool) {
        let previous: Vec<ClipSlot> = {
            let (main, rest): (Vec<ClipSlot>, Vec<ClipSlot>) = self
                .slots
                .drain(..)
                .partition(|s| s.layer == MAIN_LAYER);
            self.slots = rest;
            main
        };

        let mut fresh: Vec<ClipSlot> = Vec::with_capacity(weighted.len());
        for (clip, weight) in weighted {
            if let Some(slot) = fresh.iter_mut().find(|s| s.clip == clip) {
                slot.weight += weight;
                continue;
            }
            let mut slot = ClipSlot::new(clip, MAIN_LAYER, weight);
            if keep_time {
                if let Some(old) = previous.iter().find(|p| p.clip == slot.clip) {
                    slot.elapsed = old.elapsed;
                    slot.time = old.time;
                    slot.playing = old.playing;
                }
            }
            fresh.push(slot);
        }
        fresh.append(&mut self.slots);
        self.slots = fresh;
    }
}

impl CurveEvaluator for PlaybackEvaluator {
    fn play(&mut self, clip: &ClipHandle) {
        self.set_main(vec![(clip.clone(), 1.0)], false);
    }

    fn blend_additive(&mut self, clip: &ClipHandle, weight: f32, fade_length: f32, layer: u32) {
        if layer == MAIN_LAYER {
            trace!("blend_additive: main layer is reserved, ignoring '{}'", clip.name());
            return;
        }
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.layer == layer && s.clip == *clip)
        {
            slot.fade = Some(Fade::new(slot.weight, weight, fade_length));
            slot.weight = slot.fade.as_ref().map(Fade::weight).unwrap_or(weight);
            return;
        }
        let mut slot = ClipSlot::new(clip.clone(), layer, weight);
        if fade_length > 0.0 {
            slot.fade = Some(Fade::new(0.0, weight, fade_length));
            slot.weight = 0.0;
        }
        self.slots.push(slot);
    }

    fn blend_1d(&mut self, info: &Blend1DInfo, t: f32) {
        let mut points: Vec<_> = info.clips.iter().collect();
        points.sort_by(|a, b| a.position.total_cmp(&b.position));

        let weighted = match (points.first(), points.last()) {
            (None, _) | (_, None) => Vec::new(),
            // NaN parks on the lowest point like any underflow.
            (Some(first), _) if t.is_nan() || t <= first.position => {
                vec![(first.clip.clone(), 1.0)]
            }
            (_, Some(last)) if t >= last.position => vec![(last.clip.clone(), 1.0)],
            _ => {
                let i = points
                    .windows(2)
                    .position(|w| w[0].position <= t && t <= w[1].position)
                    .unwrap_or(0);
                let (a, b) = (points[i], points[i + 1]);
                let span = b.position - a.position;
                let wb = if span > 1e-6 {
                    (t - a.position) / span
                } else {
                    0.0
                };
                vec![(a.clip.clone(), 1.0 - wb), (b.clip.clone(), wb)]
            }
        };
        self.set_main(weighted, true);
    }

    fn blend_2d(&mut self, info: &Blend2DInfo, t: Vec2) {
        let x = t.x.clamp(0.0, 1.0);
        let y = t.y.clamp(0.0, 1.0);
        self.set_main(
            vec![
                (info.top_left.clone(), (1.0 - x) * (1.0 - y)),
                (info.top_right.clone(), x * (1.0 - y)),
                (info.bottom_left.clone(), (1.0 - x) * y),
                (info.bottom_right.clone(), x * y),
            ],
            true,
        );
    }

    fn cross_fade(&mut self, clip: &ClipHandle, fade_length: f32) {
        if fade_length <= 0.0 {
            self.play(clip);
            return;
        }
        self.slots
            .retain(|s| !(s.layer == MAIN_LAYER && s.clip == *clip));
        for slot in self.slots.iter_mut().filter(|s| s.layer == MAIN_LAYER) {
            slot.fade = Some(Fade::new(slot.weight, 0.0, fade_length));
        }
        let mut incoming = ClipSlot::new(clip.clone(), MAIN_LAYER, 0.0);
        incoming.fade = Some(Fade::new(0.0, 1.0, fade_length));
        self.slots.insert(0, incoming);
    }

    fn sample(&mut self, clip: &ClipHandle, time: f32) {
        self.set_main(vec![(clip.clone(), 1.0)], false);
        if let Some(slot) = self.slots.first_mut() {
            let (t, _) = wrap_time(self.wrap_mode, time, slot.length());
            slot.elapsed = time;
            slot.time = t;
            slot.playing = false;
        }
    }

    fn stop(&mut self, layer: u32) {
        self.slots.retain(|s| s.layer != layer);
    }

    fn stop_all(&mut self) {
        self.slots.clear();
    }

    fn is_playing(&self) -> bool {
        self.slots.iter().any(|s| s.playing)
    }

    fn advance(&mut self, dt: f32) {
        let mode = self.wrap_mode;
        let step = dt * self.speed;
        let mut fired: Vec<(ClipHandle, String)> = Vec::new();

        for slot in &mut self.slots {
            if let Some(fade) = slot.fade.as_mut() {
                fade.elapsed += dt;
                slot.weight = fade.weight();
            }
            if !slot.playing || step == 0.0 {
                continue;
            }
            let length = slot.length();
            let prev_elapsed = slot.elapsed;
            let prev_time = slot.time;
            slot.elapsed += step;
            let (time, finished) = wrap_time(mode, slot.elapsed, length);
            slot.time = time;
            if finished {
                slot.playing = false;
            }
            // Events are only raised for forward playback.
            if step > 0.0 {
                if let Some(clip) = slot.clip.get() {
                    let crossing = Crossing {
                        mode,
                        prev_elapsed,
                        elapsed: slot.elapsed,
                        prev_time,
                        time,
                        length,
                    };
                    crossing.collect(clip, &slot.clip, &mut fired);
                }
            }
        }

        self.slots.retain(|s| !s.faded_out());

        for (clip, name) in &fired {
            for (_, callback) in self.callbacks.iter_mut() {
                callback(clip, name);
            }
        }
    }

    fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    fn set_culling(&mut self, enable: bool) {
        self.culling = enable;
    }

    fn set_bounds(&mut self, bounds: Aabb) {
        self.bounds = bounds;
    }

    fn num_clips(&self) -> usize {
        self.slots.len()
    }

    fn clip(&self, index: usize) -> Option<ClipHandle> {
        self.slots.get(index).map(|s| s.clip.clone())
    }

    fn state(&self, clip: &ClipHandle) -> Option<ClipState> {
        self.slots
            .iter()
            .find(|s| s.clip == *clip)
            .map(|s| ClipState {
                time: s.time,
                playing: s.playing,
            })
    }

    fn set_state(&mut self, clip: &ClipHandle, state: ClipState) -> bool {
        match self.slots.iter_mut().find(|s| s.clip == *clip) {
            Some(slot) => {
                slot.elapsed = state.time;
                slot.time = state.time;
                slot.playing = state.playing;
                true
            }
            None => false,
        }
    }

    fn map_curve_to_node(&mut self, curve: &str, node: Option<NodeId>) {
        if node.is_some() {
            if let Some(m) = self.mappings.iter_mut().find(|m| m.node == node) {
                m.curve = curve.to_string();
                return;
            }
        }
        self.mappings.push(CurveMapping {
            curve: curve.to_string(),
            node,
        });
    }

    fn unmap_node(&mut self, node: Option<NodeId>) {
        self.mappings.retain(|m| m.node != node);
    }

    fn generic_curve_value(&self, _index: usize) -> Option<f32> {
        None
    }

    fn set_morph_channel_weight(&mut self, index: usize, weight: f32) {
        self.morph_weights.insert(index, weight);
    }

    fn subscribe_events(&mut self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.wrapping_add(1);
        self.callbacks.push((id, callback));
        id
    }

    fn unsubscribe_events(&mut self, id: SubscriptionId) {
        self.callbacks.retain(|(sid, _)| *sid != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{BlendClipInfo, ClipEvent};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() <= 1e-5, "left={a} right={b}");
    }

    fn clip(name: &str, length: f32, events: &[(&str, f32)]) -> ClipHandle {
        ClipHandle::loaded(AnimationClip {
            name: name.into(),
            length,
            events: events
                .iter()
                .map(|(n, t)| ClipEvent {
                    name: n.to_string(),
                    time: *t,
                })
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn loop_wraps_time() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 2.0, &[]);
        ev.play(&walk);
        ev.advance(2.5);
        approx(ev.state(&walk).unwrap().time, 0.5);
        assert!(ev.is_playing());
    }

    #[test]
    fn clamp_stops_at_end() {
        let mut ev = PlaybackEvaluator::new();
        ev.set_wrap_mode(WrapMode::Clamp);
        let walk = clip("walk", 1.0, &[]);
        ev.play(&walk);
        ev.advance(3.0);
        let st = ev.state(&walk).unwrap();
        approx(st.time, 1.0);
        assert!(!st.playing);
        assert!(!ev.is_playing());
    }

    #[test]
    fn ping_pong_reflects() {
        let mut ev = PlaybackEvaluator::new();
        ev.set_wrap_mode(WrapMode::PingPong);
        let walk = clip("walk", 1.0, &[]);
        ev.play(&walk);
        ev.advance(1.25);
        approx(ev.state(&walk).unwrap().time, 0.75);
    }

    #[test]
    fn speed_scales_advance() {
        let mut ev = PlaybackEvaluator::new();
        ev.set_speed(2.0);
        let walk = clip("walk", 10.0, &[]);
        ev.play(&walk);
        ev.advance(1.0);
        approx(ev.state(&walk).unwrap().time, 2.0);
    }

    #[test]
    fn events_fire_once_per_crossing_including_wrap() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 1.0, &[("step", 0.5), ("land", 0.9)]);
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = seen.clone();
        ev.subscribe_events(Box::new(move |_: &ClipHandle, name: &str| {
            sink.borrow_mut().push(name.to_string())
        }));
        ev.play(&walk);
        ev.advance(0.6);
        assert_eq!(*seen.borrow(), ["step"]);
        ev.advance(0.6); // 0.6 -> 1.2 wraps to 0.2
        assert_eq!(*seen.borrow(), ["step", "land"]);
        ev.advance(0.4); // 0.2 -> 0.6
        assert_eq!(*seen.borrow(), ["step", "land", "step"]);
    }

    #[test]
    fn unsubscribed_callback_is_not_called() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 1.0, &[("step", 0.5)]);
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let id = ev.subscribe_events(Box::new(move |_: &ClipHandle, _: &str| *h.borrow_mut() += 1));
        ev.unsubscribe_events(id);
        assert_eq!(ev.subscriber_count(), 0);
        ev.play(&walk);
        ev.advance(0.75);
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn cross_fade_promotes_incoming_and_drops_outgoing() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 1.0, &[]);
        let run = clip("run", 1.0, &[]);
        ev.play(&walk);
        ev.cross_fade(&run, 0.5);
        assert_eq!(ev.clip(0), Some(run.clone()));
        assert_eq!(ev.num_clips(), 2);
        ev.advance(0.25);
        approx(ev.slot_weight(0).unwrap(), 0.5);
        approx(ev.slot_weight(1).unwrap(), 0.5);
        ev.advance(0.5);
        assert_eq!(ev.num_clips(), 1);
        assert_eq!(ev.clip(0), Some(run));
    }

    #[test]
    fn blend_1d_weights_neighbours() {
        let mut ev = PlaybackEvaluator::new();
        let idle = clip("idle", 1.0, &[]);
        let walk = clip("walk", 1.0, &[]);
        let run = clip("run", 1.0, &[]);
        let info = Blend1DInfo {
            clips: vec![
                BlendClipInfo { clip: run.clone(), position: 2.0 },
                BlendClipInfo { clip: idle.clone(), position: 0.0 },
                BlendClipInfo { clip: walk.clone(), position: 1.0 },
            ],
        };
        ev.blend_1d(&info, 1.25);
        assert_eq!(ev.clip(0), Some(walk));
        assert_eq!(ev.clip(1), Some(run));
        approx(ev.slot_weight(0).unwrap(), 0.75);
        approx(ev.slot_weight(1).unwrap(), 0.25);

        ev.blend_1d(&info, -3.0);
        assert_eq!(ev.num_clips(), 1);
        assert_eq!(ev.clip(0), Some(idle));
    }

    #[test]
    fn blend_1d_nan_position_uses_lowest_clip() {
        let mut ev = PlaybackEvaluator::new();
        let idle = clip("idle", 1.0, &[]);
        let walk = clip("walk", 1.0, &[]);
        let single = Blend1DInfo {
            clips: vec![BlendClipInfo { clip: idle.clone(), position: 0.5 }],
        };
        ev.blend_1d(&single, f32::NAN);
        assert_eq!(ev.num_clips(), 1);
        approx(ev.slot_weight(0).unwrap(), 1.0);

        let pair = Blend1DInfo {
            clips: vec![
                BlendClipInfo { clip: walk.clone(), position: 1.0 },
                BlendClipInfo { clip: idle.clone(), position: 0.0 },
            ],
        };
        ev.blend_1d(&pair, f32::NAN);
        assert_eq!(ev.num_clips(), 1);
        assert_eq!(ev.clip(0), Some(idle));
        approx(ev.slot_weight(0).unwrap(), 1.0);
    }

    #[test]
    fn blend_2d_bilinear_weights() {
        let mut ev = PlaybackEvaluator::new();
        let info = Blend2DInfo {
            top_left: clip("tl", 1.0, &[]),
            top_right: clip("tr", 1.0, &[]),
            bottom_left: clip("bl", 1.0, &[]),
            bottom_right: clip("br", 1.0, &[]),
        };
        ev.blend_2d(&info, Vec2::new(0.5, 0.25));
        approx(ev.slot_weight(0).unwrap(), 0.375);
        approx(ev.slot_weight(1).unwrap(), 0.375);
        approx(ev.slot_weight(2).unwrap(), 0.125);
        approx(ev.slot_weight(3).unwrap(), 0.125);
    }

    #[test]
    fn additive_layers_stop_independently() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 1.0, &[]);
        let wave = clip("wave", 1.0, &[]);
        ev.play(&walk);
        ev.blend_additive(&wave, 0.5, 0.0, 1);
        assert_eq!(ev.num_clips(), 2);
        ev.stop(1);
        assert_eq!(ev.num_clips(), 1);
        ev.stop(MAIN_LAYER);
        assert_eq!(ev.num_clips(), 0);
    }

    #[test]
    fn sample_holds_time_without_playing() {
        let mut ev = PlaybackEvaluator::new();
        let walk = clip("walk", 2.0, &[]);
        ev.sample(&walk, 0.75);
        let st = ev.state(&walk).unwrap();
        approx(st.time, 0.75);
        assert!(!st.playing);
        ev.advance(1.0);
        approx(ev.state(&walk).unwrap().time, 0.75);
    }

    #[test]
    fn remapping_a_node_replaces_its_curve() {
        let mut ev = PlaybackEvaluator::new();
        let mut nodes = slotmap::SlotMap::<NodeId, ()>::with_key();
        let n = nodes.insert(());
        ev.map_curve_to_node("a", Some(n));
        ev.map_curve_to_node("b", Some(n));
        assert_eq!(ev.mapping_count(), 1);
        assert_eq!(ev.mapped_curve(Some(n)), Some("b"));
        ev.unmap_node(Some(n));
        assert_eq!(ev.mapping_count(), 0);
    }
}
