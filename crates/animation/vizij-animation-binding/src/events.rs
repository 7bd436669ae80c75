//! Relaying evaluator clip events to controller-level sinks.
//!
//! The evaluator owns its callbacks, so the controller hands it a closure that
//! forwards into a shared [`EventRelay`]. The returned [`EventSubscription`]
//! must be cancelled before the evaluator is dropped or replaced.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::clip::ClipHandle;
use crate::evaluator::{CurveEvaluator, EventCallback};
use crate::ids::SubscriptionId;

/// Receives `(clip, event_name)` pairs raised during playback.
pub trait AnimationEventSink {
    fn on_event(&self, clip: &ClipHandle, name: &str);
}

impl<F> AnimationEventSink for F
where
    F: Fn(&ClipHandle, &str),
{
    fn on_event(&self, clip: &ClipHandle, name: &str) {
        self(clip, name)
    }
}

#[derive(Default)]
struct RelayInner {
    sinks: Vec<Rc<dyn AnimationEventSink>>,
    script: Option<Rc<dyn AnimationEventSink>>,
}

/// Shared fan-out of clip events. Sinks run in registration order, followed by
/// the script hook when one is set.
#[derive(Clone, Default)]
pub struct EventRelay(Rc<RefCell<RelayInner>>);

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&self, sink: Rc<dyn AnimationEventSink>) {
        self.0.borrow_mut().sinks.push(sink);
    }

    pub fn set_script_sink(&self, sink: Option<Rc<dyn AnimationEventSink>>) {
        self.0.borrow_mut().script = sink;
    }

    pub fn sink_count(&self) -> usize {
        self.0.borrow().sinks.len()
    }

    pub fn dispatch(&self, clip: &ClipHandle, name: &str) {
        // Clone out so sinks may register further sinks while being called.
        let (sinks, script) = {
            let inner = self.0.borrow();
            (inner.sinks.clone(), inner.script.clone())
        };
        trace!("clip event '{}' on '{}'", name, clip.name());
        for sink in &sinks {
            sink.on_event(clip, name);
        }
        if let Some(script) = script {
            script.on_event(clip, name);
        }
    }

    /// Evaluator callback forwarding into this relay.
    pub fn callback(&self) -> EventCallback {
        let relay = self.clone();
        Box::new(move |clip: &ClipHandle, name: &str| relay.dispatch(clip, name))
    }
}

impl fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("EventRelay")
            .field("sinks", &inner.sinks.len())
            .field("script", &inner.script.is_some())
            .finish()
    }
}

/// Live registration of an [`EventRelay`] on one evaluator.
#[derive(Debug)]
#[must_use = "an event subscription must be cancelled before its evaluator is dropped"]
pub struct EventSubscription {
    id: SubscriptionId,
}

impl EventSubscription {
    pub fn subscribe(evaluator: &mut dyn CurveEvaluator, relay: &EventRelay) -> Self {
        let id = evaluator.subscribe_events(relay.callback());
        Self { id }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn cancel(self, evaluator: &mut dyn CurveEvaluator) {
        evaluator.unsubscribe_events(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{AnimationClip, ClipEvent};
    use crate::evaluator::PlaybackEvaluator;

    fn clip_with_event() -> ClipHandle {
        ClipHandle::loaded(AnimationClip {
            name: "wave".into(),
            length: 1.0,
            events: vec![ClipEvent {
                name: "hello".into(),
                time: 0.5,
            }],
            ..Default::default()
        })
    }

    #[test]
    fn sinks_then_script_in_order() {
        let relay = EventRelay::new();
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        for tag in ["a", "b"] {
            let log = log.clone();
            relay.add_sink(Rc::new(move |_: &ClipHandle, name: &str| {
                log.borrow_mut().push(format!("{tag}:{name}"))
            }));
        }
        let script_log = log.clone();
        relay.set_script_sink(Some(Rc::new(move |_: &ClipHandle, name: &str| {
            script_log.borrow_mut().push(format!("script:{name}"))
        })));

        relay.dispatch(&clip_with_event(), "hello");
        assert_eq!(*log.borrow(), ["a:hello", "b:hello", "script:hello"]);
    }

    #[test]
    fn cancelled_subscription_stops_delivery() {
        let relay = EventRelay::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        relay.add_sink(Rc::new(move |_: &ClipHandle, _: &str| *h.borrow_mut() += 1));

        let clip = clip_with_event();
        let mut ev = PlaybackEvaluator::new();
        let sub = EventSubscription::subscribe(&mut ev, &relay);
        ev.play(&clip);
        ev.advance(0.75);
        assert_eq!(*hits.borrow(), 1);

        sub.cancel(&mut ev);
        assert_eq!(ev.subscriber_count(), 0);
        ev.advance(1.0);
        assert_eq!(*hits.borrow(), 1);
    }
}
