//! Vizij Animation Binding
//!
//! Runtime glue between curve playback and a scene graph. An
//! [`AnimationController`] owns a [`CurveEvaluator`] for one scene node, binds
//! clip curves to the nodes and bones beneath it, and keeps culling bounds and
//! renderable registration in sync across enable, disable and edit-time
//! preview. Scene, evaluator and script hooks are consumed through traits so
//! hosts can plug in their own implementations.

pub mod bone;
pub mod bounds;
pub mod clip;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod hooks;
pub mod ids;
pub mod mapping;
pub mod scene;

// Re-exports for hosts
pub use bone::{find_child_bones, BoneBinding};
pub use bounds::Aabb;
pub use clip::{
    AnimationClip, AnimationCurves, Blend1DInfo, Blend2DInfo, BlendClipInfo, ClipEvent, ClipHandle,
    ClipState, CurveFlags, NamedCurve, WrapMode,
};
pub use config::ControllerConfig;
pub use controller::{AnimationController, ControllerState};
pub use error::{BindingError, Result};
pub use evaluator::{CurveEvaluator, EvaluatorFactory, EventCallback, PlaybackEvaluator, MAIN_LAYER};
pub use events::{AnimationEventSink, EventRelay, EventSubscription};
pub use hooks::FloatPropertyBridge;
pub use ids::{BoneId, ControllerId, NodeId, RenderableId, SubscriptionId};
pub use mapping::{ClipMappingManager, MappingEntry, MappingKind, ROOT_CURVE};
pub use scene::{MemoryScene, NodeDesc, RenderableDesc, SceneDesc, SceneGraph};
