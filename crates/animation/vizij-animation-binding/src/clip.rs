//! Clip assets as seen by the binding layer.
//!
//! Only curve names and flags matter here; keyframe data belongs to the
//! evaluator and is never inspected by the controller.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flags attached to a single curve.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveFlags {
    /// Curve came from imported data unrelated to the scene hierarchy
    /// (e.g. baked mesh import) and must not be bound to scene nodes.
    #[serde(default)]
    pub imported: bool,
    #[serde(default)]
    pub morph_frame: bool,
    #[serde(default)]
    pub morph_weight: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedCurve {
    pub name: String,
    #[serde(default)]
    pub flags: CurveFlags,
}

impl NamedCurve {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: CurveFlags::default(),
        }
    }

    pub fn imported(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: CurveFlags {
                imported: true,
                ..CurveFlags::default()
            },
        }
    }
}

/// Named curve lists of a clip, grouped by the property they drive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationCurves {
    #[serde(default)]
    pub position: Vec<NamedCurve>,
    #[serde(default)]
    pub rotation: Vec<NamedCurve>,
    #[serde(default)]
    pub scale: Vec<NamedCurve>,
    #[serde(default)]
    pub generic: Vec<NamedCurve>,
}

impl AnimationCurves {
    /// Transform curves in binding order: position, rotation, scale.
    pub fn transform_curves(&self) -> impl Iterator<Item = &NamedCurve> {
        self.position
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
    }
}

/// Discrete named event raised when playback crosses `time`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEvent {
    pub name: String,
    pub time: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Length in seconds.
    #[serde(default)]
    pub length: f32,
    #[serde(default)]
    pub curves: AnimationCurves,
    #[serde(default)]
    pub events: Vec<ClipEvent>,
    #[serde(default)]
    pub additive: bool,
}

struct ClipAsset {
    id: Uuid,
    name: String,
    data: OnceLock<AnimationClip>,
}

/// Shared handle to a clip asset.
///
/// Equality is handle identity: two handles are equal only when they refer to
/// the same asset slot. A handle may exist before its data is loaded.
#[derive(Clone)]
pub struct ClipHandle(Arc<ClipAsset>);

impl ClipHandle {
    /// Handle whose data is already available.
    pub fn loaded(clip: AnimationClip) -> Self {
        let data = OnceLock::new();
        let name = clip.name.clone();
        let _ = data.set(clip);
        Self(Arc::new(ClipAsset {
            id: Uuid::new_v4(),
            name,
            data,
        }))
    }

    /// Handle whose data will be supplied later through [`ClipHandle::finish_load`].
    pub fn pending(name: impl Into<String>) -> Self {
        Self(Arc::new(ClipAsset {
            id: Uuid::new_v4(),
            name: name.into(),
            data: OnceLock::new(),
        }))
    }

    /// Supply the data of a pending handle. Returns false if it was already loaded.
    pub fn finish_load(&self, clip: AnimationClip) -> bool {
        self.0.data.set(clip).is_ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.0.data.get().is_some()
    }

    pub fn get(&self) -> Option<&AnimationClip> {
        self.0.data.get()
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for ClipHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClipHandle {}

impl fmt::Debug for ClipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipHandle")
            .field("name", &self.0.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Playback cursor of a single bound clip.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipState {
    pub time: f32,
    pub playing: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    Loop,
    Clamp,
    PingPong,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendClipInfo {
    pub clip: ClipHandle,
    pub position: f32,
}

/// One-dimensional blend space: clips placed along a line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blend1DInfo {
    pub clips: Vec<BlendClipInfo>,
}

/// Two-dimensional blend space over the unit square.
#[derive(Clone, Debug, PartialEq)]
pub struct Blend2DInfo {
    pub top_left: ClipHandle,
    pub top_right: ClipHandle,
    pub bottom_left: ClipHandle,
    pub bottom_right: ClipHandle,
}
