//! Identifiers for scene collaborators and controllers.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use uuid::Uuid;

new_key_type! {
    /// Handle to a scene node.
    pub struct NodeId;
    /// Handle to a bone component hosted by a scene node.
    pub struct BoneId;
    /// Handle to a renderable component hosted by a scene node.
    pub struct RenderableId;
}

/// Identity of an animation controller, used by bones and renderables to
/// refer back to the controller that drives them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Token returned by an evaluator when an event callback is subscribed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u32);
