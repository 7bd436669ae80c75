//! Optional hook binding generic curves to scripted float properties.

use crate::clip::ClipHandle;
use crate::evaluator::CurveEvaluator;

/// Writes generic curve values into host-side float properties.
///
/// `rebuild` is called whenever the primary clip changes (including to none);
/// `update` runs after every advanced frame.
pub trait FloatPropertyBridge {
    fn rebuild(&mut self, clip: Option<&ClipHandle>);
    fn update(&mut self, evaluator: &dyn CurveEvaluator);
}
