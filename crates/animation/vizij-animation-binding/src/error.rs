//! Errors raised at configuration and loading edges.
//!
//! Runtime controller operations never return these; they degrade to no-ops.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindingError {
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("scene node {index} references unknown parent {parent}")]
    UnknownParent { index: usize, parent: usize },

    #[error("scene node {index} declares a parent that comes after it")]
    ParentOrder { index: usize },

    #[error("invalid speed {0}: must be finite")]
    InvalidSpeed(f32),
}

pub type Result<T> = core::result::Result<T, BindingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let e = BindingError::UnknownParent {
            index: 3,
            parent: 9,
        };
        assert_eq!(e.to_string(), "scene node 3 references unknown parent 9");
    }

    #[test]
    fn json_errors_convert() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let e: BindingError = err.into();
        assert!(matches!(e, BindingError::Config(_)));
    }
}
