use crate::job::BakeState;

/// Everything that can stop a bake before its dispatch is launched.
///
/// Parallel tasks never report errors; all of these are raised by the
/// controller while validating inputs.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    /// Counts, sizes or light UVs that cannot describe a valid bake.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Vertex store or output atlas bound with the wrong stride/resolution.
    #[error("resource binding error: {0}")]
    ResourceBinding(String),

    #[error("cannot {action} while the bake job is {state:?}")]
    InvalidState {
        action: &'static str,
        state: BakeState,
    },
}

impl BakeError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        BakeError::Configuration(msg.into())
    }

    pub(crate) fn binding(msg: impl Into<String>) -> Self {
        BakeError::ResourceBinding(msg.into())
    }
}

pub type Result<T, E = BakeError> = std::result::Result<T, E>;
