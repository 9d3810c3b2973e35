use std::time::Duration;

use crate::island::ExpandError;
use crate::persistence::PersistenceError;

/// Failures of island and sync operations. Validation problems and
/// conflicts are not errors; they are reported inside a successful response.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("island not found")]
    NotFound,
    #[error("player {player} may not {action} island {island}")]
    PermissionDenied {
        player: String,
        island: String,
        action: &'static str,
    },
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout(_))
    }
}
