use worldgrid_common::{ErrorKind, RegionHandle};

/// Outcome of a failed cross-region operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommsError {
    #[error("could not reach {target}: {message}")]
    Transport { target: String, message: String },
    #[error("{target} rejected our credentials: {message}")]
    Auth { target: String, message: String },
    #[error("unusable answer from {target}: {message}")]
    Protocol { target: String, message: String },
    #[error("region {0} not found")]
    NotFound(RegionHandle),
    #[error("declined: {0}")]
    Policy(String),
    #[error("region {handle} suppressed after {failures} consecutive failures")]
    Suppressed { handle: RegionHandle, failures: u32 },
}

impl CommsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Suppressed { .. } => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Policy(_) => ErrorKind::Policy,
        }
    }

    /// Whether this failure says something about the destination's health.
    /// A peer that answered "no" is alive; a suppressed call never left.
    pub fn counts_against_destination(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Auth { .. } | Self::Protocol { .. }
        )
    }
}
