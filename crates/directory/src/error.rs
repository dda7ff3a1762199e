use worldgrid_common::ErrorKind;

/// Failure talking to the grid authority.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("authority unreachable at {url}: {message}")]
    Transport { url: String, message: String },
    #[error("authority at {url} returned an unusable answer: {message}")]
    Protocol { url: String, message: String },
    #[error("authority fault {code}: {message}")]
    Fault { code: i64, message: String },
}

impl AuthorityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol { .. } | Self::Fault { .. } => ErrorKind::Protocol,
        }
    }
}

/// Registering a region with the authority failed. Distinguishes an
/// authority that could not be reached from one that answered with a refusal.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("grid authority at {url} is unreachable")]
    Unreachable {
        url: String,
        #[source]
        source: AuthorityError,
    },
    #[error("grid authority at {url} rejected the region: {reason}")]
    Rejected { url: String, reason: String },
}

impl RegistrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Auth,
        }
    }
}
