/// Classification of every cross-region failure.
///
/// Concrete error enums in the directory and comms crates map onto these
/// kinds so callers can branch on the category without matching transport
/// details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection refused, timed out, or failed at the socket level.
    Transport,
    /// Credentials or handshake rejected by the peer.
    Auth,
    /// The peer answered with a fault or a malformed payload.
    Protocol,
    /// Unknown handle, name or parcel.
    NotFound,
    /// Refused by local policy: logins disabled or agent banned.
    Policy,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
            Self::NotFound => "not found",
            Self::Policy => "policy",
        };
        f.write_str(s)
    }
}
