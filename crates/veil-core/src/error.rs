use thiserror::Error;

pub type VeilResult<T> = Result<T, VeilError>;

#[derive(Debug, Error)]
pub enum VeilError {
    #[error("secure random source unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("authentication failed: ciphertext was tampered with, corrupted, or the key is wrong")]
    AuthenticationFailed,

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("transfer not found")]
    NotFound,

    #[error("transfer already consumed")]
    AlreadyConsumed,

    #[error("transfer expired")]
    Expired,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("incomplete transfer: {missing} of {total} chunks missing")]
    IncompleteTransfer { missing: u64, total: u64 },

    #[error("channel failure: {0}")]
    ChannelFailure(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless mirror of [`VeilError`], cheap to copy into state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CryptoUnavailable,
    MalformedKey,
    AuthenticationFailed,
    InvalidLink,
    NotFound,
    AlreadyConsumed,
    Expired,
    ProtocolViolation,
    IncompleteTransfer,
    ChannelFailure,
    Config,
    Io,
}

impl VeilError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VeilError::CryptoUnavailable(_) => ErrorKind::CryptoUnavailable,
            VeilError::MalformedKey(_) => ErrorKind::MalformedKey,
            VeilError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            VeilError::InvalidLink(_) => ErrorKind::InvalidLink,
            VeilError::NotFound => ErrorKind::NotFound,
            VeilError::AlreadyConsumed => ErrorKind::AlreadyConsumed,
            VeilError::Expired => ErrorKind::Expired,
            VeilError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            VeilError::IncompleteTransfer { .. } => ErrorKind::IncompleteTransfer,
            VeilError::ChannelFailure(_) => ErrorKind::ChannelFailure,
            VeilError::Config(_) => ErrorKind::Config,
            VeilError::Io(_) => ErrorKind::Io,
        }
    }

    /// Human-readable category for display surfaces.
    pub fn category(&self) -> &'static str {
        self.kind().category()
    }

    /// Only transport failures are worth retrying, by re-resolving the link from scratch.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ChannelFailure
    }
}

impl ErrorKind {
    pub fn category(self) -> &'static str {
        match self {
            ErrorKind::CryptoUnavailable => "encryption is unavailable on this system",
            ErrorKind::MalformedKey => "the link carries an unusable key",
            ErrorKind::AuthenticationFailed => "the file failed its integrity check",
            ErrorKind::InvalidLink => "the link is invalid",
            ErrorKind::NotFound => "no transfer exists for this link",
            ErrorKind::AlreadyConsumed => "this link has already been used",
            ErrorKind::Expired => "this link has expired",
            ErrorKind::ProtocolViolation => "the sender broke the transfer protocol",
            ErrorKind::IncompleteTransfer => "the transfer ended before all data arrived",
            ErrorKind::ChannelFailure => "the connection to the sender failed",
            ErrorKind::Config => "configuration error",
            ErrorKind::Io => "local I/O error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.category())
    }
}
