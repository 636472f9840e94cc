use thiserror::Error;

/// Failure surfaced to callers of subscription operations.
///
/// Errors are `Clone` because one in-flight call can resolve many coalesced
/// waiters with the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// No connection target was set before the first remote call.
    #[error("push service is not configured, call configure(server, port) first")]
    NotConfigured,

    /// `configure` was called again with a different target.
    #[error("push service is already configured for {current}")]
    AlreadyConfigured { current: String },

    /// The connection target passed to `configure` is unusable.
    #[error("invalid connection configuration: {0}")]
    InvalidConfiguration(String),

    /// No valid device token; retry after registration completes.
    #[error("device token unavailable: {reason}")]
    TokenUnavailable { reason: String },

    /// Connect, I/O or timeout failure talking to the backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an application-level failure.
    #[error("backend rejected call ({code}): {message}")]
    BackendRejected { code: String, message: String },
}

pub type Result<T, E = PushError> = std::result::Result<T, E>;

/// Coarse classification of a [`PushError`], stable across FFI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConfigured,
    AlreadyConfigured,
    InvalidConfiguration,
    TokenUnavailable,
    Transport,
    BackendRejected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::AlreadyConfigured => "already_configured",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::TokenUnavailable => "token_unavailable",
            Self::Transport => "transport_error",
            Self::BackendRejected => "backend_rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PushError {
    pub fn token_unavailable(reason: impl Into<String>) -> Self {
        Self::TokenUnavailable {
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendRejected {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::AlreadyConfigured { .. } => ErrorKind::AlreadyConfigured,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::TokenUnavailable { .. } => ErrorKind::TokenUnavailable,
            Self::Transport(_) => ErrorKind::Transport,
            Self::BackendRejected { .. } => ErrorKind::BackendRejected,
        }
    }

    /// Whether a caller-side retry can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::TokenUnavailable { .. })
    }

    /// A transport failure leaves it unknown whether the backend applied a
    /// mutation.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
