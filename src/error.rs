use http::Method;
use thiserror::Error as ThisError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classifies where a transport failure happened. The retry predicate keys
/// off this: only connection-level faults are safely retryable by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Connect,
    ConnectionClosed,
    StreamClosed,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::ConnectionClosed => "connection_closed",
            Self::StreamClosed => "stream_closed",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Stable machine-readable code for each error variant, for logging and
/// metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Configuration,
    Transport,
    InterceptorPanic,
    MissingRedirectLocation,
    InvalidRedirectLocation,
    RedirectLimitExceeded,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::InterceptorPanic => "interceptor_panic",
            Self::MissingRedirectLocation => "missing_redirect_location",
            Self::InvalidRedirectLocation => "invalid_redirect_location",
            Self::RedirectLimitExceeded => "redirect_limit_exceeded",
        }
    }
}

#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
    #[error("transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("interceptor {interceptor} panicked: {message}")]
    InterceptorPanic {
        interceptor: &'static str,
        message: String,
    },
    #[error("redirect response {status} carries an unusable location header for {method} {uri}")]
    MissingRedirectLocation {
        status: u16,
        method: Method,
        uri: String,
    },
    #[error("invalid redirect location {location} for {method} {uri}")]
    InvalidRedirectLocation {
        location: String,
        method: Method,
        uri: String,
    },
    #[error("redirect limit exceeded ({max_redirects}) for {method} {uri}")]
    RedirectLimitExceeded {
        max_redirects: usize,
        method: Method,
        uri: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { .. } => ErrorCode::Configuration,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::InterceptorPanic { .. } => ErrorCode::InterceptorPanic,
            Self::MissingRedirectLocation { .. } => ErrorCode::MissingRedirectLocation,
            Self::InvalidRedirectLocation { .. } => ErrorCode::InvalidRedirectLocation,
            Self::RedirectLimitExceeded { .. } => ErrorCode::RedirectLimitExceeded,
        }
    }

    /// Builds an [`Error::Transport`] from a plain message when the transport
    /// has no richer cause to attach.
    pub fn transport(
        kind: TransportErrorKind,
        method: Method,
        uri: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            kind,
            method,
            uri: uri.into(),
            source: message.into().into(),
        }
    }
}
