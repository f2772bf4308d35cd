//! Error types for dynrest.

/// Result type alias for dynrest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dynrest operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error was raised while constructing a request,
    /// before any operation existed (missing template token, malformed
    /// query string during signing, bad configuration).
    pub fn is_construction(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Template(_) | ErrorKind::Signing(_) | ErrorKind::Config(_)
        )
    }

    /// Returns true if this error came from the transport or the remote
    /// protocol (non-200 status, connection failure, timeout, cancellation).
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Http { .. }
                | ErrorKind::Connection(_)
                | ErrorKind::Timeout
                | ErrorKind::Cancelled
        )
    }

    /// Returns true if this error came from decoding a response body.
    pub fn is_decode(&self) -> bool {
        matches!(self.kind, ErrorKind::Decode(_))
    }

    /// Returns the HTTP status code if this is a protocol error.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Http { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// URI template could not be expanded (e.g. a token named a parameter
    /// that is not in the bag).
    #[error("Template error: {0}")]
    Template(String),

    /// Request signing failed (e.g. malformed query string).
    #[error("Signing error: {0}")]
    Signing(String),

    /// The remote answered with a non-200 status.
    #[error("HTTP error: {status} {message}")]
    Http { status: u16, message: String },

    /// Connection error with no usable response.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Response body could not be decoded in the configured content mode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Wrong invocation arity under a strict client.
    #[error("Argument error: {0}")]
    Argument(String),

    /// The operation was cancelled before a response arrived.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            ErrorKind::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ErrorKind::Other(err.to_string())
        };

        Error::with_source(kind, err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::Config(format!("Invalid URL: {}", err)), err)
    }
}
