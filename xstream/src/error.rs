//! Error type shared by the send and receive views.

use core::fmt;

/// Failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stream was already read to its end marker.
    Closed,
    /// `send` was called after the channel was closed.
    SendOnClosed,
    /// The reader loop has shut down, or there is no runtime to bind to.
    ReaderUnavailable,
}

/// Error returned by memory stream operations.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// True for send-side failures, including a reader loop that is gone.
    pub fn is_send_on_closed(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::SendOnClosed | ErrorKind::ReaderUnavailable
        )
    }

    /// True when a consumed stream was iterated again.
    pub fn is_closed(&self) -> bool {
        self.kind == ErrorKind::Closed
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Closed => write!(f, "Memory stream already consumed"),
            ErrorKind::SendOnClosed => write!(f, "Send on closed channel"),
            ErrorKind::ReaderUnavailable => write!(f, "Reader loop unavailable"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> std::io::Error {
        let kind = match err.kind {
            ErrorKind::Closed | ErrorKind::SendOnClosed => std::io::ErrorKind::BrokenPipe,
            ErrorKind::ReaderUnavailable => std::io::ErrorKind::NotConnected,
        };
        std::io::Error::new(kind, err)
    }
}

/// Result alias for memory stream operations.
pub type Result<T> = core::result::Result<T, Error>;
