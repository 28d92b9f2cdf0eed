use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for spheredb operations.
///
/// Each kind describes one category of failure so callers can react precisely
/// (e.g. retry a batch after a [`ErrorKind::ConcurrentModification`], or fix the
/// argument that caused a [`ErrorKind::Misuse`]).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// An illegal argument (non-positive range, k < 1, bad configuration knob, ...)
    Misuse,
    /// A read or write operation disallowed by the configured read/write mode
    ModeViolation,
    /// A structural or metric invariant was broken (NaN distance, two staged roots, ...)
    Invariant,
    /// A transaction or iterator detected that the tree changed underneath it
    ConcurrentModification,
    /// An operation was attempted in the wrong lifecycle state (e.g. results before execute)
    State,
    /// An error raised by the storage backend or the codec layer, propagated unchanged
    Backend,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Misuse => write!(f, "Misuse"),
            ErrorKind::ModeViolation => write!(f, "Mode violation"),
            ErrorKind::Invariant => write!(f, "Invariant violation"),
            ErrorKind::ConcurrentModification => write!(f, "Concurrent modification"),
            ErrorKind::State => write!(f, "Illegal state"),
            ErrorKind::Backend => write!(f, "Backend error"),
        }
    }
}

/// Custom spheredb error type.
///
/// `SphereError` carries the error message, its [`ErrorKind`], and an optional
/// cause. A backtrace is captured at construction time for debugging; it is
/// shared behind an `Arc` so errors stay cheap to clone.
///
/// # Examples
///
/// ```rust,ignore
/// use spheredb::errors::{ErrorKind, SphereError, SphereResult};
///
/// fn reject(k: usize) -> SphereResult<()> {
///     Err(SphereError::new("k must be at least 1", ErrorKind::Misuse))
/// }
/// ```
#[derive(Clone)]
pub struct SphereError {
    message: String,
    kind: ErrorKind,
    cause: Option<Box<SphereError>>,
    backtrace: Arc<Backtrace>,
}

impl SphereError {
    /// Creates a new `SphereError` with the specified message and error kind.
    pub fn new(message: &str, kind: ErrorKind) -> Self {
        SphereError {
            message: message.to_string(),
            kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `SphereError` with a cause error, preserving the chain for
    /// debugging.
    pub fn new_with_cause(message: &str, kind: ErrorKind, cause: SphereError) -> Self {
        SphereError {
            message: message.to_string(),
            kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn cause(&self) -> Option<&SphereError> {
        self.cause.as_deref()
    }
}

impl Display for SphereError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for SphereError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for SphereError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for spheredb operations.
///
/// All fallible spheredb operations return this type.
pub type SphereResult<T> = Result<T, SphereError>;

// From trait implementations for automatic error conversion

impl From<std::string::FromUtf8Error> for SphereError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        SphereError::new(&format!("UTF-8 decoding error: {}", err), ErrorKind::Backend)
    }
}

impl From<String> for SphereError {
    fn from(msg: String) -> Self {
        SphereError::new(&msg, ErrorKind::Invariant)
    }
}

impl From<&str> for SphereError {
    fn from(msg: &str) -> Self {
        SphereError::new(msg, ErrorKind::Invariant)
    }
}
