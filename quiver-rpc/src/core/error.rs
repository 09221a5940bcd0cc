use std::fmt::Display;

use thiserror::Error;

/// General RPC error codes surfaced to callers.
///
/// Every error returned out of the runtime maps to exactly one code, so that
/// transports and middleware can classify failures without parsing message
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The call was cancelled by the caller.
    Cancelled,
    /// The failure could not be classified.
    Unknown,
    /// The caller supplied an invalid request.
    InvalidArgument,
    /// The call's deadline expired before it completed.
    DeadlineExceeded,
    /// A referenced resource was not found.
    NotFound,
    /// A bounded resource was exhausted.
    ResourceExhausted,
    /// The system is not in a state required for the operation.
    FailedPrecondition,
    /// The requested operation is not implemented.
    Unimplemented,
    /// The service is currently unavailable; the call may be retried.
    Unavailable,
    /// An invariant inside the runtime was broken.
    Internal,
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid-argument",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::NotFound => "not-found",
            Self::ResourceExhausted => "resource-exhausted",
            Self::FailedPrecondition => "failed-precondition",
            Self::Unimplemented => "unimplemented",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// An error produced by the runtime, carrying one of the general RPC codes.
///
/// The message is the full caller-facing text. The original cause, when there
/// is one, is preserved as the error source.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    code: Code,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RpcError {
    /// Creates a new error with the given code and message.
    pub fn new<S>(code: Code, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause of the error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        self.source = Some(source.into());
        self
    }

    /// The code classifying this error.
    pub fn code(&self) -> Code {
        self.code
    }

    /// The caller-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }
}

/// Extracts the RPC code from an error.
///
/// Errors that did not originate from the runtime classify as [`Code::Unknown`].
pub fn error_code(error: &anyhow::Error) -> Code {
    match error.downcast_ref::<RpcError>() {
        Some(error) => error.code(),
        None => Code::Unknown,
    }
}
