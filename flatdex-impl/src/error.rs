use std::fmt;

/// Errors surfaced by a flat map index.
///
/// Errors are memoized by the index and handed back on every later query,
/// so they are cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The host's function library could not be cloned while building the
    /// execution context. The index is poisoned.
    EnvironmentClone(String),
    /// Raised by the source sequence's iterator.
    SourceIteration(String),
    /// Raised while instantiating or running the mapping function.
    FunctionInvocation(String),
    /// The mapping function returned something other than a single scalar
    /// variant value.
    InvalidShape(String),
    /// A variant value did not hold a sequence.
    Decode(String),
    /// The execution context was cancelled.
    Cancelled,
}

impl Error {
    pub fn source_iteration(msg: impl Into<String>) -> Self {
        Error::SourceIteration(msg.into())
    }

    pub fn function_invocation(msg: impl Into<String>) -> Self {
        Error::FunctionInvocation(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EnvironmentClone(msg) => {
                write!(f, "Could not clone the function library: {}", msg)
            }
            Error::SourceIteration(msg) => write!(f, "Source sequence failed: {}", msg),
            Error::FunctionInvocation(msg) => write!(f, "Mapping function failed: {}", msg),
            Error::InvalidShape(msg) => write!(f, "{}", msg),
            Error::Decode(msg) => write!(f, "Could not decode sequence: {}", msg),
            Error::Cancelled => write!(f, "Operation was cancelled"),
        }
    }
}

impl std::error::Error for Error {}
