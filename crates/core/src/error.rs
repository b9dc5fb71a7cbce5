//! Error types for Rivulet collections.

use alloc::string::String;
use core::fmt;

/// Result type alias for Rivulet operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for change capture, observable collections and operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An argument combination that can never be valid, such as an `Update`
    /// change without a previous value.
    InvalidArgument {
        message: String,
    },
    /// Positional access outside the bounds of an ordered collection.
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    /// An upstream source terminated with an error.
    Upstream {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { message } => {
                write!(f, "Invalid argument: {}", message)
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for length {}", index, len)
            }
            Error::Upstream { message } => {
                write!(f, "Upstream error: {}", message)
            }
        }
    }
}

impl core::error::Error for Error {}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an index out of range error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }

    /// Creates an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Error::Upstream {
            message: message.into(),
        }
    }

    /// Returns true if this error was raised by an upstream source.
    #[inline]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream { .. })
    }
}
