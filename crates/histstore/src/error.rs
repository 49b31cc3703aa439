//! Error types for histstore

use std::fmt;
use std::io;

/// Result type alias for histstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for container and index operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Malformed container bytes
    Parse(String),

    /// Container version this reader does not understand
    UnsupportedVersion(u32),

    /// Key not present in the container
    NotFound(String),

    /// Key exists but does not hold a histogram
    NotAHistogram(String),

    /// Grid dimensions rejected
    InvalidGrid(String),

    /// Unknown scan order name
    InvalidOrder(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::UnsupportedVersion(v) => {
                write!(f, "Unsupported container version: {} (expected 1)", v)
            }
            Error::NotFound(key) => write!(f, "Key not found: {}", key),
            Error::NotAHistogram(key) => write!(f, "Key is not a histogram: {}", key),
            Error::InvalidGrid(msg) => write!(f, "Invalid grid: {}", msg),
            Error::InvalidOrder(order) => write!(
                f,
                "Invalid scan order: '{}' (use 'ieta-major' or 'iphi-major')",
                order
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::Parse("unexpected end of input".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::Parse(format!("{:?} at {} bytes from end", e.code, e.input.len()))
            }
        }
    }
}
