//! Error types for sensor-line parsing in waymark-types.

use thiserror::Error;

/// Errors that can occur when parsing sensor-link text.
///
/// This error type is transport-agnostic and does not include
/// link or storage errors (those belong in waymark-core).
///
/// Every variant carries the cleaned input line so failures can be
/// surfaced verbatim for diagnostics.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// None of the known wire formats matched the line.
    #[error("Unparseable sensor line: {0:?}")]
    Unparseable(String),

    /// Coordinates were present but read 0,0 — the receiver's no-fix sentinel.
    #[error("No GPS fix in line: {0:?}")]
    NoFix(String),

    /// A coordinate was present but not a finite number.
    #[error("Non-finite coordinate in line: {0:?}")]
    NonFiniteCoordinate(String),
}

impl ParseError {
    /// The cleaned input line the failure refers to.
    pub fn line(&self) -> &str {
        match self {
            ParseError::Unparseable(line)
            | ParseError::NoFix(line)
            | ParseError::NonFiniteCoordinate(line) => line,
        }
    }
}

/// Result type alias using waymark-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
