//! # Domain Errors
//!
//! Error taxonomy for the engine:
//!
//! | Kind | Type | Surfaced? |
//! |------|------|-----------|
//! | Network failure | [`SourceError::Network`] | No, replaced by synthetic data |
//! | Upstream application error | [`FetchError`] | Yes |
//! | Validation error | [`RangeError`] | Yes, never sent upstream |
//! | Data anomaly | corrected in `algorithms` | No, logged only |

use std::fmt;

use thiserror::Error;

/// Which bound of a slot window failed to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeField {
    Start,
    End,
}

impl fmt::Display for RangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeField::Start => f.write_str("start"),
            RangeField::End => f.write_str("end"),
        }
    }
}

/// Slot window validation errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    /// A bound is not a non-negative integer.
    #[error("{field} slot must be a non-negative integer, got {input:?}")]
    InvalidBound { field: RangeField, input: String },

    /// Start is after end.
    #[error("start must be ≤ end (start {start}, end {end})")]
    StartAfterEnd { start: u64, end: u64 },

    /// Window exceeds the allowed span.
    #[error("range of {span} slots exceeds the maximum of {max}")]
    SpanTooLarge { span: u64, max: u64 },
}

impl RangeError {
    /// The field a form should highlight for this error.
    pub fn field(&self) -> RangeField {
        match self {
            RangeError::InvalidBound { field, .. } => *field,
            RangeError::StartAfterEnd { .. } => RangeField::Start,
            RangeError::SpanTooLarge { .. } => RangeField::End,
        }
    }
}

/// Errors reported by an upstream source adapter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No response arrived: connection refused, DNS failure, timeout.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Network-class failures are masked by synthetic data.
    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Network(_))
    }
}

/// Result type for source adapters.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors the resilient fetch client surfaces to its callers.
///
/// Network failures never appear here.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Server reachable but answered with an error.
    #[error("{operation} failed with HTTP {status}: {message}")]
    Upstream {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// Server answered with a body that does not match the schema.
    #[error("{operation} returned an unreadable payload: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Invalid engine configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API base URL must not be empty")]
    EmptyBaseUrl,

    #[error("invalid API base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_error_messages() {
        let err = RangeError::StartAfterEnd { start: 50, end: 10 };
        assert!(err.to_string().contains("start must be ≤ end"));
        assert_eq!(err.field(), RangeField::Start);

        let err = RangeError::InvalidBound {
            field: RangeField::End,
            input: "abc".into(),
        };
        assert!(err.to_string().starts_with("end slot"));
    }

    #[test]
    fn test_source_error_classification() {
        assert!(SourceError::Network("refused".into()).is_network());
        assert!(!SourceError::Status {
            status: 500,
            message: "boom".into()
        }
        .is_network());
        assert!(!SourceError::Decode("eof".into()).is_network());
    }
}
