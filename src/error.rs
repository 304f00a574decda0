//! Unified error handling for the trail-analytics library.
//!
//! Only conditions the caller must act on are errors. Missing timestamps and
//! malformed geometry are soft conditions: the affected fields resolve to
//! `None` (or contribute zero) and the computation carries on.

use std::fmt;

/// Unified error type for trail-analytics operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TrailError {
    /// Not enough paired numeric samples to fit a grade-adjustment model
    InsufficientData {
        available: usize,
        minimum_required: usize,
        message: String,
    },
    /// Fitted model cannot be normalised or the normal equations are singular
    DegenerateModel { message: String },
    /// Analysis configuration is out of range
    InvalidConfig { message: String },
    /// JSON serialization failed
    Serialization { message: String },
}

impl fmt::Display for TrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailError::InsufficientData {
                available,
                minimum_required,
                message,
            } => {
                write!(
                    f,
                    "Insufficient data: {} valid samples, minimum {} required ({})",
                    available, minimum_required, message
                )
            }
            TrailError::DegenerateModel { message } => {
                write!(f, "Degenerate grade-adjustment model: {}", message)
            }
            TrailError::InvalidConfig { message } => {
                write!(f, "Configuration error: {}", message)
            }
            TrailError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrailError {}

impl From<serde_json::Error> for TrailError {
    fn from(err: serde_json::Error) -> Self {
        TrailError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trail-analytics operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option to TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an insufficient data error.
    fn ok_or_insufficient_data(self, available: usize, minimum: usize, message: &str)
        -> Result<T>;

    /// Convert Option to Result with a degenerate model error.
    fn ok_or_degenerate(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_data(
        self,
        available: usize,
        minimum: usize,
        message: &str,
    ) -> Result<T> {
        self.ok_or_else(|| TrailError::InsufficientData {
            available,
            minimum_required: minimum,
            message: message.to_string(),
        })
    }

    fn ok_or_degenerate(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::DegenerateModel {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrailError::InsufficientData {
            available: 3,
            minimum_required: 5,
            message: "reference dataset".to_string(),
        };
        assert!(err.to_string().contains("3 valid samples"));
        assert!(err.to_string().contains("minimum 5"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_insufficient_data(0, 5, "empty");
        assert!(matches!(result, Err(TrailError::InsufficientData { .. })));

        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_degenerate("singular"),
            Err(TrailError::DegenerateModel { .. })
        ));
    }
}
