//! Unified error handling for the pace-predictor library.
//!
//! Data-quality problems (short streams, outliers, unknown categories) never
//! surface here: extraction and training degrade to smaller or empty training
//! sets instead. Errors are reserved for contract violations and for the
//! storage layer.

use std::fmt;

/// Unified error type for pace-predictor operations.
#[derive(Debug, Clone)]
pub enum PredictionError {
    /// Stored parameters disagree with the declared column configuration
    SchemaMismatch {
        expected_features: usize,
        actual_features: usize,
    },
    /// Invalid configuration or invalid call (e.g. fitting on an empty set)
    ConfigError { message: String },
    /// The regression solver failed
    TrainingFailed { message: String },
    /// Route point table is malformed
    InvalidRoute { message: String },
    /// Persistence/storage error
    PersistenceError { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::SchemaMismatch {
                expected_features,
                actual_features,
            } => {
                write!(
                    f,
                    "stored coefficients have {} features, column configuration expects {}",
                    actual_features, expected_features
                )
            }
            PredictionError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            PredictionError::TrainingFailed { message } => {
                write!(f, "Training failed: {}", message)
            }
            PredictionError::InvalidRoute { message } => {
                write!(f, "Invalid route: {}", message)
            }
            PredictionError::PersistenceError { message } => {
                write!(f, "Persistence error: {}", message)
            }
            PredictionError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for PredictionError {}

/// Result type alias for pace-predictor operations.
pub type Result<T> = std::result::Result<T, PredictionError>;

impl PredictionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        PredictionError::ConfigError {
            message: message.into(),
        }
    }

    pub(crate) fn training(message: impl Into<String>) -> Self {
        PredictionError::TrainingFailed {
            message: message.into(),
        }
    }

    pub(crate) fn route(message: impl Into<String>) -> Self {
        PredictionError::InvalidRoute {
            message: message.into(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for PredictionError {
    fn from(err: rusqlite::Error) -> Self {
        PredictionError::PersistenceError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for PredictionError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PredictionError::PersistenceError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for PredictionError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        PredictionError::PersistenceError {
            message: err.to_string(),
        }
    }
}
