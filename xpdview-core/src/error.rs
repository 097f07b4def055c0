//! Error types for xpdview-core.

use thiserror::Error;

/// Result type alias for xpdview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for xpdview operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Region of interest violates its ordering or detector bounds.
    #[error("invalid region of interest: {0}")]
    InvalidRoi(String),

    /// Region of interest does not fit inside an image.
    #[error("region of interest {roi} exceeds image {rows}x{cols} (key: {key})")]
    RoiOutOfImage {
        roi: String,
        key: String,
        rows: usize,
        cols: usize,
    },

    /// Statistic name missing from the registry.
    #[error("no statistic named '{0}' in the registry")]
    UnknownStatistic(String),

    /// Statistic name already registered under the reject policy.
    #[error("statistic '{0}' is already registered")]
    DuplicateStatistic(String),

    /// Exposure key already present in a store.
    #[error("exposure '{0}' is already stored")]
    DuplicateKey(String),

    /// Two sequences that must line up do not.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Patterns of differing lengths where a common grid is required.
    #[error("shape mismatch for '{key}': expected {expected} points, got {actual}")]
    ShapeMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Operation requires at least one input.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Azimuthal integration failed.
    #[error("integration error: {0}")]
    Integration(String),

    /// A user-registered reducer failed.
    #[error("reducer '{name}' failed: {message}")]
    Reducer { name: String, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
