use std::fmt::{self, Display};
use std::io;

/// Provides `SimError` and maps other errors to
/// convert to a `SimError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum SimError {
    /// An invalid run configuration. Detected before any generation is computed and never
    /// retried.
    ConfigurationError(String),
    /// A grid access outside `[0, size)`.
    IndexError {
        row: usize,
        col: usize,
        size: usize,
    },
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    ImageError(image::ImageError),
}

impl SimError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::ConfigurationError(message.into())
    }
}

impl From<io::Error> for SimError {
    fn from(error: io::Error) -> Self {
        SimError::IoError(error)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(error: serde_json::Error) -> Self {
        SimError::JsonError(error)
    }
}

impl From<csv::Error> for SimError {
    fn from(error: csv::Error) -> Self {
        SimError::CSVError(error)
    }
}

impl From<image::ImageError> for SimError {
    fn from(error: image::ImageError) -> Self {
        SimError::ImageError(error)
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::IoError(error) => Some(error),
            SimError::JsonError(error) => Some(error),
            SimError::CSVError(error) => Some(error),
            SimError::ImageError(error) => Some(error),
            SimError::ConfigurationError(_) | SimError::IndexError { .. } => None,
        }
    }
}

impl Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::ConfigurationError(message) => write!(f, "configuration error: {message}"),
            SimError::IndexError { row, col, size } => write!(
                f,
                "index error: cell ({row}, {col}) is outside a {size}x{size} grid"
            ),
            SimError::IoError(error) => write!(f, "io error: {error}"),
            SimError::JsonError(error) => write!(f, "json error: {error}"),
            SimError::CSVError(error) => write!(f, "csv error: {error}"),
            SimError::ImageError(error) => write!(f, "image error: {error}"),
        }
    }
}
