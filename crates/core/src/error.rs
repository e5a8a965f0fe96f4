//! Error types for GeoPrep

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for GeoPrep operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Input error: {0}")]
    Input(String),

    #[error("CRS error: {0}")]
    Crs(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Resource limit exceeded: {0}")]
    Resource(String),
}

impl Error {
    /// Short classification tag, used in batch summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Input(_) => "input",
            Error::Crs(_) => "crs",
            Error::Geometry(_) => "geometry",
            Error::Io(_) | Error::Write { .. } => "io",
            Error::Resource(_) => "resource",
        }
    }
}

/// Result type alias for GeoPrep operations
pub type Result<T> = std::result::Result<T, Error>;
