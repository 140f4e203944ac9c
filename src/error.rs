//! Error types shared by the pipeline stages.
//!
//! Fatal stage errors are [`PipelineError`]; per-zone failures are carried as
//! data (see [`crate::batch::BatchOutcome`]) so a batch keeps going.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Fatal error for a pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    /// The boundary could not be resolved to a usable polygon.
    Boundary(String),
    /// Gridding produced no zones after clipping and sliver removal.
    NoZones,
    /// Every zone failed in a stage that needs at least one.
    NothingProcessed(&'static str),
    /// An input table is missing or lacks required columns.
    Schema {
        /// Table path.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },
    /// Invalid configuration.
    Config(String),
    /// Filesystem error.
    Io(io::Error),
    /// CSV read/write error.
    Csv(csv::Error),
    /// JSON read/write error.
    Json(serde_json::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boundary(msg) => write!(f, "boundary unresolved: {msg}"),
            Self::NoZones => write!(f, "grid produced zero zones"),
            Self::NothingProcessed(stage) => write!(f, "{stage}: no zones processed"),
            Self::Schema { path, message } => {
                write!(f, "schema error in \"{}\": {message}", path.display())
            }
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Csv(e) => write!(f, "csv error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Convenience alias for stage results.
pub type Result<T> = std::result::Result<T, PipelineError>;
