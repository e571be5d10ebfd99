//! Error types for terrain streaming

use thiserror::Error;

use crate::terrain::BlueprintId;

/// Main error type for the terrain streamer
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed noise blueprint, rejected before any session is started
    #[error("Construction error: {0}")]
    Construction(String),

    #[error("Blueprint {0} has not been buffered")]
    NotBuffered(BlueprintId),

    /// The buffered lattice was sampled through a different input transform
    #[error("Blueprint {0} changed since it was buffered")]
    StaleBuffer(BlueprintId),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Streaming error: {0}")]
    Streaming(String),
}
