use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GshError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to start `{program}` for {label}: {source}")]
    Spawn {
        label: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output stream error for {label}: {message}")]
    Stream { label: String, message: String },

    #[error("{label} did not finish within {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("{label} was interrupted by shutdown")]
    Interrupted { label: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Catalog request failed: {0}")]
    CatalogRequest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GshError>;
