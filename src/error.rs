use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to read config {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("{detector} model not found at {} and no download url is configured", .path.display())]
    ModelMissing {
        detector: &'static str,
        path: PathBuf,
    },
}
