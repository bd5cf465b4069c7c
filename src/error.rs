use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("URL has no usable file name: {url}")]
    MissingFileName { url: String },
}

pub type Result<T> = std::result::Result<T, Error>;
