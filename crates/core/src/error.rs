use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetscopeError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Relay failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Config parse error in {path}: {reason}")]
    ConfigFailed { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetscopeError>;
