use std::net::SocketAddr;

use thiserror::Error;
use valet::ValetError;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Valet(#[from] ValetError),

    #[error("Failed to install log subscriber: {0}")]
    Logging(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to encode scan summary: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
