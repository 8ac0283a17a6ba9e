//! Error taxonomy for the trivia server
//!
//! Only startup errors (`ConfigError`, `ServerError::BindFailure`) are fatal.
//! `ConnectionError` never escapes a connection worker: it is logged and the
//! participant is removed.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use trivia_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Binding to {addr} was unsuccessful: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error(transparent)]
    MalformedMessage(#[from] ProtocolError),
    #[error("no HI received within {0:?}")]
    JoinTimeout(Duration),
    #[error("session already started")]
    SessionStarted,
}
