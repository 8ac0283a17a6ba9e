use std::io;
use std::path::PathBuf;
use thiserror::Error;
use trivia_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("File {} does not exist", path.display())]
    ConfigMissing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("invalid server address {0:?}, expected host:port")]
    InvalidAddress(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
