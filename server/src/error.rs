use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server full ({max} players)")]
    ServerFull { max: usize },
    #[error("server loop already running")]
    AlreadyRunning,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
