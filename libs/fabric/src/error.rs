use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{0} timeout exceeded")]
    Timeout(&'static str),

    #[error("Unexpected message: {0}")]
    Protocol(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Whether the failure happened before a connection existed
    pub fn is_unreachable(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::AddrNotAvailable
            ),
            Error::Timeout(stage) => *stage == "Connect",
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
