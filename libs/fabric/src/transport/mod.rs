use std::time::Duration;

use crate::error::Result;

pub mod framed;
pub mod tcp;
pub mod unix;

pub use self::framed::FramedStream;
pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportBuilder, UnixTransportListener};

/// Largest frame accepted unless configured otherwise (100MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send bytes over the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive bytes from the transport
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}

/// Listener producing one transport per accepted connection
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport;

    async fn accept(&self) -> Result<Self::Transport>;

    async fn close(&mut self) -> Result<()>;
}

/// Per-connection limits shared by every stream transport
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub send_timeout: Option<Duration>,
    pub receive_timeout: Option<Duration>,
    pub max_frame_len: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            send_timeout: None,
            receive_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
