use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use crate::error::{Error, Result};
use crate::transport::{FramedStream, TransportListener, TransportOptions};

/// Unix domain socket transport with length-prefix framing
pub type UnixTransport = FramedStream<UnixStream>;

impl FramedStream<UnixStream> {
    /// Connect to a Unix socket with no timeouts
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).connect().await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> UnixTransportBuilder {
        UnixTransportBuilder::new()
    }

    /// Create from an existing UnixStream
    pub fn from_stream(stream: UnixStream) -> Self {
        Self::new(stream, TransportOptions::default())
    }
}

/// Unix socket listener for accepting incoming connections
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path, replacing a stale socket file
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(UnixTransport::from_stream(stream))
    }

    /// Get the path this listener is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the socket file
    pub async fn close(&mut self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl TransportListener for UnixTransportListener {
    type Transport = UnixTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        UnixTransportListener::accept(self).await
    }

    async fn close(&mut self) -> Result<()> {
        UnixTransportListener::close(self).await
    }
}

/// Builder for configuring Unix socket transport
#[derive(Default)]
pub struct UnixTransportBuilder {
    path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    options: TransportOptions,
}

impl UnixTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path to connect to
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the receive timeout
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.options.receive_timeout = Some(timeout);
        self
    }

    /// Replace all per-connection limits at once
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<UnixTransport> {
        let path = self
            .path
            .ok_or_else(|| Error::Custom("Path not set".to_string()))?;

        let connect_op = UnixStream::connect(path);

        let stream = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::Timeout("Connect"))??
        } else {
            connect_op.await?
        };

        Ok(FramedStream::new(stream, self.options))
    }
}
