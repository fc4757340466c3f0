use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{FramedStream, TransportListener, TransportOptions};

/// TCP transport with length-prefix framing
pub type TcpTransport = FramedStream<TcpStream>;

impl FramedStream<TcpStream> {
    /// Connect to a remote TCP address with no timeouts
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    /// Connect with a connect timeout
    pub async fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        Self::builder()
            .address(addr)
            .connect_timeout(timeout)
            .connect()
            .await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    /// Create from an existing TcpStream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self::new(stream, TransportOptions::default())
    }

    /// Get the remote address of this connection
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    /// Get the local address of this connection
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }
}

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream), addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        let (transport, _) = TcpTransportListener::accept(self).await?;
        Ok(transport)
    }

    /// Tokio's TcpListener closes on drop; nothing to do here
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builder for configuring TCP transport
#[derive(Default)]
pub struct TcpTransportBuilder {
    address: Option<SocketAddr>,
    connect_timeout: Option<Duration>,
    options: TransportOptions,
}

impl TcpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to connect to
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.send_timeout = Some(timeout);
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
    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;

        let connect_op = TcpStream::connect(addr);

        let stream = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::Timeout("Connect"))??
        } else {
            connect_op.await?
        };
        stream.set_nodelay(true)?;

        Ok(FramedStream::new(stream, self.options))
    }
}
