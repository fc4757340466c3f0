use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportOptions};

/// Length-prefixed framing over any byte stream
///
/// Messages are sent with a 4-byte big-endian length prefix
#[derive(Debug)]
pub struct FramedStream<S> {
    pub(crate) stream: S,
    pub(crate) options: TransportOptions,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    /// Wrap a connected stream
    pub fn new(stream: S, options: TransportOptions) -> Self {
        Self { stream, options }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

async fn bounded<T>(
    limit: Option<Duration>,
    stage: &'static str,
    op: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| Error::Timeout(stage))?,
        None => op.await,
    }
}

fn eof_as_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}

#[async_trait::async_trait]
impl<S> Transport for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.options.max_frame_len {
            return Err(Error::InvalidFrame(format!(
                "Message too large: {} bytes",
                bytes.len()
            )));
        }

        let stream = &mut self.stream;
        bounded(self.options.send_timeout, "Send", async move {
            stream.write_u32(bytes.len() as u32).await?;
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok(())
        })
        .await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let max = self.options.max_frame_len;
        let stream = &mut self.stream;
        bounded(self.options.receive_timeout, "Receive", async move {
            let len = stream.read_u32().await.map_err(eof_as_closed)? as usize;
            if len > max {
                return Err(Error::InvalidFrame(format!(
                    "Message too large: {} bytes",
                    len
                )));
            }

            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await.map_err(eof_as_closed)?;
            Ok(buf)
        })
        .await
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
