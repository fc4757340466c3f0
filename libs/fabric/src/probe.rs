use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

/// Check whether a TCP connection to `target` can be made within `timeout`
///
/// Name resolution counts against the timeout. The probe connection is
/// dropped as soon as it is established; every failure reads as `false`.
pub async fn has_tcp_connection(target: impl ToSocketAddrs, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "connectivity probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(?timeout, "connectivity probe timed out");
            false
        }
    }
}
