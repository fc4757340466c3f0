use std::sync::Arc;

use switchboard_core::{CallError, ContractId, OperationDescriptor, RemoteFault, Value};

use crate::credentials::ClientCredentials;
use crate::endpoint::ResolvedEndpoint;

/// Connection state of a remote channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Open,
    Faulted,
    Closing,
    Closed,
}

impl ChannelState {
    /// Whether the channel must be replaced before the next call
    pub fn needs_replacement(self) -> bool {
        self != ChannelState::Open
    }
}

/// Live connection used to make calls for one contract
#[async_trait::async_trait]
pub trait RemoteChannel: Send + Sync {
    fn state(&self) -> ChannelState;

    /// Invoke `operation`, writing output and by-reference values back into `args`
    async fn invoke(&self, operation: &OperationDescriptor, args: &mut [Value]) -> Result<Value, CallError>;

    /// Close gracefully
    async fn close(&self) -> Result<(), CallError>;

    /// Tear down immediately without waiting for the remote side
    fn abort(&self);
}

/// Receives calls initiated by the server on a duplex channel
#[async_trait::async_trait]
pub trait DuplexCallback: Send + Sync {
    async fn on_call(&self, operation: &str, args: Vec<Value>) -> Result<Value, RemoteFault>;
}

/// Everything a factory needs to open a channel
pub struct OpenRequest<'a> {
    pub contract: &'a ContractId,
    pub endpoint: &'a ResolvedEndpoint,
    pub credentials: &'a ClientCredentials,
    pub callback: Option<Arc<dyn DuplexCallback>>,
}

impl OpenRequest<'_> {
    pub fn is_duplex(&self) -> bool {
        self.callback.is_some()
    }
}

/// Opens remote channels from binding and address configuration
#[async_trait::async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Arc<dyn RemoteChannel>, CallError>;
}
