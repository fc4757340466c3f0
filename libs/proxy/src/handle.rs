use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_core::{CallError, ContractId};

use crate::channel::{ChannelFactory, ChannelState, DuplexCallback, OpenRequest, RemoteChannel};
use crate::credentials::ClientCredentials;
use crate::endpoint::ResolvedEndpoint;

/// Owns the lazily created remote channel of one contract binding
///
/// The channel is opened on first [`acquire`](Self::acquire) and reopened
/// whenever it is no longer `Open`. At most one live channel exists per
/// handle: a stale channel is released before its replacement is opened.
pub struct ChannelHandle {
    contract: ContractId,
    endpoint: ResolvedEndpoint,
    credentials: ClientCredentials,
    callback: Option<Arc<dyn DuplexCallback>>,
    factory: Arc<dyn ChannelFactory>,
    current: Mutex<Option<Arc<dyn RemoteChannel>>>,
    open_gate: tokio::sync::Mutex<()>,
    opened: AtomicU64,
}

impl ChannelHandle {
    pub fn new(contract: ContractId, endpoint: ResolvedEndpoint, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            contract,
            endpoint,
            credentials: ClientCredentials::default(),
            callback: None,
            factory,
            current: Mutex::new(None),
            open_gate: tokio::sync::Mutex::new(()),
            opened: AtomicU64::new(0),
        }
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Make the handle duplex: `callback` receives server-initiated calls
    pub fn with_callback(mut self, callback: Arc<dyn DuplexCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub fn is_duplex(&self) -> bool {
        self.callback.is_some()
    }

    /// Number of channels this handle has opened so far
    pub fn opened_channels(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ChannelState {
        self.current
            .lock()
            .as_ref()
            .map_or(ChannelState::Unopened, |channel| channel.state())
    }

    fn live(&self) -> Option<Arc<dyn RemoteChannel>> {
        self.current
            .lock()
            .as_ref()
            .filter(|channel| channel.state() == ChannelState::Open)
            .cloned()
    }

    /// Return the live channel, opening a new one if the current one is not `Open`
    pub async fn acquire(&self) -> Result<Arc<dyn RemoteChannel>, CallError> {
        if let Some(channel) = self.live() {
            return Ok(channel);
        }

        let _gate = self.open_gate.lock().await;
        if let Some(channel) = self.live() {
            return Ok(channel);
        }

        if let Some(stale) = self.current.lock().take() {
            tracing::debug!(
                contract = %self.contract,
                state = ?stale.state(),
                "Replacing channel"
            );
            stale.abort();
        }

        let channel = self
            .factory
            .open(OpenRequest {
                contract: &self.contract,
                endpoint: &self.endpoint,
                credentials: &self.credentials,
                callback: self.callback.clone(),
            })
            .await?;

        let generation = self.opened.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            contract = %self.contract,
            address = %self.endpoint.address,
            duplex = self.is_duplex(),
            generation,
            "Channel opened"
        );
        *self.current.lock() = Some(channel.clone());
        Ok(channel)
    }

    /// Drop the current channel without waiting for the remote side
    pub fn abort(&self) {
        if let Some(channel) = self.current.lock().take() {
            channel.abort();
        }
    }

    /// Close the current channel, aborting it if the close fails or times out
    ///
    /// Never fails; a faulted channel is aborted straight away.
    pub async fn release(&self) {
        let Some(channel) = self.current.lock().take() else {
            return;
        };

        if channel.state() == ChannelState::Faulted {
            channel.abort();
            return;
        }

        let limit = self.endpoint.binding.close_timeout();
        match tokio::time::timeout(limit, channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(contract = %self.contract, error = %e, "Close failed, aborting channel");
                channel.abort();
            }
            Err(_) => {
                tracing::warn!(contract = %self.contract, ?limit, "Close timed out, aborting channel");
                channel.abort();
            }
        }
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("contract", &self.contract)
            .field("address", &self.endpoint.address)
            .field("duplex", &self.is_duplex())
            .field("state", &self.state())
            .finish()
    }
}
