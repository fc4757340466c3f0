use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_core::{CallError, OperationDescriptor, RemoteFault, Value};
use switchboard_fabric::codec::BincodeCodec;
use switchboard_fabric::frame::{ClientFrame, Hello, ServerFrame};
use switchboard_fabric::transport::{TcpTransport, Transport, UnixTransport};
use switchboard_fabric::{Channel, Error as FabricError};
use tokio::sync::Notify;

use crate::channel::{ChannelFactory, ChannelState, DuplexCallback, OpenRequest, RemoteChannel};
use crate::endpoint::{EndpointAddress, SecurityMode, TransportKind};

/// Opens channels over the switchboard fabric (TCP or Unix sockets)
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricChannelFactory;

impl FabricChannelFactory {
    pub fn new() -> Self {
        Self
    }
}

fn connect_error(address: &EndpointAddress, e: FabricError) -> CallError {
    if e.is_unreachable() {
        CallError::EndpointNotFound(format!("{}: {}", address, e))
    } else {
        call_error(e)
    }
}

fn call_error(e: FabricError) -> CallError {
    match e {
        FabricError::Timeout(stage) => CallError::Timeout(stage.to_string()),
        FabricError::Codec(msg) => CallError::Codec(msg),
        FabricError::ConnectionClosed => CallError::communication("connection closed by peer"),
        other => CallError::communication(other.to_string()),
    }
}

async fn connect(request: &OpenRequest<'_>) -> Result<Box<dyn Transport>, FabricError> {
    let binding = &request.endpoint.binding;
    let address = &request.endpoint.address;

    match address.transport {
        TransportKind::Tcp => {
            let addr = tokio::net::lookup_host(address.authority.as_str())
                .await?
                .next()
                .ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve")
                })?;
            let transport = TcpTransport::builder()
                .address(addr)
                .connect_timeout(binding.connect_timeout())
                .options(binding.transport_options())
                .connect()
                .await?;
            Ok(Box::new(transport))
        }
        TransportKind::Unix => {
            let transport = UnixTransport::builder()
                .path(&address.path)
                .connect_timeout(binding.connect_timeout())
                .options(binding.transport_options())
                .connect()
                .await?;
            Ok(Box::new(transport))
        }
    }
}

#[async_trait::async_trait]
impl ChannelFactory for FabricChannelFactory {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Arc<dyn RemoteChannel>, CallError> {
        let endpoint = request.endpoint;
        if endpoint.binding.transport != endpoint.address.transport {
            return Err(CallError::InvalidArgument(format!(
                "binding transport {:?} cannot reach {}",
                endpoint.binding.transport, endpoint.address
            )));
        }

        let transport = connect(&request)
            .await
            .map_err(|e| connect_error(&endpoint.address, e))?;
        let codec = BincodeCodec::with_limit(endpoint.binding.max_frame_len as u64);
        let mut conn = Channel::from_boxed(transport, codec);

        let secure = endpoint.binding.security == SecurityMode::Transport;
        let credentials = request.credentials;
        let hello = ClientFrame::Hello(Hello {
            contract: request.contract.to_string(),
            path: endpoint.address.path.clone(),
            identity: credentials.identity.clone(),
            secret: credentials.secret.clone().filter(|_| secure),
            impersonation: credentials.impersonation,
            secure,
            duplex: request.is_duplex(),
        });

        let reply: ServerFrame = conn.exchange(&hello).await.map_err(call_error)?;
        match reply {
            ServerFrame::Welcome => {}
            ServerFrame::Rejected { reason } => {
                let _ = conn.close().await;
                return Err(CallError::SecurityNegotiation(reason));
            }
            other => {
                let _ = conn.close().await;
                return Err(CallError::communication(format!(
                    "unexpected handshake reply: {:?}",
                    other
                )));
            }
        }

        Ok(Arc::new(FabricChannel {
            conn: tokio::sync::Mutex::new(Some(conn)),
            state: Mutex::new(ChannelState::Open),
            aborted: Notify::new(),
            callback: request.callback,
            next_id: AtomicU64::new(1),
        }))
    }
}

/// Call channel over one fabric connection
///
/// Calls are serialised on the connection. On duplex channels, callbacks
/// arriving while a call is outstanding are answered in line. Aborting
/// drops the connection and fails the outstanding call, if any.
pub struct FabricChannel {
    conn: tokio::sync::Mutex<Option<Channel<BincodeCodec>>>,
    state: Mutex<ChannelState>,
    aborted: Notify,
    callback: Option<Arc<dyn DuplexCallback>>,
    next_id: AtomicU64,
}

impl FabricChannel {
    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    /// Record a connection-level failure; the channel is not reused after it
    fn fault(&self, e: FabricError) -> CallError {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Open {
                *state = ChannelState::Faulted;
            }
        }
        call_error(e)
    }

    async fn exchange(
        &self,
        conn: &mut Channel<BincodeCodec>,
        operation: &OperationDescriptor,
        args: &mut [Value],
    ) -> Result<Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let call = ClientFrame::Call {
            id,
            operation: operation.name.clone(),
            args: args.to_vec(),
        };
        conn.send(&call).await.map_err(|e| self.fault(e))?;

        loop {
            let frame: ServerFrame = conn.receive().await.map_err(|e| self.fault(e))?;
            match frame {
                ServerFrame::Reply { id: reply_id, outcome } if reply_id == id => {
                    let reply = outcome.map_err(CallError::Fault)?;
                    for (index, param) in operation.params.iter().enumerate() {
                        if !param.direction.is_returned() {
                            continue;
                        }
                        if let Some(slot) = args.get_mut(index) {
                            *slot = reply.args.get(index).cloned().unwrap_or_default();
                        }
                    }
                    return Ok(reply.value);
                }
                ServerFrame::Callback {
                    id: callback_id,
                    operation: name,
                    args: callback_args,
                } => {
                    let outcome = self.dispatch_callback(&name, callback_args).await;
                    let reply = ClientFrame::CallbackReply {
                        id: callback_id,
                        outcome,
                    };
                    conn.send(&reply).await.map_err(|e| self.fault(e))?;
                }
                other => {
                    return Err(self.fault(FabricError::Protocol(format!(
                        "expected reply to call {}, got {:?}",
                        id, other
                    ))));
                }
            }
        }
    }

    async fn dispatch_callback(&self, operation: &str, args: Vec<Value>) -> Result<Value, RemoteFault> {
        match &self.callback {
            Some(callback) => callback.on_call(operation, args).await,
            None => Err(RemoteFault::generic(format!(
                "callback '{}' sent to a channel without a callback object",
                operation
            ))),
        }
    }
}

#[async_trait::async_trait]
impl RemoteChannel for FabricChannel {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    async fn invoke(&self, operation: &OperationDescriptor, args: &mut [Value]) -> Result<Value, CallError> {
        let mut guard = self.conn.lock().await;
        let aborted = self.aborted.notified();
        tokio::pin!(aborted);
        aborted.as_mut().enable();

        let outcome = match guard.as_mut() {
            Some(conn) if self.state() == ChannelState::Open => {
                tokio::select! {
                    outcome = self.exchange(conn, operation, args) => outcome,
                    _ = &mut aborted => Err(CallError::ChannelClosed),
                }
            }
            _ => Err(CallError::ChannelClosed),
        };

        if self.state() == ChannelState::Closed {
            guard.take();
        }
        outcome
    }

    async fn close(&self) -> Result<(), CallError> {
        self.set_state(ChannelState::Closing);
        let conn = self.conn.lock().await.take();
        let result = match conn {
            Some(mut conn) => {
                let _ = conn.send(&ClientFrame::Goodbye).await;
                conn.close().await.map_err(call_error)
            }
            None => Ok(()),
        };
        self.set_state(ChannelState::Closed);
        result
    }

    fn abort(&self) {
        self.set_state(ChannelState::Closed);
        self.aborted.notify_waiters();
        // an outstanding call drops the connection itself once it wakes
        if let Ok(mut conn) = self.conn.try_lock() {
            conn.take();
        }
    }
}
