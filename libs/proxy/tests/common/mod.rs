#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use switchboard_core::{CallError, ContractDescriptor, ContractId, OperationDescriptor, Value};
use switchboard_proxy::{
    BindingConfig, ChannelFactory, ChannelHandle, ChannelState, EndpointAddress, OpenRequest,
    RemoteChannel, ResolvedEndpoint, ServiceProxy,
};

/// What a scripted channel does for one call
pub enum Step {
    /// Succeed, writing `(slot, value)` pairs into the argument vector
    Return(Value, Vec<(usize, Value)>),
    /// Fail, leaving the channel open
    Fail(CallError),
    /// Fail and mark the channel faulted
    Fault(CallError),
}

/// Call observed by a scripted channel
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub channel: u64,
    pub operation: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
pub struct Script {
    steps: Mutex<VecDeque<Step>>,
    open_failures: Mutex<VecDeque<CallError>>,
    seen: Mutex<Vec<Seen>>,
    opened: AtomicU64,
    duplex_opens: AtomicU64,
    close_delay: Mutex<Option<Duration>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn fail_next_open(&self, error: CallError) {
        self.open_failures.lock().push_back(error);
    }

    pub fn slow_close(&self, delay: Duration) {
        *self.close_delay.lock() = Some(delay);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn duplex_opens(&self) -> u64 {
        self.duplex_opens.load(Ordering::SeqCst)
    }
}

pub struct ScriptedFactory(pub Arc<Script>);

#[async_trait::async_trait]
impl ChannelFactory for ScriptedFactory {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Arc<dyn RemoteChannel>, CallError> {
        if let Some(error) = self.0.open_failures.lock().pop_front() {
            return Err(error);
        }
        if request.is_duplex() {
            self.0.duplex_opens.fetch_add(1, Ordering::SeqCst);
        }
        let id = self.0.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(ScriptedChannel {
            id,
            script: self.0.clone(),
            state: Mutex::new(ChannelState::Open),
        }))
    }
}

pub struct ScriptedChannel {
    id: u64,
    script: Arc<Script>,
    state: Mutex<ChannelState>,
}

#[async_trait::async_trait]
impl RemoteChannel for ScriptedChannel {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    async fn invoke(&self, operation: &OperationDescriptor, args: &mut [Value]) -> Result<Value, CallError> {
        self.script.seen.lock().push(Seen {
            channel: self.id,
            operation: operation.name.clone(),
            args: args.to_vec(),
        });
        let step = self.script.steps.lock().pop_front();
        match step {
            Some(Step::Return(value, writes)) => {
                for (slot, written) in writes {
                    args[slot] = written;
                }
                Ok(value)
            }
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Fault(error)) => {
                *self.state.lock() = ChannelState::Faulted;
                Err(error)
            }
            None => Err(CallError::communication("script exhausted")),
        }
    }

    async fn close(&self) -> Result<(), CallError> {
        let delay = *self.script.close_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.state.lock() = ChannelState::Closed;
        Ok(())
    }

    fn abort(&self) {
        *self.state.lock() = ChannelState::Closed;
    }
}

pub fn test_contract() -> ContractDescriptor {
    ContractDescriptor::new("ITestService")
        .operation(OperationDescriptor::new("IsAlive").returns("bool"))
        .operation(OperationDescriptor::new("Echo").input("text").returns("string"))
        .operation(OperationDescriptor::new("TryParse").input("a").output("b").returns("bool"))
        .operation(OperationDescriptor::new("Bump").by_ref("counter"))
}

pub fn endpoint() -> ResolvedEndpoint {
    ResolvedEndpoint {
        binding: BindingConfig {
            close_timeout_ms: 50,
            ..BindingConfig::default()
        },
        address: EndpointAddress::tcp("localhost:8731", "/TestService"),
        configuration: None,
    }
}

pub fn handle(script: &Arc<Script>) -> ChannelHandle {
    ChannelHandle::new(
        ContractId::new("ITestService"),
        endpoint(),
        Arc::new(ScriptedFactory(script.clone())),
    )
}

pub fn proxy(script: &Arc<Script>) -> ServiceProxy {
    ServiceProxy::new(Arc::new(test_contract()), handle(script))
}
