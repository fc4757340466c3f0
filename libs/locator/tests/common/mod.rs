#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use switchboard_core::{CallError, ContractDescriptor, OperationDescriptor, Value};
use switchboard_locator::{
    Catalog, ClientConfig, ConfigError, ConfigSource, LoadMode, MockObject, ServiceLocator, StaticConfig,
};
use switchboard_proxy::{
    ChannelFactory, ChannelState, Contract, OpenRequest, RemoteChannel, ServiceProxy,
};

#[async_trait]
pub trait Greeter: Send + Sync {
    async fn greet(&self, name: &str) -> Result<String, CallError>;
}

pub struct GreeterContract;

impl Contract for GreeterContract {
    type Service = dyn Greeter;

    fn descriptor() -> ContractDescriptor {
        ContractDescriptor::new("IGreeter")
            .operation(OperationDescriptor::new("Greet").input("name").returns("string"))
    }

    fn stub(proxy: Arc<ServiceProxy>) -> Arc<dyn Greeter> {
        Arc::new(GreeterStub(proxy))
    }
}

struct GreeterStub(Arc<ServiceProxy>);

#[async_trait]
impl Greeter for GreeterStub {
    async fn greet(&self, name: &str) -> Result<String, CallError> {
        self.0.call("Greet", vec![name.into()]).await
    }
}

#[derive(Default)]
pub struct LocalGreeter;

#[async_trait]
impl Greeter for LocalGreeter {
    async fn greet(&self, name: &str) -> Result<String, CallError> {
        Ok(format!("local hello, {name}"))
    }
}

#[derive(Default)]
pub struct GreeterMock;

impl MockObject for GreeterMock {
    type Contract = GreeterContract;

    fn mock_object(&self) -> Option<Arc<dyn Greeter>> {
        Some(Arc::new(CannedGreeter))
    }
}

struct CannedGreeter;

#[async_trait]
impl Greeter for CannedGreeter {
    async fn greet(&self, _name: &str) -> Result<String, CallError> {
        Ok("mock hello".to_string())
    }
}

/// Mock whose accessor comes up empty
#[derive(Default)]
pub struct HollowGreeterMock;

impl MockObject for HollowGreeterMock {
    type Contract = GreeterContract;

    fn mock_object(&self) -> Option<Arc<dyn Greeter>> {
        None
    }
}

#[async_trait]
pub trait Clock: Send + Sync {
    async fn now(&self) -> Result<i64, CallError>;
}

pub struct ClockContract;

impl Contract for ClockContract {
    type Service = dyn Clock;

    fn descriptor() -> ContractDescriptor {
        ContractDescriptor::new("IClock").operation(OperationDescriptor::new("Now").returns("i64"))
    }

    fn stub(proxy: Arc<ServiceProxy>) -> Arc<dyn Clock> {
        Arc::new(ClockStub(proxy))
    }
}

struct ClockStub(Arc<ServiceProxy>);

#[async_trait]
impl Clock for ClockStub {
    async fn now(&self) -> Result<i64, CallError> {
        self.0.call("Now", vec![]).await
    }
}

pub struct FrozenClock(pub i64);

#[async_trait]
impl Clock for FrozenClock {
    async fn now(&self) -> Result<i64, CallError> {
        Ok(self.0)
    }
}

pub fn catalog() -> Catalog {
    Catalog::new()
        .contract::<GreeterContract>()
        .contract::<ClockContract>()
        .concrete::<GreeterContract, _>("LocalGreeter", || Arc::new(LocalGreeter))
        .concrete::<ClockContract, _>("FrozenClock", || Arc::new(FrozenClock(42)))
        .mock::<GreeterMock>("GreeterMock")
        .mock::<HollowGreeterMock>("HollowGreeterMock")
}

pub fn config() -> ClientConfig {
    let mut config = ClientConfig::default()
        .with_server("appserver", 8731)
        .with_load_mode(LoadMode::Lenient);
    config.retry.initial_backoff_ms = 0;
    config.retry.max_backoff_ms = 0;
    config
}

/// Remote calls answer from a shared queue; an empty queue answers "hello"
#[derive(Default)]
pub struct Remote {
    replies: Mutex<VecDeque<Result<Value, CallError>>>,
    opened: AtomicU64,
    calls: AtomicU64,
}

impl Remote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Result<Value, CallError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct RemoteFactory(pub Arc<Remote>);

#[async_trait]
impl ChannelFactory for RemoteFactory {
    async fn open(&self, _request: OpenRequest<'_>) -> Result<Arc<dyn RemoteChannel>, CallError> {
        let id = self.0.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(RemoteChannelDouble {
            id,
            remote: self.0.clone(),
            state: Mutex::new(ChannelState::Open),
        }))
    }
}

struct RemoteChannelDouble {
    id: u64,
    remote: Arc<Remote>,
    state: Mutex<ChannelState>,
}

#[async_trait]
impl RemoteChannel for RemoteChannelDouble {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    async fn invoke(&self, _operation: &OperationDescriptor, _args: &mut [Value]) -> Result<Value, CallError> {
        self.remote.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.remote.replies.lock().pop_front();
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(error)) => {
                *self.state.lock() = ChannelState::Faulted;
                Err(error)
            }
            None => Ok(Value::from(format!("hello from channel {}", self.id))),
        }
    }

    async fn close(&self) -> Result<(), CallError> {
        *self.state.lock() = ChannelState::Closed;
        Ok(())
    }

    fn abort(&self) {
        *self.state.lock() = ChannelState::Closed;
    }
}

pub fn locator(config: ClientConfig, remote: &Arc<Remote>) -> ServiceLocator {
    ServiceLocator::builder(catalog(), StaticConfig(config))
        .channel_factory(Arc::new(RemoteFactory(remote.clone())))
        .build()
}

/// Configuration the test can swap between reloads
#[derive(Clone, Default)]
pub struct SharedConfig(pub Arc<Mutex<ClientConfig>>);

impl SharedConfig {
    pub fn new(config: ClientConfig) -> Self {
        Self(Arc::new(Mutex::new(config)))
    }

    pub fn set(&self, config: ClientConfig) {
        *self.0.lock() = config;
    }
}

impl ConfigSource for SharedConfig {
    fn load(&self) -> Result<ClientConfig, ConfigError> {
        Ok(self.0.lock().clone())
    }

    fn describe(&self) -> String {
        "shared".to_string()
    }
}

pub fn shared_locator(source: &SharedConfig, remote: &Arc<Remote>) -> ServiceLocator {
    ServiceLocator::builder(catalog(), source.clone())
        .channel_factory(Arc::new(RemoteFactory(remote.clone())))
        .build()
}
