//! Switchboard Proxy - Per-contract call interception and channel lifecycle
//!
//! A [`ServiceProxy`] stands between a caller and a remote channel. It owns
//! a [`ChannelHandle`] that opens the channel lazily and reopens it whenever
//! it is no longer usable, classifies every call failure, and reports
//! transient faults to a subscribed [`FaultHandler`] that may ask for the
//! call to be retried.
//!
//! Contracts are plain traits; a forwarding stub implements the trait over
//! a `ServiceProxy`, and [`Contract`] ties the two together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_core::{ContractDescriptor, OperationDescriptor};
//! use switchboard_proxy::{
//!     BindingConfig, ChannelHandle, EndpointSource, FabricChannelFactory, NamedEndpoints,
//!     ServerAddress, ServiceProxy,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = ContractDescriptor::new("ITestService")
//!     .operation(OperationDescriptor::new("IsAlive").returns("bool"));
//! let endpoint = EndpointSource::Default {
//!     binding: BindingConfig::default(),
//!     server: ServerAddress::new("localhost", 8731),
//! }
//! .resolve(&descriptor.id, &NamedEndpoints::new())?;
//!
//! let handle = ChannelHandle::new(descriptor.id.clone(), endpoint, Arc::new(FabricChannelFactory));
//! let proxy = ServiceProxy::new(Arc::new(descriptor), handle);
//! let _alive: bool = proxy.call("IsAlive", vec![]).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod contract;
pub mod credentials;
pub mod endpoint;
pub mod fabric;
pub mod handle;
pub mod interceptor;

// Re-exports for convenience
pub use channel::{ChannelFactory, ChannelState, DuplexCallback, OpenRequest, RemoteChannel};
pub use contract::Contract;
pub use credentials::{ClientCredentials, ImpersonationLevel};
pub use endpoint::{
    BindingConfig, EndpointAddress, EndpointError, EndpointSource, NamedEndpoint, NamedEndpoints,
    ResolvedEndpoint, SecurityMode, ServerAddress, TransportKind,
};
pub use fabric::{FabricChannel, FabricChannelFactory};
pub use handle::ChannelHandle;
pub use interceptor::{
    CallOutcome, FaultHandler, FaultNotification, ProxyId, RetryPolicy, ServiceProxy,
};
