use std::sync::Arc;

use switchboard_core::{ContractDescriptor, ContractId};

use crate::interceptor::ServiceProxy;

/// Ties a contract trait to its descriptor and forwarding stub
///
/// `Service` is the trait object callers hold (for example
/// `dyn TestService`). `stub` wraps a [`ServiceProxy`] in a type that
/// implements that trait by forwarding each method to
/// [`ServiceProxy::invoke`].
///
/// ```ignore
/// struct TestServiceContract;
///
/// impl Contract for TestServiceContract {
///     type Service = dyn TestService;
///
///     fn descriptor() -> ContractDescriptor {
///         ContractDescriptor::new("ITestService")
///             .operation(OperationDescriptor::new("IsAlive").returns("bool"))
///     }
///
///     fn stub(proxy: Arc<ServiceProxy>) -> Arc<dyn TestService> {
///         Arc::new(TestServiceStub(proxy))
///     }
/// }
/// ```
pub trait Contract: Send + Sync + 'static {
    type Service: ?Sized + Send + Sync + 'static;

    fn descriptor() -> ContractDescriptor;

    fn stub(proxy: Arc<ServiceProxy>) -> Arc<Self::Service>;

    fn id() -> ContractId {
        Self::descriptor().id
    }
}
