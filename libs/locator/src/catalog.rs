use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use switchboard_core::{ContractDescriptor, ContractId};
use switchboard_proxy::{Contract, ServiceProxy};

use crate::error::MappingErrorKind;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identity of one bound instance, stable across clones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// How an instance came to be bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKind {
    /// Forwarding stub over a fault-capable remote proxy
    Remote,
    /// Named local implementation
    Concrete(String),
    /// Object produced by a named mock
    Mock(String),
    /// Handed to the locator directly
    Direct,
}

/// A contract implementation held by the locator
///
/// The service is stored type-erased as the `Arc<C::Service>` callers
/// receive, so every resolve of the same binding hands out the same object.
#[derive(Clone)]
pub struct Instance {
    id: InstanceId,
    contract: ContractId,
    kind: InstanceKind,
    service: Arc<dyn Any + Send + Sync>,
    proxy: Option<Arc<ServiceProxy>>,
}

impl Instance {
    pub fn new<C: Contract>(kind: InstanceKind, service: Arc<C::Service>) -> Self {
        Self {
            id: InstanceId::next(),
            contract: C::id(),
            kind,
            service: Arc::new(service),
            proxy: None,
        }
    }

    /// Wrap `proxy` in the contract's forwarding stub
    pub fn remote<C: Contract>(proxy: Arc<ServiceProxy>) -> Self {
        Self {
            id: InstanceId::next(),
            contract: proxy.contract().clone(),
            kind: InstanceKind::Remote,
            service: Arc::new(C::stub(proxy.clone())),
            proxy: Some(proxy),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn kind(&self) -> &InstanceKind {
        &self.kind
    }

    /// The proxy behind a remote instance; `None` for local ones
    pub fn proxy(&self) -> Option<&Arc<ServiceProxy>> {
        self.proxy.as_ref()
    }

    pub fn is_fault_capable(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn downcast<C: Contract>(&self) -> Option<Arc<C::Service>> {
        self.service.downcast_ref::<Arc<C::Service>>().cloned()
    }

    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.service, &other.service)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("contract", &self.contract)
            .field("kind", &self.kind)
            .field("proxy", &self.proxy.as_ref().map(|p| p.id()))
            .finish()
    }
}

/// A type that fabricates a stand-in object for one contract
///
/// The accessor may come up empty, which fails the mapping entry that
/// named this mock.
pub trait MockObject: Send + Sync + 'static {
    type Contract: Contract;

    fn mock_object(&self) -> Option<Arc<<Self::Contract as Contract>::Service>>;
}

type StubFactory = Arc<dyn Fn(Arc<ServiceProxy>) -> Instance + Send + Sync>;
type LocalFactory = Arc<dyn Fn() -> Option<Instance> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct ContractRegistration {
    pub descriptor: Arc<ContractDescriptor>,
    pub stub: StubFactory,
}

#[derive(Clone)]
struct LocalRegistration {
    contract: ContractId,
    build: LocalFactory,
}

/// Every contract, concrete implementation and mock a mapping entry may name
///
/// Names in the mapping table are looked up here; nothing is discovered at
/// runtime.
#[derive(Clone, Default)]
pub struct Catalog {
    contracts: HashMap<ContractId, ContractRegistration>,
    concretes: HashMap<String, LocalRegistration>,
    mocks: HashMap<String, LocalRegistration>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `C` resolvable, bound to a remote proxy by default
    pub fn contract<C: Contract>(mut self) -> Self {
        let descriptor = Arc::new(C::descriptor());
        self.contracts.insert(
            descriptor.id.clone(),
            ContractRegistration {
                descriptor,
                stub: Arc::new(Instance::remote::<C>),
            },
        );
        self
    }

    /// Register a concrete implementation of `C` under `name`
    ///
    /// `factory` runs each time an entry naming it is loaded or repaired.
    pub fn concrete<C, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        C: Contract,
        F: Fn() -> Arc<C::Service> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.concretes.insert(
            name,
            LocalRegistration {
                contract: C::id(),
                build: Arc::new(move || {
                    Some(Instance::new::<C>(InstanceKind::Concrete(label.clone()), factory()))
                }),
            },
        );
        self
    }

    /// Register mock `M` under `name`
    pub fn mock<M>(mut self, name: impl Into<String>) -> Self
    where
        M: MockObject + Default,
    {
        let name = name.into();
        let label = name.clone();
        self.mocks.insert(
            name,
            LocalRegistration {
                contract: <M::Contract as Contract>::id(),
                build: Arc::new(move || {
                    M::default().mock_object().map(|service| {
                        Instance::new::<M::Contract>(InstanceKind::Mock(label.clone()), service)
                    })
                }),
            },
        );
        self
    }

    pub fn contains(&self, contract: &ContractId) -> bool {
        self.contracts.contains_key(contract)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractId> {
        self.contracts.keys()
    }

    pub(crate) fn registration(&self, contract: &ContractId) -> Result<&ContractRegistration, MappingErrorKind> {
        self.contracts
            .get(contract)
            .ok_or(MappingErrorKind::UnknownContract)
    }

    pub(crate) fn build_concrete(&self, name: &str, contract: &ContractId) -> Result<Instance, MappingErrorKind> {
        let registration = self
            .concretes
            .get(name)
            .ok_or_else(|| MappingErrorKind::UnknownConcrete(name.to_string()))?;
        if registration.contract != *contract {
            return Err(MappingErrorKind::ConcreteMismatch {
                concrete: name.to_string(),
                actual: registration.contract.clone(),
            });
        }
        (registration.build)().ok_or_else(|| MappingErrorKind::UnknownConcrete(name.to_string()))
    }

    pub(crate) fn build_mock(&self, name: &str, contract: &ContractId) -> Result<Instance, MappingErrorKind> {
        let registration = self
            .mocks
            .get(name)
            .ok_or_else(|| MappingErrorKind::UnknownMock(name.to_string()))?;
        if registration.contract != *contract {
            return Err(MappingErrorKind::MockAccessorMissing {
                mock: name.to_string(),
                actual: registration.contract.clone(),
            });
        }
        (registration.build)().ok_or_else(|| MappingErrorKind::MockReturnedNone(name.to_string()))
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("contracts", &self.contracts.keys().collect::<Vec<_>>())
            .field("concretes", &self.concretes.keys().collect::<Vec<_>>())
            .field("mocks", &self.mocks.keys().collect::<Vec<_>>())
            .finish()
    }
}
