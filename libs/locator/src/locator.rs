use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use switchboard_core::ContractId;
use switchboard_fabric::has_tcp_connection;
use switchboard_proxy::{
    ChannelFactory, ChannelHandle, Contract, EndpointSource, FabricChannelFactory, FaultHandler,
    FaultNotification, ServiceProxy,
};

use crate::catalog::{Catalog, Instance, InstanceId, InstanceKind};
use crate::config::{ClientConfig, ConfigSource, LoadMode};
use crate::error::{LocatorError, MappingError, MappingErrorKind, Result};
use crate::mapping::{MappingEntry, Resolution};

/// What a fault repair did to the faulted contract's binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The binding was rebuilt from its mapping entry
    Repaired { replacement: InstanceId },
    /// Another fault already replaced the faulted instance
    AlreadyRepaired { current: InstanceId },
    /// The contract has no binding, or the locator is shut down
    Unbound,
    /// Rebuilding failed; the faulted binding stays in place
    Failed(MappingError),
}

impl RepairOutcome {
    pub fn is_repaired(&self) -> bool {
        matches!(self, RepairOutcome::Repaired { .. } | RepairOutcome::AlreadyRepaired { .. })
    }
}

/// Decides whether a faulted call is retried once the locator has repaired
/// (or failed to repair) its binding
pub type RetryDecision = Arc<dyn Fn(&FaultNotification, &RepairOutcome) -> bool + Send + Sync>;

/// Retry exactly when the contract ended up with a fresh binding
pub fn retry_when_repaired() -> RetryDecision {
    Arc::new(|_: &FaultNotification, outcome: &RepairOutcome| outcome.is_repaired())
}

/// A contract's current instance and the entry it was built from
#[derive(Debug, Clone)]
pub struct Binding {
    pub instance: Instance,
    /// `None` for instances registered directly without a mapping entry
    pub entry: Option<Arc<MappingEntry>>,
}

/// Summary of a successful reload
#[derive(Debug, Clone, Default)]
pub struct ReloadReport {
    pub generation: u64,
    pub bound: Vec<ContractId>,
    /// Entries skipped in lenient mode
    pub skipped: Vec<MappingError>,
}

#[derive(Default)]
struct Registry {
    generation: u64,
    loaded: bool,
    shut_down: bool,
    config: Arc<ClientConfig>,
    bindings: HashMap<ContractId, Arc<Binding>>,
}

impl Registry {
    fn with_binding(&self, contract: ContractId, binding: Arc<Binding>) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.insert(contract, binding);
        Self {
            generation: self.generation,
            loaded: self.loaded,
            shut_down: self.shut_down,
            config: self.config.clone(),
            bindings,
        }
    }
}

struct Inner {
    catalog: Catalog,
    source: Box<dyn ConfigSource>,
    factory: Arc<dyn ChannelFactory>,
    retry_decision: RetryDecision,
    registry: ArcSwap<Registry>,
    /// Serializes every change to the binding table
    write_lock: Mutex<()>,
}

/// Fault subscription tying one remote instance back to the locator
struct Subscription {
    locator: Weak<Inner>,
    instance: InstanceId,
}

impl FaultHandler for Subscription {
    fn on_fault(&self, notification: &mut FaultNotification) {
        let Some(inner) = self.locator.upgrade() else {
            return;
        };
        let outcome = inner.repair(&notification.contract, Some(self.instance));
        notification.retry = (inner.retry_decision)(notification, &outcome);
        tracing::debug!(
            contract = %notification.contract,
            attempt = notification.attempt,
            retry = notification.retry,
            ?outcome,
            "Fault handled"
        );
    }
}

/// Builds a [`ServiceLocator`]
pub struct LocatorBuilder {
    catalog: Catalog,
    source: Box<dyn ConfigSource>,
    factory: Arc<dyn ChannelFactory>,
    retry_decision: RetryDecision,
}

impl LocatorBuilder {
    /// Channel factory for remote bindings; defaults to [`FabricChannelFactory`]
    pub fn channel_factory(mut self, factory: Arc<dyn ChannelFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn retry_decision<F>(mut self, decision: F) -> Self
    where
        F: Fn(&FaultNotification, &RepairOutcome) -> bool + Send + Sync + 'static,
    {
        self.retry_decision = Arc::new(decision);
        self
    }

    /// Create the locator without loading the mapping table
    pub fn build(self) -> ServiceLocator {
        ServiceLocator {
            inner: Arc::new(Inner {
                catalog: self.catalog,
                source: self.source,
                factory: self.factory,
                retry_decision: self.retry_decision,
                registry: ArcSwap::from_pointee(Registry::default()),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Create the locator and load the mapping table
    pub fn create(self) -> Result<ServiceLocator> {
        let locator = self.build();
        locator.reload()?;
        Ok(locator)
    }
}

/// Maps contracts to live instances
///
/// Resolution reads an immutable snapshot of the binding table and never
/// blocks. Reloads, registrations and fault repairs swap in a new snapshot
/// under one lock, so concurrent repairs of the same contract leave exactly
/// one binding behind.
#[derive(Clone)]
pub struct ServiceLocator {
    inner: Arc<Inner>,
}

impl ServiceLocator {
    pub fn builder(catalog: Catalog, source: impl ConfigSource + 'static) -> LocatorBuilder {
        LocatorBuilder {
            catalog,
            source: Box::new(source),
            factory: Arc::new(FabricChannelFactory::new()),
            retry_decision: retry_when_repaired(),
        }
    }

    /// Create a locator over the fabric transport and load its mapping table
    pub fn create(catalog: Catalog, source: impl ConfigSource + 'static) -> Result<Self> {
        Self::builder(catalog, source).create()
    }

    /// Re-read the configuration and rebuild the whole binding table
    ///
    /// Bad entries are skipped and reported in lenient mode; in strict mode
    /// any bad entry fails the reload and the previous table stays active.
    /// Instances bound by the previous table stop receiving repairs but keep
    /// working for callers still holding them.
    pub fn reload(&self) -> Result<ReloadReport> {
        self.inner.reload()
    }

    /// The instance bound to contract `C`
    ///
    /// Repeated calls return the same object until the binding is replaced.
    pub fn resolve<C: Contract>(&self) -> Result<Arc<C::Service>> {
        let contract = C::id();
        let instance = self.resolve_instance(&contract)?;
        instance
            .downcast::<C>()
            .ok_or(LocatorError::ContractMismatch(contract))
    }

    pub fn resolve_instance(&self, contract: &ContractId) -> Result<Instance> {
        let registry = self.inner.registry.load();
        if registry.shut_down {
            return Err(LocatorError::ShutDown);
        }
        registry
            .bindings
            .get(contract)
            .map(|binding| binding.instance.clone())
            .ok_or_else(|| LocatorError::Unresolved(contract.clone()))
    }

    /// Bind `instance` to its contract, replacing any existing binding
    ///
    /// Remote instances are subscribed for fault repair. The mapping entry
    /// for the contract, if any, is remembered for later rebuilds. Fails
    /// with [`LocatorError::ShutDown`] once the locator is shut down.
    pub fn register_instance(&self, instance: Instance) -> Result<()> {
        self.inner.register(instance, None)
    }

    /// Bind a local implementation of `C`
    pub fn register_service<C: Contract>(&self, service: Arc<C::Service>) -> Result<Instance> {
        let instance = Instance::new::<C>(InstanceKind::Direct, service);
        self.inner.register(instance.clone(), None)?;
        Ok(instance)
    }

    /// Bind `contract` to a fresh remote proxy on the default server
    pub fn register_default(&self, contract: &ContractId) -> Result<Instance> {
        let registry = self.inner.registry.load_full();
        if registry.shut_down {
            return Err(LocatorError::ShutDown);
        }
        let config = registry.config.clone();
        let entry = Arc::new(MappingEntry::remote(contract.as_str()));
        let instance = self
            .inner
            .build_remote(&entry, &config)
            .map_err(|kind| MappingError::new(contract.as_str(), kind))?;
        self.inner.register(instance.clone(), Some(entry))?;
        Ok(instance)
    }

    /// Rebuild `contract`'s binding after a fault
    ///
    /// With `faulted` given, nothing happens unless that instance is still
    /// the current binding. This is what the fault subscription of every
    /// remote instance calls.
    pub fn repair(&self, contract: &ContractId, faulted: Option<InstanceId>) -> RepairOutcome {
        self.inner.repair(contract, faulted)
    }

    pub fn binding(&self, contract: &ContractId) -> Option<Arc<Binding>> {
        self.inner.registry.load().bindings.get(contract).cloned()
    }

    pub fn bindings(&self) -> Vec<(ContractId, InstanceKind)> {
        let registry = self.inner.registry.load();
        let mut bindings: Vec<_> = registry
            .bindings
            .iter()
            .map(|(contract, binding)| (contract.clone(), binding.instance.kind().clone()))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Number of successful reloads so far
    pub fn generation(&self) -> u64 {
        self.inner.registry.load().generation
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.registry.load().loaded
    }

    pub fn config(&self) -> Arc<ClientConfig> {
        self.inner.registry.load().config.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Whether the configured default server accepts TCP connections
    pub async fn probe_server(&self, timeout: Duration) -> bool {
        let Some(server) = self.config().server.clone() else {
            tracing::debug!("No server configured, probe skipped");
            return false;
        };
        has_tcp_connection((server.name.as_str(), server.port), timeout).await
    }

    /// Drop every binding and close the remote channels behind them
    ///
    /// Resolution fails with [`LocatorError::ShutDown`] until the next
    /// successful reload.
    pub async fn shutdown(&self) {
        let previous = {
            let _guard = self.inner.write_lock.lock();
            let current = self.inner.registry.load_full();
            self.inner.registry.store(Arc::new(Registry {
                generation: current.generation,
                loaded: false,
                shut_down: true,
                config: current.config.clone(),
                bindings: HashMap::new(),
            }));
            current
        };

        for binding in previous.bindings.values() {
            if let Some(proxy) = binding.instance.proxy() {
                proxy.unsubscribe();
                proxy.release().await;
            }
        }
        tracing::info!(released = previous.bindings.len(), "Locator shut down");
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.load();
        f.debug_struct("ServiceLocator")
            .field("source", &self.inner.source.describe())
            .field("generation", &registry.generation)
            .field("bindings", &registry.bindings.len())
            .field("shut_down", &registry.shut_down)
            .finish()
    }
}

impl Inner {
    fn reload(self: &Arc<Self>) -> Result<ReloadReport> {
        let config = Arc::new(self.source.load()?);
        let table = config.mapping_table();
        for contract in table.duplicates() {
            tracing::warn!(%contract, "Contract mapped more than once, last entry wins");
        }

        let _guard = self.write_lock.lock();
        let mut bindings: HashMap<ContractId, Arc<Binding>> = HashMap::new();
        let mut skipped = Vec::new();

        for entry in table.entries() {
            match self.build(entry, &config) {
                Ok(instance) => {
                    let binding = Arc::new(Binding {
                        instance,
                        entry: Some(entry.clone()),
                    });
                    bindings.insert(entry.contract_id(), binding);
                }
                Err(kind) => {
                    let error = MappingError::new(entry.contract.as_str(), kind);
                    tracing::warn!(source = %self.source.describe(), %error, "Skipping mapping entry");
                    skipped.push(error);
                }
            }
        }

        if !skipped.is_empty() && config.load_mode == LoadMode::Strict {
            return Err(LocatorError::Configuration(skipped));
        }

        for binding in bindings.values() {
            self.subscribe(&binding.instance);
        }

        let generation = self.registry.load().generation + 1;
        let mut bound: Vec<ContractId> = bindings.keys().cloned().collect();
        bound.sort();

        let previous = self.registry.swap(Arc::new(Registry {
            generation,
            loaded: true,
            shut_down: false,
            config,
            bindings,
        }));
        previous.bindings.values().for_each(|binding| retire(binding));

        tracing::info!(
            source = %self.source.describe(),
            generation,
            bound = bound.len(),
            skipped = skipped.len(),
            "Mapping table loaded"
        );
        Ok(ReloadReport {
            generation,
            bound,
            skipped,
        })
    }

    fn build(&self, entry: &MappingEntry, config: &ClientConfig) -> std::result::Result<Instance, MappingErrorKind> {
        let contract = entry.contract_id();
        self.catalog.registration(&contract)?;
        match entry.resolution()? {
            Resolution::Concrete(name) => self.catalog.build_concrete(name, &contract),
            Resolution::Mock(name) => self.catalog.build_mock(name, &contract),
            Resolution::Remote => self.build_remote(entry, config),
        }
    }

    fn build_remote(&self, entry: &MappingEntry, config: &ClientConfig) -> std::result::Result<Instance, MappingErrorKind> {
        let contract = entry.contract_id();
        let registration = self.catalog.registration(&contract)?;

        let source = match (&entry.endpoint, &entry.address) {
            (Some(name), address) => EndpointSource::Named {
                name: name.clone(),
                address: address.clone(),
            },
            (None, Some(address)) => EndpointSource::Explicit {
                binding: config.binding.clone(),
                address: address.clone(),
            },
            (None, None) => EndpointSource::Default {
                binding: config.binding.clone(),
                server: config.server.clone().ok_or(MappingErrorKind::NoServerAddress)?,
            },
        };
        let endpoint = source.resolve(&contract, &config.endpoints)?;

        let handle = ChannelHandle::new(contract, endpoint, self.factory.clone())
            .with_credentials(config.credentials.clone());
        let proxy = ServiceProxy::new(registration.descriptor.clone(), handle)
            .with_retry_policy(config.retry.policy());
        Ok((registration.stub)(Arc::new(proxy)))
    }

    fn register(self: &Arc<Self>, instance: Instance, entry: Option<Arc<MappingEntry>>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let registry = self.registry.load_full();
        if registry.shut_down {
            tracing::warn!(contract = %instance.contract(), "Registration after shutdown refused");
            return Err(LocatorError::ShutDown);
        }
        let contract = instance.contract().clone();
        let entry = entry.or_else(|| registry.config.mapping_table().entry_for(&contract));

        self.subscribe(&instance);
        tracing::info!(%contract, instance = %instance.id(), kind = ?instance.kind(), "Instance registered");
        let id = instance.id();
        let binding = Arc::new(Binding { instance, entry });
        self.registry.store(Arc::new(registry.with_binding(contract.clone(), binding)));

        if let Some(previous) = registry.bindings.get(&contract) {
            if previous.instance.id() != id {
                retire(previous);
            }
        }
        Ok(())
    }

    fn repair(self: &Arc<Self>, contract: &ContractId, faulted: Option<InstanceId>) -> RepairOutcome {
        let _guard = self.write_lock.lock();
        let registry = self.registry.load_full();
        if registry.shut_down {
            return RepairOutcome::Unbound;
        }
        let Some(current) = registry.bindings.get(contract) else {
            return RepairOutcome::Unbound;
        };
        if let Some(faulted) = faulted {
            if current.instance.id() != faulted {
                tracing::debug!(%contract, %faulted, current = %current.instance.id(), "Binding already repaired");
                return RepairOutcome::AlreadyRepaired {
                    current: current.instance.id(),
                };
            }
        }

        let entry = current
            .entry
            .clone()
            .unwrap_or_else(|| Arc::new(MappingEntry::remote(contract.as_str())));
        let instance = match self.build(&entry, &registry.config) {
            Ok(instance) => instance,
            Err(kind) => {
                let error = MappingError::new(contract.as_str(), kind);
                tracing::warn!(%error, "Fault repair failed, keeping faulted binding");
                return RepairOutcome::Failed(error);
            }
        };

        if let Some(proxy) = current.instance.proxy() {
            proxy.unsubscribe();
            proxy.abort();
        }
        self.subscribe(&instance);

        let replacement = instance.id();
        tracing::info!(
            %contract,
            faulted = %current.instance.id(),
            %replacement,
            kind = ?instance.kind(),
            "Binding repaired"
        );
        let binding = Arc::new(Binding {
            instance,
            entry: Some(entry),
        });
        self.registry.store(Arc::new(registry.with_binding(contract.clone(), binding)));
        RepairOutcome::Repaired { replacement }
    }

    fn subscribe(self: &Arc<Self>, instance: &Instance) {
        if let Some(proxy) = instance.proxy() {
            proxy.subscribe(Arc::new(Subscription {
                locator: Arc::downgrade(self),
                instance: instance.id(),
            }));
        }
    }
}

/// Stop repairing a binding that is no longer current
fn retire(binding: &Binding) {
    if let Some(proxy) = binding.instance.proxy() {
        proxy.unsubscribe();
    }
}
