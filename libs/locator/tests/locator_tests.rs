mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use switchboard_core::{CallError, ContractId, RemoteFault};
use switchboard_locator::{
    Instance, InstanceKind, LoadMode, LocatorError, MappingEntry, MappingErrorKind, RepairOutcome,
    ServiceLocator, StaticConfig, TomlFileSource,
};
use switchboard_proxy::{ChannelState, EndpointAddress, EndpointError, TransportKind};

fn greeter_id() -> ContractId {
    ContractId::new("IGreeter")
}

fn clock_id() -> ContractId {
    ContractId::new("IClock")
}

fn unauthorized() -> CallError {
    CallError::Fault(RemoteFault::unauthorized("token expired"))
}

#[tokio::test]
async fn resolve_before_load_is_unresolved() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);

    assert!(!locator.is_loaded());
    assert!(matches!(
        locator.resolve::<GreeterContract>(),
        Err(LocatorError::Unresolved(contract)) if contract == greeter_id()
    ));
}

#[tokio::test]
async fn unmapped_contract_is_unresolved() {
    let remote = Remote::new();
    let locator = locator(config(), &remote);
    locator.reload().unwrap();

    assert!(matches!(
        locator.resolve::<ClockContract>(),
        Err(LocatorError::Unresolved(_))
    ));
}

#[tokio::test]
async fn default_binding_is_a_stable_remote_proxy() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    let report = locator.reload().unwrap();

    assert_eq!(report.generation, 1);
    assert_eq!(report.bound, vec![greeter_id()]);
    assert!(report.skipped.is_empty());

    let first = locator.resolve::<GreeterContract>().unwrap();
    let second = locator.resolve::<GreeterContract>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let binding = locator.binding(&greeter_id()).unwrap();
    assert_eq!(binding.instance.kind(), &InstanceKind::Remote);
    let proxy = binding.instance.proxy().unwrap();
    assert!(proxy.is_subscribed());
    assert_eq!(
        proxy.handle().endpoint().address.to_string(),
        "tcp://appserver:8731/Greeter"
    );

    assert_eq!(first.greet("ann").await.unwrap(), "hello from channel 1");
    assert_eq!(remote.opened(), 1);
}

#[tokio::test]
async fn concrete_and_mock_entries_bind_local_objects() {
    let remote = Remote::new();
    let locator = locator(
        config()
            .with_mapping(MappingEntry::concrete("IGreeter", "LocalGreeter"))
            .with_mapping(MappingEntry::concrete("IClock", "FrozenClock")),
        &remote,
    );
    locator.reload().unwrap();

    let greeter = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "local hello, ann");
    assert_eq!(locator.resolve::<ClockContract>().unwrap().now().await.unwrap(), 42);
    assert_eq!(
        locator.bindings(),
        vec![
            (clock_id(), InstanceKind::Concrete("FrozenClock".into())),
            (greeter_id(), InstanceKind::Concrete("LocalGreeter".into())),
        ]
    );

    let mocked = common::locator(config().with_mapping(MappingEntry::mock("IGreeter", "GreeterMock")), &remote);
    mocked.reload().unwrap();
    let greeter = mocked.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "mock hello");

    assert_eq!(remote.opened(), 0);
}

#[tokio::test]
async fn duplicate_entries_last_one_wins() {
    let remote = Remote::new();
    let locator = locator(
        config()
            .with_mapping(MappingEntry::concrete("IGreeter", "LocalGreeter"))
            .with_mapping(MappingEntry::mock("IGreeter", "GreeterMock")),
        &remote,
    );
    let report = locator.reload().unwrap();

    assert_eq!(report.bound, vec![greeter_id()]);
    let greeter = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "mock hello");
}

#[tokio::test]
async fn lenient_reload_skips_bad_entries() {
    let remote = Remote::new();
    let locator = locator(
        config()
            .with_mapping(MappingEntry::remote("IWeather"))
            .with_mapping(MappingEntry::concrete("IGreeter", "MissingGreeter"))
            .with_mapping(MappingEntry::concrete("IGreeter", "FrozenClock"))
            .with_mapping(MappingEntry::mock("IClock", "GreeterMock"))
            .with_mapping(MappingEntry::mock("IGreeter", "HollowGreeterMock"))
            .with_mapping(MappingEntry {
                mock: Some("GreeterMock".into()),
                ..MappingEntry::concrete("IGreeter", "LocalGreeter")
            })
            .with_mapping(MappingEntry {
                endpoint: Some("nowhere".into()),
                ..MappingEntry::remote("IGreeter")
            })
            .with_mapping(MappingEntry::concrete("IClock", "FrozenClock")),
        &remote,
    );
    let report = locator.reload().unwrap();

    assert_eq!(report.bound, vec![clock_id()]);
    let kinds: Vec<_> = report.skipped.iter().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            MappingErrorKind::UnknownContract,
            MappingErrorKind::UnknownConcrete("MissingGreeter".into()),
            MappingErrorKind::ConcreteMismatch {
                concrete: "FrozenClock".into(),
                actual: clock_id(),
            },
            MappingErrorKind::MockAccessorMissing {
                mock: "GreeterMock".into(),
                actual: greeter_id(),
            },
            MappingErrorKind::MockReturnedNone("HollowGreeterMock".into()),
            MappingErrorKind::AmbiguousEntry,
            MappingErrorKind::Endpoint(EndpointError::UnknownEndpoint("nowhere".into())),
        ]
    );
    assert_eq!(report.skipped[0].contract, "IWeather");
    assert!(report.skipped[0].to_string().starts_with("Error loading contract type IWeather"));

    assert_eq!(locator.resolve::<ClockContract>().unwrap().now().await.unwrap(), 42);
    assert!(matches!(
        locator.resolve::<GreeterContract>(),
        Err(LocatorError::Unresolved(_))
    ));
}

#[tokio::test]
async fn default_binding_needs_a_server() {
    let remote = Remote::new();
    let mut config = config().with_mapping(MappingEntry::remote("IGreeter"));
    config.server = None;
    let locator = locator(config, &remote);
    let report = locator.reload().unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, MappingErrorKind::NoServerAddress);
}

#[tokio::test]
async fn strict_reload_keeps_previous_table() {
    let remote = Remote::new();
    let source = SharedConfig::new(config().with_mapping(MappingEntry::concrete("IGreeter", "LocalGreeter")));
    let locator = shared_locator(&source, &remote);
    locator.reload().unwrap();
    let before = locator.resolve::<GreeterContract>().unwrap();

    source.set(
        config()
            .with_load_mode(LoadMode::Strict)
            .with_mapping(MappingEntry::mock("IGreeter", "GreeterMock"))
            .with_mapping(MappingEntry::remote("IWeather")),
    );
    match locator.reload() {
        Err(LocatorError::Configuration(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].contract, "IWeather");
        }
        other => panic!("expected configuration error, got {other:?}"),
    }

    assert_eq!(locator.generation(), 1);
    let after = locator.resolve::<GreeterContract>().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn strict_create_fails_fast() {
    let source = StaticConfig(
        config()
            .with_load_mode(LoadMode::Strict)
            .with_mapping(MappingEntry::concrete("IGreeter", "MissingGreeter")),
    );
    let result = ServiceLocator::builder(catalog(), source)
        .channel_factory(Arc::new(RemoteFactory(Remote::new())))
        .create();
    assert!(matches!(result, Err(LocatorError::Configuration(errors)) if errors.len() == 1));
}

#[tokio::test]
async fn reload_replaces_and_retires_bindings() {
    let remote = Remote::new();
    let source = SharedConfig::new(config().with_mapping(MappingEntry::remote("IGreeter")));
    let locator = shared_locator(&source, &remote);
    locator.reload().unwrap();
    let old = locator.resolve_instance(&greeter_id()).unwrap();

    let report = locator.reload().unwrap();
    assert_eq!(report.generation, 2);

    let new = locator.resolve_instance(&greeter_id()).unwrap();
    assert!(!old.same_as(&new));
    assert!(!old.proxy().unwrap().is_subscribed());
    assert!(new.proxy().unwrap().is_subscribed());

    // Retired instances keep working for callers still holding them
    let stale = old.downcast::<GreeterContract>().unwrap();
    assert_eq!(stale.greet("ann").await.unwrap(), "hello from channel 1");
}

#[tokio::test]
async fn toml_file_is_reread_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("switchboard.toml");
    std::fs::write(
        &path,
        r#"
load_mode = "lenient"

[server]
name = "appserver"
port = 8731

[[mapping]]
contract = "IGreeter"
concrete = "LocalGreeter"
"#,
    )
    .unwrap();

    let locator = ServiceLocator::create(catalog(), TomlFileSource::new(&path)).unwrap();
    let greeter = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "local hello, ann");

    std::fs::write(
        &path,
        r#"
[[mapping]]
contract = "IGreeter"
mock = "GreeterMock"
"#,
    )
    .unwrap();
    locator.reload().unwrap();
    let greeter = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "mock hello");

    std::fs::write(&path, "[[mapping]]\ncontract = 42\n").unwrap();
    assert!(matches!(locator.reload(), Err(LocatorError::Config(_))));
    assert_eq!(locator.generation(), 2);
}

#[tokio::test]
async fn fault_repairs_binding_and_retries_on_new_channel() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    locator.reload().unwrap();

    let faulted = locator.resolve_instance(&greeter_id()).unwrap();
    let greeter = faulted.downcast::<GreeterContract>().unwrap();

    remote.push(Err(unauthorized()));
    assert_eq!(greeter.greet("ann").await.unwrap(), "hello from channel 2");
    assert_eq!(remote.calls(), 2);
    assert_eq!(remote.opened(), 2);

    let repaired = locator.resolve_instance(&greeter_id()).unwrap();
    assert!(!repaired.same_as(&faulted));
    assert_eq!(repaired.kind(), &InstanceKind::Remote);
    assert!(repaired.proxy().unwrap().is_subscribed());
    assert!(!faulted.proxy().unwrap().is_subscribed());
    assert_eq!(repaired.proxy().unwrap().handle().state(), ChannelState::Unopened);

    let fresh = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(fresh.greet("bob").await.unwrap(), "hello from channel 3");
}

#[tokio::test]
async fn address_on_other_transport_is_rejected_at_load() {
    let remote = Remote::new();
    let locator = locator(
        config()
            .with_mapping(MappingEntry {
                address: Some(EndpointAddress::unix("/run/switchboard/Greeter.sock")),
                ..MappingEntry::remote("IGreeter")
            })
            .with_mapping(MappingEntry {
                address: Some(EndpointAddress::tcp("clocks:9000", "/Clock")),
                ..MappingEntry::remote("IClock")
            }),
        &remote,
    );
    let report = locator.reload().unwrap();

    assert_eq!(report.bound, vec![clock_id()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(
        report.skipped[0].kind,
        MappingErrorKind::Endpoint(EndpointError::TransportMismatch {
            address: "unix:///run/switchboard/Greeter.sock".into(),
            binding: TransportKind::Tcp,
        })
    );
    assert!(matches!(
        locator.resolve::<GreeterContract>(),
        Err(LocatorError::Unresolved(_))
    ));
    assert_eq!(remote.opened(), 0);
}

#[tokio::test]
async fn repeated_faults_are_retried_up_to_the_limit() {
    let remote = Remote::new();
    let mut settings = config().with_mapping(MappingEntry::remote("IGreeter"));
    settings.retry.max_retries = 3;
    let locator = locator(settings, &remote);
    locator.reload().unwrap();
    let greeter = locator.resolve::<GreeterContract>().unwrap();

    remote.push(Err(unauthorized()));
    remote.push(Err(unauthorized()));
    assert_eq!(greeter.greet("ann").await.unwrap(), "hello from channel 3");
    assert_eq!(remote.calls(), 3);
    assert_eq!(remote.opened(), 3);
}

#[tokio::test]
async fn retry_limit_stops_repeated_faults() {
    let remote = Remote::new();
    let mut settings = config().with_mapping(MappingEntry::remote("IGreeter"));
    settings.retry.max_retries = 1;
    let locator = locator(settings, &remote);
    locator.reload().unwrap();
    let greeter = locator.resolve::<GreeterContract>().unwrap();

    remote.push(Err(unauthorized()));
    remote.push(Err(unauthorized()));
    assert_eq!(greeter.greet("ann").await.unwrap_err(), unauthorized());
    assert_eq!(remote.calls(), 2);
    assert_eq!(remote.opened(), 2);
}

#[tokio::test]
async fn declined_retry_propagates_after_one_attempt() {
    let remote = Remote::new();
    let locator = ServiceLocator::builder(catalog(), StaticConfig(config().with_mapping(MappingEntry::remote("IGreeter"))))
        .channel_factory(Arc::new(RemoteFactory(remote.clone())))
        .retry_decision(|_, _| false)
        .build();
    locator.reload().unwrap();
    let faulted = locator.resolve_instance(&greeter_id()).unwrap();
    let greeter = faulted.downcast::<GreeterContract>().unwrap();

    remote.push(Err(unauthorized()));
    assert_eq!(greeter.greet("ann").await.unwrap_err(), unauthorized());
    assert_eq!(remote.calls(), 1);

    // The binding is repaired even though the call was not retried
    let current = locator.resolve_instance(&greeter_id()).unwrap();
    assert!(!current.same_as(&faulted));
}

#[tokio::test]
async fn terminal_faults_leave_binding_alone() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    locator.reload().unwrap();
    let before = locator.resolve_instance(&greeter_id()).unwrap();
    let greeter = before.downcast::<GreeterContract>().unwrap();

    let fault = CallError::Fault(RemoteFault::validation("name too long"));
    remote.push(Err(fault.clone()));
    assert_eq!(greeter.greet("ann").await.unwrap_err(), fault);

    let after = locator.resolve_instance(&greeter_id()).unwrap();
    assert!(after.same_as(&before));
}

#[tokio::test]
async fn concurrent_repairs_of_one_contract_leave_one_binding() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    locator.reload().unwrap();
    let faulted = locator.binding(&greeter_id()).unwrap().instance.id();

    let outcomes: Vec<RepairOutcome> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| locator.repair(&greeter_id(), Some(faulted))))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let repaired: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            RepairOutcome::Repaired { replacement } => Some(*replacement),
            _ => None,
        })
        .collect();
    assert_eq!(repaired.len(), 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        RepairOutcome::AlreadyRepaired { current } if *current == repaired[0]
    )));

    assert_eq!(locator.bindings().len(), 1);
    assert_eq!(locator.binding(&greeter_id()).unwrap().instance.id(), repaired[0]);
}

#[tokio::test]
async fn concurrent_repairs_of_different_contracts_both_complete() {
    let remote = Remote::new();
    let locator = locator(
        config()
            .with_mapping(MappingEntry::remote("IGreeter"))
            .with_mapping(MappingEntry::remote("IClock")),
        &remote,
    );
    locator.reload().unwrap();
    let greeter = locator.binding(&greeter_id()).unwrap().instance.id();
    let clock = locator.binding(&clock_id()).unwrap().instance.id();

    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| locator.repair(&greeter_id(), Some(greeter)));
        let b = scope.spawn(|| locator.repair(&clock_id(), Some(clock)));
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(matches!(a, RepairOutcome::Repaired { .. }));
    assert!(matches!(b, RepairOutcome::Repaired { .. }));
    assert_ne!(locator.binding(&greeter_id()).unwrap().instance.id(), greeter);
    assert_ne!(locator.binding(&clock_id()).unwrap().instance.id(), clock);
}

#[tokio::test]
async fn repair_of_unbound_contract_is_a_no_op() {
    let remote = Remote::new();
    let locator = locator(config(), &remote);
    locator.reload().unwrap();

    assert_eq!(locator.repair(&greeter_id(), None), RepairOutcome::Unbound);
    assert!(locator.bindings().is_empty());
}

#[tokio::test]
async fn registered_concrete_instance_is_rebuilt_from_its_entry() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::concrete("IGreeter", "LocalGreeter")), &remote);
    locator.reload().unwrap();

    let registered = Instance::new::<GreeterContract>(
        InstanceKind::Concrete("LocalGreeter".into()),
        Arc::new(LocalGreeter),
    );
    locator.register_instance(registered.clone()).unwrap();
    let binding = locator.binding(&greeter_id()).unwrap();
    assert!(binding.instance.same_as(&registered));
    assert_eq!(binding.entry.as_ref().unwrap().concrete.as_deref(), Some("LocalGreeter"));

    let outcome = locator.repair(&greeter_id(), Some(registered.id()));
    assert!(matches!(outcome, RepairOutcome::Repaired { .. }));

    let rebuilt = locator.resolve_instance(&greeter_id()).unwrap();
    assert!(!rebuilt.same_as(&registered));
    assert_eq!(rebuilt.kind(), &InstanceKind::Concrete("LocalGreeter".into()));
}

#[tokio::test]
async fn registered_service_resolves_to_the_same_object() {
    let remote = Remote::new();
    let locator = locator(config(), &remote);
    locator.reload().unwrap();

    let service: Arc<dyn Greeter> = Arc::new(LocalGreeter);
    let instance = locator.register_service::<GreeterContract>(service.clone()).unwrap();
    assert_eq!(instance.kind(), &InstanceKind::Direct);
    assert!(!instance.is_fault_capable());

    let resolved = locator.resolve::<GreeterContract>().unwrap();
    assert!(Arc::ptr_eq(&resolved, &service));

    // Without a mapping entry a repair falls back to the default proxy
    assert!(matches!(
        locator.repair(&greeter_id(), None),
        RepairOutcome::Repaired { .. }
    ));
    let rebuilt = locator.resolve_instance(&greeter_id()).unwrap();
    assert_eq!(rebuilt.kind(), &InstanceKind::Remote);
}

#[tokio::test]
async fn register_default_binds_a_subscribed_proxy() {
    let remote = Remote::new();
    let locator = locator(config(), &remote);
    locator.reload().unwrap();

    let instance = locator.register_default(&greeter_id()).unwrap();
    assert!(instance.proxy().unwrap().is_subscribed());

    let greeter = locator.resolve::<GreeterContract>().unwrap();
    assert_eq!(greeter.greet("ann").await.unwrap(), "hello from channel 1");

    remote.push(Err(unauthorized()));
    assert_eq!(greeter.greet("ann").await.unwrap(), "hello from channel 2");
    assert!(!locator.resolve_instance(&greeter_id()).unwrap().same_as(&instance));

    let unknown = locator.register_default(&ContractId::new("IWeather"));
    assert!(matches!(
        unknown,
        Err(LocatorError::Mapping(error)) if error.kind == MappingErrorKind::UnknownContract
    ));
}

#[tokio::test]
async fn shutdown_releases_channels() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    locator.reload().unwrap();
    let instance = locator.resolve_instance(&greeter_id()).unwrap();
    let greeter = instance.downcast::<GreeterContract>().unwrap();
    greeter.greet("ann").await.unwrap();

    locator.shutdown().await;

    let proxy = instance.proxy().unwrap();
    assert!(!proxy.is_subscribed());
    assert_eq!(proxy.handle().state(), ChannelState::Unopened);
    assert!(matches!(
        locator.resolve::<GreeterContract>(),
        Err(LocatorError::ShutDown)
    ));
    assert_eq!(locator.repair(&greeter_id(), None), RepairOutcome::Unbound);

    locator.reload().unwrap();
    assert!(locator.resolve::<GreeterContract>().is_ok());
}

#[tokio::test]
async fn registration_after_shutdown_is_refused() {
    let remote = Remote::new();
    let locator = locator(config().with_mapping(MappingEntry::remote("IGreeter")), &remote);
    locator.reload().unwrap();
    let instance = locator.resolve_instance(&greeter_id()).unwrap();
    locator.shutdown().await;

    assert!(matches!(
        locator.register_instance(instance.clone()),
        Err(LocatorError::ShutDown)
    ));
    assert!(!instance.proxy().unwrap().is_subscribed());
    assert!(locator.binding(&greeter_id()).is_none());

    let service: Arc<dyn Greeter> = Arc::new(LocalGreeter);
    assert!(matches!(
        locator.register_service::<GreeterContract>(service),
        Err(LocatorError::ShutDown)
    ));
    assert!(matches!(
        locator.register_default(&greeter_id()),
        Err(LocatorError::ShutDown)
    ));
    assert_eq!(remote.opened(), 0);
}

#[tokio::test]
async fn server_reachability_follows_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let remote = Remote::new();
    let locator = locator(config().with_server("127.0.0.1", port), &remote);
    locator.reload().unwrap();
    assert!(locator.probe_server(Duration::from_secs(2)).await);

    drop(listener);
    assert!(!locator.probe_server(Duration::from_millis(500)).await);

    let mut unconfigured = config();
    unconfigured.server = None;
    let locator = common::locator(unconfigured, &remote);
    locator.reload().unwrap();
    assert!(!locator.probe_server(Duration::from_millis(100)).await);
}
