//! Switchboard Locator - Mapping-driven service resolution with fault repair
//!
//! A [`ServiceLocator`] turns the mapping table of a [`ClientConfig`] into
//! live instances: a remote proxy by default, or a named concrete
//! implementation or mock registered in the [`Catalog`]. Every remote
//! instance is subscribed to its proxy's fault notifications; on a transient
//! fault the locator rebuilds the contract's binding from its mapping entry
//! and tells the proxy whether to retry the call.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use switchboard_locator::{Catalog, ServiceLocator, TomlFileSource};
//!
//! let catalog = Catalog::new()
//!     .contract::<OrderServiceContract>()
//!     .concrete::<AuditContract, _>("LocalAudit", || Arc::new(LocalAudit::default()));
//!
//! let locator = ServiceLocator::create(catalog, TomlFileSource::new("switchboard.toml"))?;
//! if locator.probe_server(Duration::from_secs(2)).await {
//!     let orders = locator.resolve::<OrderServiceContract>()?;
//!     orders.submit(order).await?;
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod locator;
pub mod mapping;

// Re-exports for convenience
pub use catalog::{Catalog, Instance, InstanceId, InstanceKind, MockObject};
pub use config::{ClientConfig, ConfigSource, LoadMode, RetryConfig, StaticConfig, TomlFileSource};
pub use error::{ConfigError, LocatorError, MappingError, MappingErrorKind, Result};
pub use locator::{
    retry_when_repaired, Binding, LocatorBuilder, ReloadReport, RepairOutcome, RetryDecision,
    ServiceLocator,
};
pub use mapping::{MappingEntry, MappingTable, Resolution};
