use switchboard_core::ContractId;
use switchboard_proxy::EndpointError;
use thiserror::Error;

/// Why one mapping entry could not be turned into a binding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingErrorKind {
    #[error("contract type is not registered in the catalog")]
    UnknownContract,

    #[error("concrete type '{0}' cannot be established")]
    UnknownConcrete(String),

    #[error("concrete type '{concrete}' implements '{actual}', not this contract")]
    ConcreteMismatch { concrete: String, actual: ContractId },

    #[error("mock type '{0}' cannot be established")]
    UnknownMock(String),

    #[error("mock type '{mock}' exposes no accessor for this contract (it mocks '{actual}')")]
    MockAccessorMissing { mock: String, actual: ContractId },

    #[error("mock type '{0}' returned no mock object")]
    MockReturnedNone(String),

    #[error("both a concrete and a mock type are given")]
    AmbiguousEntry,

    #[error("no server address is configured for the default binding")]
    NoServerAddress,

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error loading contract type {contract}: {kind}")]
pub struct MappingError {
    pub contract: String,
    pub kind: MappingErrorKind,
}

impl MappingError {
    pub fn new(contract: impl Into<String>, kind: MappingErrorKind) -> Self {
        Self {
            contract: contract.into(),
            kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration '{origin}': {message}")]
    Parse { origin: String, message: String },
}

#[derive(Error, Debug)]
pub enum LocatorError {
    /// Resolution before any table was loaded, or of a contract never mapped
    #[error("No binding for contract '{0}'; the mapping table was not loaded")]
    Unresolved(ContractId),

    #[error("Locator has been shut down")]
    ShutDown,

    #[error("Binding for '{0}' does not implement the requested contract")]
    ContractMismatch(ContractId),

    #[error("{} mapping entries failed to load", .0.len())]
    Configuration(Vec<MappingError>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

pub type Result<T> = std::result::Result<T, LocatorError>;
