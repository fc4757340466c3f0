use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::ContractId;
use switchboard_fabric::transport::{TransportOptions, DEFAULT_MAX_FRAME_LEN};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("No endpoint configuration named '{0}'")]
    UnknownEndpoint(String),

    #[error("Endpoint configuration '{0}' has no address")]
    MissingAddress(String),

    #[error("Invalid endpoint address '{0}': {1}")]
    InvalidAddress(String, &'static str),

    #[error("Endpoint address '{address}' cannot be reached over a {binding:?} binding")]
    TransportMismatch { address: String, binding: TransportKind },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Unix,
}

impl TransportKind {
    pub fn scheme(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Unix => "unix",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    None,
    /// Credentials are presented during the connection handshake
    #[default]
    Transport,
}

/// Transport and security parameters used to open a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub transport: TransportKind,
    pub security: SecurityMode,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
    pub close_timeout_ms: u64,
    pub max_frame_len: usize,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            security: SecurityMode::Transport,
            connect_timeout_ms: 5_000,
            send_timeout_ms: Some(60_000),
            receive_timeout_ms: Some(60_000),
            close_timeout_ms: 10_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl BindingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
            receive_timeout: self.receive_timeout_ms.map(Duration::from_millis),
            max_frame_len: self.max_frame_len,
        }
    }
}

/// Default host:port pair used to synthesise contract addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub name: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Remote address of a contract, `tcp://host:port/Service` or `unix:///path`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    pub transport: TransportKind,
    /// `host:port` for TCP, empty for Unix sockets
    pub authority: String,
    pub path: String,
}

impl EndpointAddress {
    pub fn tcp(authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Tcp,
            authority: authority.into(),
            path: path.into(),
        }
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Unix,
            authority: String::new(),
            path: path.into(),
        }
    }

    /// Address of `contract` on the default server
    ///
    /// TCP addresses use the server's host:port with the contract's service
    /// name as path. For Unix bindings the server name is the socket
    /// directory and the port is ignored.
    pub fn for_contract(binding: &BindingConfig, server: &ServerAddress, contract: &ContractId) -> Self {
        match binding.transport {
            TransportKind::Tcp => Self::tcp(server.to_string(), format!("/{}", contract.service_name())),
            TransportKind::Unix => Self::unix(format!(
                "{}/{}.sock",
                server.name.trim_end_matches('/'),
                contract.service_name()
            )),
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.transport.scheme(), self.authority, self.path)
    }
}

impl FromStr for EndpointAddress {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| EndpointError::InvalidAddress(s.to_string(), reason);

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        match scheme {
            "tcp" => {
                let (authority, path) = match rest.find('/') {
                    Some(i) => (&rest[..i], &rest[i..]),
                    None => (rest, ""),
                };
                let (host, port) = authority.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                Ok(Self::tcp(authority, path))
            }
            "unix" => {
                if !rest.starts_with('/') {
                    return Err(invalid("unix path must be absolute"));
                }
                Ok(Self::unix(rest))
            }
            _ => Err(invalid("unsupported scheme")),
        }
    }
}

impl Serialize for EndpointAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EndpointAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Named endpoint configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEndpoint {
    #[serde(default)]
    pub binding: BindingConfig,
    pub address: Option<EndpointAddress>,
}

pub type NamedEndpoints = HashMap<String, NamedEndpoint>;

/// Where a channel handle takes its binding and address from
///
/// Precedence, highest first: an explicit binding and address, a named
/// endpoint configuration (optionally with an overriding address), the
/// default binding at an address derived from the server host:port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    Explicit {
        binding: BindingConfig,
        address: EndpointAddress,
    },
    Named {
        name: String,
        address: Option<EndpointAddress>,
    },
    Default {
        binding: BindingConfig,
        server: ServerAddress,
    },
}

/// Binding and address a channel is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub binding: BindingConfig,
    pub address: EndpointAddress,
    /// Name of the endpoint configuration used, if any
    pub configuration: Option<String>,
}

impl EndpointSource {
    /// Pick the binding and address, rejecting an address whose transport
    /// differs from the binding's
    pub fn resolve(&self, contract: &ContractId, named: &NamedEndpoints) -> Result<ResolvedEndpoint, EndpointError> {
        let resolved = self.select(contract, named)?;
        if resolved.binding.transport != resolved.address.transport {
            return Err(EndpointError::TransportMismatch {
                address: resolved.address.to_string(),
                binding: resolved.binding.transport,
            });
        }
        Ok(resolved)
    }

    fn select(&self, contract: &ContractId, named: &NamedEndpoints) -> Result<ResolvedEndpoint, EndpointError> {
        match self {
            EndpointSource::Explicit { binding, address } => Ok(ResolvedEndpoint {
                binding: binding.clone(),
                address: address.clone(),
                configuration: None,
            }),
            EndpointSource::Named { name, address } => {
                let config = named
                    .get(name)
                    .ok_or_else(|| EndpointError::UnknownEndpoint(name.clone()))?;
                let address = address
                    .clone()
                    .or_else(|| config.address.clone())
                    .ok_or_else(|| EndpointError::MissingAddress(name.clone()))?;
                Ok(ResolvedEndpoint {
                    binding: config.binding.clone(),
                    address,
                    configuration: Some(name.clone()),
                })
            }
            EndpointSource::Default { binding, server } => Ok(ResolvedEndpoint {
                binding: binding.clone(),
                address: EndpointAddress::for_contract(binding, server, contract),
                configuration: None,
            }),
        }
    }
}
