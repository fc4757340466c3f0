use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Failure of a single remote call, as seen by the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("Security negotiation failed: {0}")]
    SecurityNegotiation(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Fault(RemoteFault),

    #[error("Contract '{contract}' has no operation '{operation}'")]
    UnknownOperation { contract: String, operation: String },

    #[error("Operation '{operation}' takes {expected} arguments, got {actual}")]
    ArgumentCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CallError {
    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    /// The remote fault carried by this error, if any
    pub fn fault(&self) -> Option<&RemoteFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<RemoteFault> for CallError {
    fn from(fault: RemoteFault) -> Self {
        Self::Fault(fault)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

/// Category of an application-level fault raised by the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// The caller is not authorized for the operation
    Unauthorized,
    /// An argument failed remote validation
    Validation,
    /// A fault declared by the contract, identified by name
    Typed(String),
    /// An undeclared fault
    Generic,
}

/// Application fault returned by the remote side
///
/// Travels over the wire unchanged and reaches the caller with its kind,
/// message and optional detail payload intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
    pub detail: Option<Value>,
}

impl RemoteFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Validation, message)
    }

    pub fn typed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Typed(name.into()), message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Generic, message)
    }

    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::Unauthorized => write!(f, "Unauthorized fault: {}", self.message),
            FaultKind::Validation => write!(f, "Validation fault: {}", self.message),
            FaultKind::Typed(name) => write!(f, "{} fault: {}", name, self.message),
            FaultKind::Generic => write!(f, "Fault: {}", self.message),
        }
    }
}
