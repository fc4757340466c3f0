use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of a service contract, e.g. `ITestService`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(Arc<str>);

impl ContractId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name used as the address path for this contract
    ///
    /// Strips the leading interface marker (`ITestService` becomes
    /// `TestService`). Names that do not start with `I` followed by an
    /// uppercase letter are returned unchanged.
    pub fn service_name(&self) -> &str {
        let mut chars = self.0.chars();
        match (chars.next(), chars.next()) {
            (Some('I'), Some(next)) if next.is_ascii_uppercase() => &self.0[1..],
            _ => &self.0,
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContractId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ContractId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl Borrow<str> for ContractId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How an argument slot travels across a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamDirection {
    /// Sent to the remote side only
    In,
    /// Written by the remote side only
    Out,
    /// Sent, then written back (by-reference)
    Ref,
}

impl ParamDirection {
    /// Whether the slot is marshalled back to the caller
    pub fn is_returned(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::Ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub direction: ParamDirection,
}

/// One operation of a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    /// Return type name, `None` for operations returning nothing
    pub returns: Option<String>,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn input(self, name: impl Into<String>) -> Self {
        self.param(name, ParamDirection::In)
    }

    pub fn output(self, name: impl Into<String>) -> Self {
        self.param(name, ParamDirection::Out)
    }

    pub fn by_ref(self, name: impl Into<String>) -> Self {
        self.param(name, ParamDirection::Ref)
    }

    pub fn param(mut self, name: impl Into<String>, direction: ParamDirection) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            direction,
        });
        self
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.returns = Some(type_name.into());
        self
    }

    /// Number of output and by-reference slots
    pub fn returned_param_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.direction.is_returned())
            .count()
    }
}

/// Method surface of a contract interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescriptor {
    pub id: ContractId,
    pub operations: Vec<OperationDescriptor>,
}

impl ContractDescriptor {
    pub fn new(id: impl Into<ContractId>) -> Self {
        Self {
            id: id.into(),
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn find(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }
}
