use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard_core::ContractId;
use switchboard_proxy::EndpointAddress;

use crate::error::MappingErrorKind;

/// Declarative instruction for resolving one contract
///
/// At most one of `concrete` and `mock` may be set; with neither the
/// contract is bound to a remote proxy. `endpoint` and `address` only
/// affect remote proxies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub contract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concrete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<EndpointAddress>,
}

/// How a mapping entry asks its contract to be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Concrete(&'a str),
    Mock(&'a str),
    Remote,
}

fn present(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl MappingEntry {
    pub fn remote(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            ..Self::default()
        }
    }

    pub fn concrete(contract: impl Into<String>, concrete: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            concrete: Some(concrete.into()),
            ..Self::default()
        }
    }

    pub fn mock(contract: impl Into<String>, mock: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            mock: Some(mock.into()),
            ..Self::default()
        }
    }

    pub fn contract_id(&self) -> ContractId {
        ContractId::new(self.contract.trim())
    }

    /// Blank names count as absent
    pub fn resolution(&self) -> Result<Resolution<'_>, MappingErrorKind> {
        match (present(&self.concrete), present(&self.mock)) {
            (Some(_), Some(_)) => Err(MappingErrorKind::AmbiguousEntry),
            (Some(concrete), None) => Ok(Resolution::Concrete(concrete)),
            (None, Some(mock)) => Ok(Resolution::Mock(mock)),
            (None, None) => Ok(Resolution::Remote),
        }
    }
}

/// Ordered mapping entries, replaced as a whole on every reload
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<Arc<MappingEntry>>,
}

impl MappingTable {
    pub fn new(entries: impl IntoIterator<Item = MappingEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn entries(&self) -> &[Arc<MappingEntry>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry in effect for `contract`: the last one naming it
    pub fn entry_for(&self, contract: &ContractId) -> Option<Arc<MappingEntry>> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.contract_id() == *contract)
            .cloned()
    }

    /// Contracts named by more than one entry, in first-seen order
    pub fn duplicates(&self) -> Vec<ContractId> {
        let mut counts: HashMap<ContractId, usize> = HashMap::new();
        let mut order = Vec::new();
        for entry in &self.entries {
            let id = entry.contract_id();
            let count = counts.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(id);
            }
        }
        order
    }
}
