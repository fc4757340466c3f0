//! Switchboard Core - Contract vocabulary shared by every layer
//!
//! Describes service contracts (operations and their parameter directions),
//! the dynamic [`Value`] carried through calls, the call-failure taxonomy and
//! the fault classifier that separates transient connection faults from
//! terminal ones.

pub mod contract;
pub mod error;
pub mod fault;
pub mod value;

// Re-exports for convenience
pub use contract::{ContractDescriptor, ContractId, OperationDescriptor, ParamDescriptor, ParamDirection};
pub use error::{CallError, FaultKind, RemoteFault, Result};
pub use fault::{classify, FaultClass};
pub use value::{FromValue, Value};
