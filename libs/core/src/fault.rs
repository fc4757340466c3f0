use crate::error::{CallError, FaultKind};

/// Outcome of classifying a call failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// A connectivity or negotiation failure that rebinding may fix
    Transient,
    /// Anything rebinding cannot fix; reaches the caller unchanged
    Terminal,
}

impl FaultClass {
    pub fn is_transient(self) -> bool {
        self == FaultClass::Transient
    }
}

/// Classify a call failure as transient or terminal
///
/// Only security negotiation failures, unreachable endpoints and the
/// unauthorized application fault are transient. Every other application
/// fault, validation faults included, is terminal.
pub fn classify(error: &CallError) -> FaultClass {
    match error {
        CallError::SecurityNegotiation(_) | CallError::EndpointNotFound(_) => FaultClass::Transient,
        CallError::Fault(fault) if fault.kind == FaultKind::Unauthorized => FaultClass::Transient,
        _ => FaultClass::Terminal,
    }
}
