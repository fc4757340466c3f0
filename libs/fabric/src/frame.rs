//! Messages exchanged on a call channel.
//!
//! A connection opens with [`ClientFrame::Hello`] answered by either
//! [`ServerFrame::Welcome`] or [`ServerFrame::Rejected`]. After that the
//! client sends calls one at a time; while a call is outstanding the server
//! may interleave [`ServerFrame::Callback`] frames on duplex connections,
//! each answered by a [`ClientFrame::CallbackReply`] before the call's own
//! [`ServerFrame::Reply`] arrives.

use serde::{Deserialize, Serialize};
use switchboard_core::{RemoteFault, Value};

/// How far the server may act on behalf of the calling identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpersonationLevel {
    Anonymous,
    Identification,
    Impersonation,
    #[default]
    Delegation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub contract: String,
    pub path: String,
    pub identity: Option<String>,
    pub secret: Option<String>,
    pub impersonation: ImpersonationLevel,
    pub secure: bool,
    pub duplex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    Hello(Hello),
    Call {
        id: u64,
        operation: String,
        args: Vec<Value>,
    },
    CallbackReply {
        id: u64,
        outcome: Result<Value, RemoteFault>,
    },
    Goodbye,
}

/// Successful call result
///
/// `args` is the full argument vector after the call; the client copies
/// back only the output and by-reference slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub value: Value,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Welcome,
    Rejected {
        reason: String,
    },
    Reply {
        id: u64,
        outcome: Result<Reply, RemoteFault>,
    },
    Callback {
        id: u64,
        operation: String,
        args: Vec<Value>,
    },
}
