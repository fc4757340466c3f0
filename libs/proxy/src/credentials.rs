use std::fmt;

use serde::{Deserialize, Serialize};
pub use switchboard_fabric::frame::ImpersonationLevel;

/// Credential presented when a channel is opened
///
/// Impersonation defaults to [`ImpersonationLevel::Delegation`], letting the
/// server act on the caller's behalf towards further services.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub identity: Option<String>,
    pub secret: Option<String>,
    #[serde(default)]
    pub impersonation: ImpersonationLevel,
}

impl ClientCredentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            secret: Some(secret.into()),
            impersonation: ImpersonationLevel::default(),
        }
    }

    pub fn with_impersonation(mut self, level: ImpersonationLevel) -> Self {
        self.impersonation = level;
        self
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("identity", &self.identity)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("impersonation", &self.impersonation)
            .finish()
    }
}
