use chrono::NaiveDateTime;
use thiserror::Error;

use crate::mac::MacAddress;

/// Input did not parse as a MAC address in any accepted notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid MAC address {input:?}")]
pub struct InvalidAddressFormat {
    pub input: String,
}

impl InvalidAddressFormat {
    pub fn new(input: impl Into<String>) -> Self {
        InvalidAddressFormat {
            input: input.into(),
        }
    }
}

/// The enforcement point failed to apply a grant/revoke command, or could
/// not be reached at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("enforcement failure: {0}")]
pub struct EnforcementFailure(pub String);

/// Failures of the session correlation operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login is not idempotent: a second login for the same (user, mac)
    /// while the first session is open is rejected, carrying the prior
    /// session's start time.
    #[error("user {user} already logged in at {mac} since {since} UTC")]
    AlreadyLoggedIn {
        user: String,
        mac: MacAddress,
        since: NaiveDateTime,
    },

    /// A grant failed at the enforcement point. The user must not be
    /// considered online.
    #[error(transparent)]
    Enforcement(#[from] EnforcementFailure),
}
