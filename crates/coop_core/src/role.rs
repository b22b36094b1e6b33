//! Process role for the lifetime of a session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of this process in a cooperative session.
///
/// Fixed when the session starts; every handler branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    /// Holds gameplay authority: executes destructive effects and computes refunds.
    Host,
    /// Requests actions from the host and applies confirmed results.
    Client,
    /// Single player; the replication core stays out of the way.
    #[default]
    Solo,
}

impl Role {
    /// Check if this process is the authority.
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }

    /// Check if this process defers to a host.
    #[must_use]
    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }

    /// Check if a peer exists at all.
    #[must_use]
    pub const fn is_multiplayer(self) -> bool {
        !matches!(self, Self::Solo)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Host => "Host",
            Self::Client => "Client",
            Self::Solo => "Solo",
        };
        f.write_str(name)
    }
}
