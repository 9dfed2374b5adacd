//! WhatsApp addressing
//!
//! A fully qualified address (JID) has the shape `user[.agent][:device]@server`.
//! Callers of the send API may pass a bare phone number; [`qualify`] appends
//! the default user server before parsing.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Server used for regular user accounts
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// Separator between the user part and the server part
pub const DOMAIN_MARKER: char = '@';

/// Append the default user server unless the address is already qualified
///
/// Idempotent: a string that already contains [`DOMAIN_MARKER`] is returned
/// unchanged.
pub fn qualify(address: &str) -> String {
    if address.contains(DOMAIN_MARKER) {
        address.to_string()
    } else {
        format!("{address}{DOMAIN_MARKER}{DEFAULT_USER_SERVER}")
    }
}

/// A parsed WhatsApp address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    /// User part (phone number for regular accounts)
    pub user: String,
    /// Agent id, 0 when absent
    pub agent: u8,
    /// Device id, 0 for the primary device
    pub device: u16,
    /// Server part (e.g., "s.whatsapp.net", "g.us")
    pub server: String,
}

impl Jid {
    /// Create a user address on the given server
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            agent: 0,
            device: 0,
            server: server.into(),
        }
    }

    /// Whether this is a regular user account address
    pub fn is_user(&self) -> bool {
        self.server == DEFAULT_USER_SERVER
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = s
            .split_once(DOMAIN_MARKER)
            .ok_or_else(|| Error::invalid_input(format!("address has no server part: '{s}'")))?;

        if server.is_empty() || server.contains(DOMAIN_MARKER) {
            return Err(Error::invalid_input(format!("malformed server in '{s}'")));
        }
        if !server
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(Error::invalid_input(format!(
                "server contains invalid characters: '{server}'"
            )));
        }

        let (user_agent, device) = match user_part.split_once(':') {
            Some((ua, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| Error::invalid_input(format!("invalid device id in '{s}'")))?;
                (ua, device)
            }
            None => (user_part, 0),
        };

        let (user, agent) = match user_agent.split_once('.') {
            Some((user, agent)) => {
                let agent = agent
                    .parse::<u8>()
                    .map_err(|_| Error::invalid_input(format!("invalid agent id in '{s}'")))?;
                (user, agent)
            }
            None => (user_agent, 0),
        };

        if user.is_empty() {
            return Err(Error::invalid_input(format!("address has empty user: '{s}'")));
        }
        if user.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::invalid_input(format!(
                "user contains whitespace: '{user}'"
            )));
        }

        Ok(Self {
            user: user.to_string(),
            agent,
            device,
            server: server.to_string(),
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user)?;
        if self.agent > 0 {
            write!(f, ".{}", self.agent)?;
        }
        if self.device > 0 {
            write!(f, ":{}", self.device)?;
        }
        write!(f, "{}{}", DOMAIN_MARKER, self.server)
    }
}
