//! Endpoint and probe configuration

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default SMTP submission port.
pub const SUBMISSION_PORT: u16 = 587;

/// Default IMAP port.
pub const IMAP_PORT: u16 = 143;

/// Default bound on a single leg of a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Age after which an unconfirmed probe is discarded instead of matched.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(1800);

/// A `host[:port]` pair for one mail service.
///
/// The [`Display`](fmt::Display) form is normalized: `host` when no
/// port was given, `host:port` otherwise, with IPv6 hosts always in
/// brackets (`::1` renders as `[::1]`) and surrounding whitespace dropped.
/// The submission address of an endpoint is rendered this way into
/// every probe it sends and compared literally when the other side
/// checks its mailbox, so both runs must agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    explicit_port: bool,
}

impl ServerAddress {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`, falling back to
    /// `default_port` when none is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host or an invalid port.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| Error::Config(format!("Unclosed '[' in address '{input}'")))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after.strip_prefix(':').ok_or_else(|| {
                        Error::Config(format!("Unexpected text after ']' in '{input}'"))
                    })?;
                    (host, Some(port))
                }
            }
        } else {
            match input.matches(':').count() {
                0 => (input, None),
                1 => {
                    let (host, port) = input.split_once(':').unwrap_or((input, ""));
                    (host, Some(port))
                }
                // Bare IPv6 literal without a port.
                _ => (input, None),
            }
        };

        if host.is_empty() {
            return Err(Error::Config(format!("Missing host in address '{input}'")));
        }

        let (port, explicit_port) = match port {
            Some(p) => {
                let port = p
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| Error::Config(format!("Invalid port '{p}' in '{input}'")))?;
                (port, true)
            }
            None => (default_port, false),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            explicit_port,
        })
    }

    /// `host:port` suitable for `TcpStream::connect`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.explicit_port {
            f.write_str(&self.socket_addr())
        } else if self.host.contains(':') {
            write!(f, "[{}]", self.host)
        } else {
            f.write_str(&self.host)
        }
    }
}

/// Parses with the IMAP default port; use [`ServerAddress::parse`] for
/// submission addresses.
impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, IMAP_PORT)
    }
}

/// Connection and credential bundle for one mail server.
#[derive(Clone)]
pub struct Endpoint {
    /// SMTP submission server.
    pub smtp: ServerAddress,
    /// IMAP server holding the probe mailbox.
    pub imap: ServerAddress,
    /// Probe mailbox address, used both as sender and recipient.
    pub address: String,
    pub username: String,
    pub password: String,
    /// Upgrade plaintext connections with STARTTLS.
    pub starttls: bool,
}

impl Endpoint {
    /// Build an endpoint from the raw strings a user would supply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either server address is invalid
    /// or the mailbox address is empty.
    pub fn new(
        smtp: &str,
        imap: &str,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        starttls: bool,
    ) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::Config("Probe mailbox address is empty".into()));
        }

        Ok(Self {
            smtp: ServerAddress::parse(smtp, SUBMISSION_PORT)?,
            imap: ServerAddress::parse(imap, IMAP_PORT)?,
            address,
            username: username.into(),
            password: password.into(),
            starttls,
        })
    }

    /// Correlation key stamped into probes sent from this endpoint.
    #[must_use]
    pub fn sender_key(&self) -> String {
        self.smtp.to_string()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("smtp", &self.smtp)
            .field("imap", &self.imap)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("starttls", &self.starttls)
            .finish()
    }
}

/// Options shared by every leg of a run.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Upper bound on each leg, including connect and logout.
    ///
    /// Checks and sends run as two phases, so a run can take up to
    /// twice this.
    pub timeout: Duration,
    /// Skip certificate verification after STARTTLS.
    pub accept_invalid_certs: bool,
    /// Identity of the machine running the probe.
    pub monitoring_host: String,
    /// Probes older than this are deleted without counting as found.
    pub staleness: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
            monitoring_host: local_hostname(),
            staleness: STALENESS_WINDOW,
        }
    }
}

/// Hostname of the machine running the probe.
#[must_use]
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
