//! Publish address extraction from log lines.

use super::consumer::LineConsumer;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static PUBLISH_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^.*\[(?P<protocol>http|o\.e\.h\.HttpServer|psql|transport|o\.e\.t\.TransportService) +\] ",
        r"\[.*\] .*",
        r"publish_address \{",
        r"(?:inet\[[\w.-]*/|\[)?",
        r"(?:[\w.-]+/)?",
        r"(?P<addr>[\d.:]+)",
        r"\]?",
        r"\}",
    ))
    .expect("publish address regex must compile")
});

/// Protocol a publish address was announced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Psql,
    Transport,
}

impl Protocol {
    /// Map a log tag to a protocol, resolving the verbose logger names.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "http" | "o.e.h.HttpServer" => Some(Protocol::Http),
            "psql" => Some(Protocol::Psql),
            "transport" | "o.e.t.TransportService" => Some(Protocol::Transport),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Psql => "psql",
            Protocol::Transport => "transport",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `host:port` announced by the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    /// Parse a `host:port` token. Returns `None` if the port is missing or invalid.
    pub fn parse(protocol: Protocol, addr: &str) -> Option<Self> {
        let (host, port) = addr.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self {
            protocol,
            host: host.to_string(),
            port,
        })
    }

    /// The `host:port` form.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse the protocol and bound address out of a log line.
///
/// Returns `None` for every line that is not a `publish_address` announcement.
///
/// ```
/// use noderun::output::{parse_publish_address, Protocol};
///
/// assert_eq!(parse_publish_address("NONE"), None);
/// assert_eq!(
///     parse_publish_address(
///         "[INFO ][psql  ] [8f64DTi] publish_address {127.0.0.1:5432}, bound_addresses {127.0.0.1:5432}"
///     ),
///     Some((Protocol::Psql, "127.0.0.1:5432".to_string()))
/// );
/// ```
pub fn parse_publish_address(line: &str) -> Option<(Protocol, String)> {
    let caps = PUBLISH_ADDRESS_RE.captures(line)?;
    let protocol = Protocol::from_tag(caps.name("protocol")?.as_str())?;
    let addr = caps.name("addr")?.as_str().to_string();
    Some((protocol, addr))
}

type AddressCallback = Box<dyn Fn(NetworkAddress) + Send + Sync>;

/// Forwards every announced publish address to a callback.
pub struct AddressExtractor {
    on_address: AddressCallback,
}

impl AddressExtractor {
    pub fn new(on_address: impl Fn(NetworkAddress) + Send + Sync + 'static) -> Self {
        Self {
            on_address: Box::new(on_address),
        }
    }
}

impl LineConsumer for AddressExtractor {
    fn accept(&self, line: &str) {
        let Some((protocol, addr)) = parse_publish_address(line) else {
            return;
        };
        match NetworkAddress::parse(protocol, &addr) {
            Some(address) => (self.on_address)(address),
            None => debug!("Ignoring unparseable {} address {:?}", protocol, addr),
        }
    }
}

impl fmt::Debug for AddressExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressExtractor").finish_non_exhaustive()
    }
}
