//! Bootstrap addresses — where a client goes to register.

use std::fmt;
use std::str::FromStr;

use url::{ParseError, Url};

/// Transport scheme of a bootstrap address. Only TCP exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
}

/// One `scheme://host:port` registry location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAddr {
    pub scheme: Scheme,
    /// Host name or IP literal. IPv6 literals keep their brackets.
    pub host: String,
    pub port: u16,
}

impl BootstrapAddr {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: Scheme::Tcp,
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn connect_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<std::net::SocketAddr> for BootstrapAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        let host = match addr {
            std::net::SocketAddr::V4(v4) => v4.ip().to_string(),
            std::net::SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
        };
        Self::tcp(host, addr.port())
    }
}

impl fmt::Display for BootstrapAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Tcp => write!(f, "tcp://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("missing scheme in {0:?} (expected tcp://host:port)")]
    MissingScheme(String),
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("empty host in {0:?}")]
    EmptyHost(String),
    #[error("malformed address {0:?}: {1}")]
    Malformed(String, ParseError),
}

impl FromStr for BootstrapAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let url = Url::parse(s).map_err(|e| match e {
            ParseError::RelativeUrlWithoutBase => AddrError::MissingScheme(s.to_string()),
            ParseError::InvalidPort => AddrError::InvalidPort(s.to_string()),
            ParseError::EmptyHost => AddrError::EmptyHost(s.to_string()),
            other => AddrError::Malformed(s.to_string(), other),
        })?;
        // "registry:9010" parses as scheme "registry" with an opaque path.
        if url.cannot_be_a_base() {
            return Err(AddrError::MissingScheme(s.to_string()));
        }
        let scheme = match url.scheme() {
            "tcp" => Scheme::Tcp,
            other => return Err(AddrError::UnsupportedScheme(other.to_string())),
        };
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(AddrError::EmptyHost(s.to_string())),
        };
        let port = url
            .port()
            .ok_or_else(|| AddrError::MissingPort(s.to_string()))?;
        Ok(Self { scheme, host, port })
    }
}
