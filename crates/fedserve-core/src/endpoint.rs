//! Remote RPC endpoint identification.
//!
//! An endpoint is written as `host:port`. IPv6 literals must be bracketed
//! (`[::1]:50051`). The [`Display`](std::fmt::Display) form is canonical and is
//! used as the registry key, so `" 10.0.0.1:50051"` and `"10.0.0.1:050051"`
//! both map to `10.0.0.1:50051`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointParseError {
    #[error("endpoint '{0}' is missing a port")]
    MissingPort(String),

    #[error("endpoint '{0}' has an empty host")]
    EmptyHost(String),

    #[error("endpoint '{input}' has an invalid port '{port}'")]
    InvalidPort { input: String, port: String },

    #[error("endpoint '{0}' has an unbracketed IPv6 host")]
    UnbracketedIpv6(String),
}

/// A remote RPC target identified by host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Canonical registry key for this endpoint.
    #[inline]
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// URI for an HTTP/2 transport, `http` or `https` depending on `tls`.
    pub fn uri(&self, tls: bool) -> String {
        let scheme = if tls { "https" } else { "http" };
        format!("{scheme}://{self}")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_string()))?;

        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(inner) => inner,
            None if host.contains(':') => {
                return Err(EndpointParseError::UnbracketedIpv6(input.to_string()));
            }
            None => host,
        };

        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost(input.to_string()));
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| EndpointParseError::InvalidPort {
                input: input.to_string(),
                port: port.to_string(),
            })?;

        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let ep: Endpoint = "10.0.0.1:50051".parse().unwrap();
        assert_eq!(ep.host, "10.0.0.1");
        assert_eq!(ep.port, 50051);
        assert_eq!(ep.key(), "10.0.0.1:50051");
    }

    #[test]
    fn test_parse_hostname_and_whitespace() {
        let ep: Endpoint = "  serving.party-b.local:8000 ".parse().unwrap();
        assert_eq!(ep, Endpoint::new("serving.party-b.local", 8000));
    }

    #[test]
    fn test_canonical_key_is_stable() {
        let a: Endpoint = "10.0.0.1:050051".parse().unwrap();
        let b = Endpoint::new("10.0.0.1", 50051);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_parse_ipv6() {
        let ep: Endpoint = "[::1]:9370".parse().unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.to_string(), "[::1]:9370");
        assert_eq!(ep.uri(false), "http://[::1]:9370");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "10.0.0.1".parse::<Endpoint>(),
            Err(EndpointParseError::MissingPort(_))
        ));
        assert!(matches!(
            ":50051".parse::<Endpoint>(),
            Err(EndpointParseError::EmptyHost(_))
        ));
        assert!(matches!(
            "host:http".parse::<Endpoint>(),
            Err(EndpointParseError::InvalidPort { .. })
        ));
        assert!(matches!(
            "host:70000".parse::<Endpoint>(),
            Err(EndpointParseError::InvalidPort { .. })
        ));
        assert!(matches!(
            "host:0".parse::<Endpoint>(),
            Err(EndpointParseError::InvalidPort { .. })
        ));
        assert!(matches!(
            "::1:50051".parse::<Endpoint>(),
            Err(EndpointParseError::UnbracketedIpv6(_))
        ));
    }

    #[test]
    fn test_uri_scheme() {
        let ep = Endpoint::new("localhost", 8000);
        assert_eq!(ep.uri(false), "http://localhost:8000");
        assert_eq!(ep.uri(true), "https://localhost:8000");
    }
}
