// ABOUTME: Egress routes and the pluggable strategy that hands them out between batches
//
// A route is fixed for the whole life of a connection; the pool asks the
// provider for the current route while building a batch and advances it
// afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors produced while building routes or route providers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A proxy address could not be parsed
    #[error("Invalid proxy '{address}': {reason}")]
    InvalidProxy { address: String, reason: String },

    /// A rotating provider needs at least one route
    #[error("Route list is empty")]
    Empty,
}

/// Outbound network path used by a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EgressRoute {
    /// Dial the target directly
    Direct,
    /// Tunnel through an HTTP proxy with `CONNECT`
    HttpProxy { host: String, port: u16 },
}

impl EgressRoute {
    /// Parse a proxy given as `http://host:port` or bare `host:port`
    pub fn parse_proxy(address: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidProxy {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty proxy address"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http:// proxies are supported"));
        }

        let host = match url.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(invalid("missing host")),
        };
        let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;

        Ok(Self::HttpProxy { host, port })
    }

    /// Returns true when this route tunnels through a proxy
    pub const fn is_proxied(&self) -> bool {
        matches!(self, Self::HttpProxy { .. })
    }
}

impl fmt::Display for EgressRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::HttpProxy { host, port } if host.contains(':') => {
                write!(f, "http://[{host}]:{port}")
            }
            Self::HttpProxy { host, port } => write!(f, "http://{host}:{port}"),
        }
    }
}

/// Strategy that supplies egress routes for newly created connections
///
/// The pool reads `current()` for every connection of a batch and calls
/// `advance()` once after the batch is complete.
#[cfg_attr(test, mockall::automock)]
pub trait RouteProvider {
    /// Route to assign to connections created from now on
    fn current(&self) -> EgressRoute;

    /// Move on to the next route
    fn advance(&mut self);
}

impl<P: RouteProvider + ?Sized> RouteProvider for Box<P> {
    fn current(&self) -> EgressRoute {
        (**self).current()
    }

    fn advance(&mut self) {
        (**self).advance();
    }
}

/// Cycles through a fixed list of routes, wrapping around at the end
#[derive(Debug, Clone)]
pub struct RoundRobinRoutes {
    routes: Vec<EgressRoute>,
    cursor: usize,
}

impl RoundRobinRoutes {
    /// Create a provider over `routes`, starting at the first entry
    pub fn new(routes: Vec<EgressRoute>) -> Result<Self, RouteError> {
        if routes.is_empty() {
            return Err(RouteError::Empty);
        }
        Ok(Self { routes, cursor: 0 })
    }

    /// Number of distinct routes in rotation
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Always false; construction rejects empty lists
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteProvider for RoundRobinRoutes {
    fn current(&self) -> EgressRoute {
        self.routes[self.cursor].clone()
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.routes.len();
    }
}

/// Hands out the same route forever
#[derive(Debug, Clone)]
pub struct FixedRoute(pub EgressRoute);

impl RouteProvider for FixedRoute {
    fn current(&self) -> EgressRoute {
        self.0.clone()
    }

    fn advance(&mut self) {}
}
