// ABOUTME: Configuration for the connection fleet
//
// Defines FleetConfig with all tunable parameters:
// - Target endpoint and pool shape (batch count, batch size)
// - Egress routes (proxy list or explicit direct dialing)
// - Per-connection reconnect and keepalive knobs (ConnectionConfig)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::route::{EgressRoute, FixedRoute, RoundRobinRoutes, RouteError, RouteProvider};
use super::transport::websocket::DEFAULT_SEND_QUEUE;
use super::transport::{Target, TransportError};

/// Keepalive frame sent when none is configured
pub const DEFAULT_KEEPALIVE_PAYLOAD: &str = r#"{"operation":"ping","music":"never meant to leave you hurting.. never meant to do the worst thing.. not to you.. I can't take no more.. no more.. no more... no.. I got nobody.. here on my own.. i got no body so I do it solo..."}"#;

/// Longest accepted reconnect, keepalive or handshake interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors found while validating a fleet configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Target address is not usable
    #[error(transparent)]
    Target(#[from] TransportError),

    /// A proxy entry could not be parsed
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Batches must contain at least one connection
    #[error("batch_size must be greater than zero")]
    EmptyBatch,

    /// A timing knob is zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A timing knob exceeds `MAX_INTERVAL`
    #[error("{field} must not exceed {} ms", .max.as_millis())]
    DurationTooLarge { field: &'static str, max: Duration },

    /// Neither proxies nor direct dialing were chosen
    #[error("no egress route policy: configure at least one proxy or set direct = true")]
    NoRoutePolicy,

    /// Both proxies and direct dialing were chosen
    #[error("proxies and direct = true are mutually exclusive")]
    ConflictingRoutes,
}

/// Reconnect and keepalive settings shared by every connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Delay before reconnecting after a failure or close
    #[serde(rename = "reconnect_interval_ms", with = "duration_millis")]
    pub reconnect_interval: Duration,

    /// Consecutive failed attempts tolerated before going dormant
    pub max_reconnect_attempts: u32,

    /// Keepalive cadence while open
    #[serde(rename = "keepalive_interval_ms", with = "duration_millis")]
    pub keepalive_interval: Duration,

    /// Handshake deadline; expiry counts as a transport failure
    #[serde(rename = "connect_timeout_ms", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Text frame sent verbatim on every keepalive tick
    pub keepalive_payload: String,

    /// Outbound frames buffered per session before sends fail
    pub send_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(1000),
            max_reconnect_attempts: 4,
            keepalive_interval: Duration::from_micros(16_700),
            connect_timeout: Duration::from_secs(10),
            keepalive_payload: DEFAULT_KEEPALIVE_PAYLOAD.to_string(),
            send_queue_capacity: DEFAULT_SEND_QUEUE,
        }
    }
}

impl ConnectionConfig {
    /// Check every knob is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("reconnect_interval_ms", self.reconnect_interval),
            ("keepalive_interval_ms", self.keepalive_interval),
            ("connect_timeout_ms", self.connect_timeout),
        ];

        for (field, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError::ZeroDuration(field));
            }
            if interval > MAX_INTERVAL {
                return Err(ConfigError::DurationTooLarge {
                    field,
                    max: MAX_INTERVAL,
                });
            }
        }
        Ok(())
    }
}

/// Configuration for the whole fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// WebSocket endpoint every connection dials
    pub target: String,

    /// Number of batches to create
    pub batch_count: usize,

    /// Connections per batch
    pub batch_size: usize,

    /// Proxies rotated between batches (`http://host:port` or `host:port`)
    pub proxies: Vec<String>,

    /// Dial the target directly instead of through proxies
    pub direct: bool,

    /// Per-connection behaviour
    pub connection: ConnectionConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            target: "wss://dimden.dev/services/chat".to_string(),
            batch_count: 200,
            batch_size: 4,
            proxies: vec![],
            direct: false,
            connection: ConnectionConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Total number of connections the pool will create
    pub const fn total_connections(&self) -> usize {
        self.batch_count.saturating_mul(self.batch_size)
    }

    /// Parsed target address
    pub fn target(&self) -> Result<Target, ConfigError> {
        Ok(Target::parse(&self.target)?)
    }

    /// Parsed egress routes in rotation order
    pub fn routes(&self) -> Result<Vec<EgressRoute>, ConfigError> {
        match (self.proxies.is_empty(), self.direct) {
            (false, true) => Err(ConfigError::ConflictingRoutes),
            (true, false) => Err(ConfigError::NoRoutePolicy),
            (true, true) => Ok(vec![EgressRoute::Direct]),
            (false, false) => self
                .proxies
                .iter()
                .map(|address| EgressRoute::parse_proxy(address).map_err(ConfigError::from))
                .collect(),
        }
    }

    /// Route provider matching the configured policy
    pub fn route_provider(&self) -> Result<Box<dyn RouteProvider + Send>, ConfigError> {
        let routes = self.routes()?;
        if self.direct {
            return Ok(Box::new(FixedRoute(EgressRoute::Direct)));
        }
        Ok(Box::new(RoundRobinRoutes::new(routes)?))
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target()?;
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        self.routes()?;
        self.connection.validate()
    }
}

/// Serde helper for Duration as (fractional) milliseconds
mod duration_millis {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_secs_f64() * 1000.0;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(D::Error::custom(format!(
                "duration must be a non-negative number of milliseconds, got {millis}"
            )));
        }
        Duration::try_from_secs_f64(millis / 1000.0).map_err(|e| {
            D::Error::custom(format!("duration of {millis} ms is out of range: {e}"))
        })
    }
}
