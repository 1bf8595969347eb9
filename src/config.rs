use std::{env, fmt, net::IpAddr, str::FromStr, time::Duration};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ENDPOINT: &str = "/mcp";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes every network transport mounts next to its protocol routes.
pub const RESERVED_ROUTES: &[&str] = &["/health", "/.well-known/mcp"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MCP_TRANSPORT must be one of: stdio, http, sse")]
    InvalidTransport,
    #[error("port must be an integer between 1 and 65535")]
    InvalidPort,
    #[error("BIND_ADDR must be a valid IP address")]
    InvalidBindAddr,
    #[error("endpoint route must be non-empty, start with '/' and not shadow {0}")]
    InvalidRoute(String),
    #[error("MCP_SHUTDOWN_TIMEOUT_SECS must be a whole number of seconds")]
    InvalidShutdownTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Stdio,
    Http,
    Sse,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "sse" => Ok(Self::Sse),
            _ => Err(ConfigError::InvalidTransport),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: TransportMode,
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    pub endpoint: String,
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stdio,
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            bind_port: DEFAULT_PORT,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let mode = read("MCP_TRANSPORT")
            .map(|value| value.parse::<TransportMode>())
            .transpose()?
            .unwrap_or(defaults.mode);
        let bind_addr = read("BIND_ADDR")
            .map(|value| {
                value
                    .parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidBindAddr)
            })
            .transpose()?
            .unwrap_or(defaults.bind_addr);
        let bind_port = read("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(defaults.bind_port);
        let endpoint = read("MCP_ENDPOINT").unwrap_or(defaults.endpoint);
        let shutdown_timeout = read("MCP_SHUTDOWN_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidShutdownTimeout)
            })
            .transpose()?
            .unwrap_or(defaults.shutdown_timeout);

        Ok(Self {
            mode,
            bind_addr,
            bind_port,
            endpoint,
            shutdown_timeout,
        })
    }

    /// Builds the transport selection. Validation happens in
    /// [`TransportConfig::validate`], right before an adapter is chosen.
    pub fn transport(&self) -> TransportConfig {
        match self.mode {
            TransportMode::Stdio => TransportConfig::Duplex,
            TransportMode::Http => TransportConfig::SingleEndpoint {
                bind_addr: self.bind_addr,
                port: self.bind_port,
                route: self.endpoint.clone(),
            },
            TransportMode::Sse => TransportConfig::Streaming {
                bind_addr: self.bind_addr,
                port: self.bind_port,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportConfig {
    #[default]
    Duplex,
    SingleEndpoint {
        bind_addr: IpAddr,
        port: u16,
        route: String,
    },
    Streaming {
        bind_addr: IpAddr,
        port: u16,
    },
}

impl TransportConfig {
    pub fn mode(&self) -> TransportMode {
        match self {
            Self::Duplex => TransportMode::Stdio,
            Self::SingleEndpoint { .. } => TransportMode::Http,
            Self::Streaming { .. } => TransportMode::Sse,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Duplex => Ok(()),
            Self::SingleEndpoint { port, route, .. } => {
                validate_port(*port)?;
                validate_route(route)
            }
            Self::Streaming { port, .. } => validate_port(*port),
        }
    }
}

fn validate_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort);
    }
    Ok(())
}

fn validate_route(route: &str) -> Result<(), ConfigError> {
    let reserved = RESERVED_ROUTES.join(", ");
    if route.is_empty() || !route.starts_with('/') || RESERVED_ROUTES.contains(&route) {
        return Err(ConfigError::InvalidRoute(reserved));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn parse_defaults() {
        let config = Config::from_lookup(lookup(&[])).expect("config should parse");
        assert_eq!(config.mode, TransportMode::Stdio);
        assert_eq!(config.bind_addr, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.bind_port, 3000);
        assert_eq!(config.endpoint, "/mcp");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.transport(), TransportConfig::Duplex);
    }

    #[test]
    fn sse_mode_builds_streaming_transport() {
        let config = Config::from_lookup(lookup(&[
            ("MCP_TRANSPORT", "SSE"),
            ("BIND_ADDR", "0.0.0.0"),
            ("BIND_PORT", "4000"),
        ]))
        .expect("config should parse");

        assert_eq!(
            config.transport(),
            TransportConfig::Streaming {
                bind_addr: IpAddr::from([0, 0, 0, 0]),
                port: 4000,
            }
        );
    }

    #[test]
    fn http_mode_carries_route() {
        let config = Config::from_lookup(lookup(&[
            ("MCP_TRANSPORT", "http"),
            ("MCP_ENDPOINT", "/rpc"),
        ]))
        .expect("config should parse");

        let transport = config.transport();
        assert_eq!(transport.mode(), TransportMode::Http);
        assert!(matches!(
            transport,
            TransportConfig::SingleEndpoint { ref route, port: 3000, .. } if route == "/rpc"
        ));
    }

    #[test]
    fn invalid_transport_fails() {
        let err = Config::from_lookup(lookup(&[("MCP_TRANSPORT", "websocket")]))
            .expect_err("expected invalid transport");
        assert!(matches!(err, ConfigError::InvalidTransport));
    }

    #[test]
    fn out_of_range_port_fails() {
        let err = Config::from_lookup(lookup(&[("BIND_PORT", "70000")]))
            .expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_shutdown_timeout_fails() {
        let err = Config::from_lookup(lookup(&[("MCP_SHUTDOWN_TIMEOUT_SECS", "soon")]))
            .expect_err("expected invalid timeout");
        assert!(matches!(err, ConfigError::InvalidShutdownTimeout));
    }

    #[test]
    fn zero_port_is_rejected_by_validation() {
        let transport = TransportConfig::Streaming {
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            port: 0,
        };
        assert!(matches!(
            transport.validate(),
            Err(ConfigError::InvalidPort)
        ));
    }

    #[test]
    fn routes_must_be_absolute_and_unreserved() {
        for route in ["", "mcp", "/health", "/.well-known/mcp"] {
            let transport = TransportConfig::SingleEndpoint {
                bind_addr: IpAddr::from([127, 0, 0, 1]),
                port: 3000,
                route: route.to_string(),
            };
            assert!(
                matches!(transport.validate(), Err(ConfigError::InvalidRoute(_))),
                "route {route:?} should be rejected"
            );
        }
    }
}
