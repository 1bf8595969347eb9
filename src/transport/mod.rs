//! Transports that expose the protocol server
//!
//! [`Transport::select`] maps a [`TransportConfig`] to exactly one adapter; [`Transport::bind`]
//! attaches it to the server and starts it.

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, TransportConfig};
use crate::errors::TransportError;
use crate::mcp::handle::{ChannelKind, ServerHandle};

pub mod connection;
pub mod duplex;
pub mod session;
pub mod single_endpoint;
pub mod streaming;

pub use connection::Connection;
pub use duplex::DuplexAdapter;
pub use session::{Session, SessionId, SessionRegistry};
pub use single_endpoint::SingleEndpointAdapter;
pub use streaming::StreamingAdapter;

#[derive(Debug)]
pub enum Transport {
    Duplex(DuplexAdapter),
    SingleEndpoint(SingleEndpointAdapter),
    Streaming(StreamingAdapter),
}

impl Transport {
    /// Validates the configuration and builds the matching adapter without touching any
    /// socket or stream.
    pub fn select(config: &TransportConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = match config {
            TransportConfig::Duplex => Self::Duplex(DuplexAdapter::stdio()),
            TransportConfig::SingleEndpoint {
                bind_addr,
                port,
                route,
            } => Self::SingleEndpoint(SingleEndpointAdapter::new(
                SocketAddr::new(*bind_addr, *port),
                route.clone(),
            )),
            TransportConfig::Streaming { bind_addr, port } => {
                Self::Streaming(StreamingAdapter::new(SocketAddr::new(*bind_addr, *port)))
            }
        };
        Ok(transport)
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Duplex(_) => ChannelKind::Duplex,
            Self::SingleEndpoint(_) => ChannelKind::SingleEndpoint,
            Self::Streaming(_) => ChannelKind::Streaming,
        }
    }

    pub async fn bind(
        self,
        server: &ServerHandle,
        shutdown: CancellationToken,
    ) -> Result<RunningTransport, TransportError> {
        match self {
            Self::Duplex(adapter) => adapter.bind(server, shutdown).await,
            Self::SingleEndpoint(adapter) => adapter.bind(server, shutdown).await,
            Self::Streaming(adapter) => adapter.bind(server, shutdown).await,
        }
    }
}

/// A bound transport running on its own task.
#[derive(Debug)]
pub struct RunningTransport {
    kind: ChannelKind,
    local_addr: Option<SocketAddr>,
    sessions: Option<SessionRegistry>,
    task: JoinHandle<Result<(), TransportError>>,
}

impl RunningTransport {
    pub fn new(
        kind: ChannelKind,
        local_addr: Option<SocketAddr>,
        sessions: Option<SessionRegistry>,
        task: JoinHandle<Result<(), TransportError>>,
    ) -> Self {
        Self {
            kind,
            local_addr,
            sessions,
            task,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn sessions(&self) -> Option<&SessionRegistry> {
        self.sessions.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn task_mut(&mut self) -> &mut JoinHandle<Result<(), TransportError>> {
        &mut self.task
    }

    /// Stops the task and closes any sessions it left behind.
    pub fn abort(&self) -> usize {
        self.task.abort();
        self.sessions
            .as_ref()
            .map_or(0, SessionRegistry::close_all)
    }

    pub async fn wait(self) -> Result<(), TransportError> {
        flatten(self.task.await)
    }
}

pub(crate) fn flatten(
    joined: Result<Result<(), TransportError>, tokio::task::JoinError>,
) -> Result<(), TransportError> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(TransportError::Task(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

    #[test]
    fn selects_one_adapter_per_variant() {
        let duplex = Transport::select(&TransportConfig::Duplex).expect("duplex");
        assert!(matches!(duplex, Transport::Duplex(_)));
        assert_eq!(duplex.kind(), ChannelKind::Duplex);

        let single = Transport::select(&TransportConfig::SingleEndpoint {
            bind_addr: LOCALHOST,
            port: 8080,
            route: "/mcp".to_string(),
        })
        .expect("single endpoint");
        match single {
            Transport::SingleEndpoint(adapter) => {
                assert_eq!(adapter.addr(), SocketAddr::new(LOCALHOST, 8080));
                assert_eq!(adapter.route(), "/mcp");
            }
            other => panic!("unexpected adapter {other:?}"),
        }

        let streaming = Transport::select(&TransportConfig::Streaming {
            bind_addr: LOCALHOST,
            port: 4000,
        })
        .expect("streaming");
        assert_eq!(streaming.kind(), ChannelKind::Streaming);
    }

    #[test]
    fn invalid_configs_fail_before_any_adapter_exists() {
        let bad_port = Transport::select(&TransportConfig::Streaming {
            bind_addr: LOCALHOST,
            port: 0,
        });
        assert!(matches!(bad_port, Err(ConfigError::InvalidPort)));

        let bad_route = Transport::select(&TransportConfig::SingleEndpoint {
            bind_addr: LOCALHOST,
            port: 8080,
            route: "mcp".to_string(),
        });
        assert!(matches!(bad_route, Err(ConfigError::InvalidRoute(_))));
    }
}
