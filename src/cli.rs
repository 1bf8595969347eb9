use std::{net::IpAddr, time::Duration};

use clap::{ArgGroup, Parser};

use crate::config::{Config, TransportMode};

/// Run the MCP server over stdio, a single HTTP endpoint, or SSE.
///
/// Flags override the corresponding environment variables.
#[derive(Debug, Parser)]
#[command(name = "mcp-transport-server", version, about)]
#[command(group(ArgGroup::new("transport").args(["stdio", "http", "sse"])))]
pub struct Cli {
    /// Serve over stdin/stdout (default)
    #[arg(long)]
    pub stdio: bool,
    /// Serve request/response JSON-RPC on a single HTTP endpoint
    #[arg(long)]
    pub http: bool,
    /// Serve SSE sessions on /sse with inbound messages on /messages
    #[arg(long)]
    pub sse: bool,
    /// Port for http/sse (default 3000)
    #[arg(long)]
    pub port: Option<u16>,
    /// HTTP endpoint route (default /mcp)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Address to listen on for http/sse
    #[arg(long)]
    pub bind_addr: Option<IpAddr>,
    /// Seconds to wait for in-flight requests during shutdown
    #[arg(long, value_name = "SECS")]
    pub shutdown_timeout: Option<u64>,
}

impl Cli {
    pub fn mode(&self) -> Option<TransportMode> {
        if self.http {
            Some(TransportMode::Http)
        } else if self.sse {
            Some(TransportMode::Sse)
        } else if self.stdio {
            Some(TransportMode::Stdio)
        } else {
            None
        }
    }

    pub fn apply(self, mut config: Config) -> Config {
        if let Some(mode) = self.mode() {
            config.mode = mode;
        }
        if let Some(port) = self.port {
            config.bind_port = port;
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(secs) = self.shutdown_timeout {
            config.shutdown_timeout = Duration::from_secs(secs);
        }
        config
    }
}
