use std::{process, sync::Arc};

use clap::Parser;
use mcp_transport_server::{
    cli::Cli,
    config::Config,
    lifecycle::{spawn_signal_listener, LifecycleController},
    logging,
    mcp::server::{McpServer, ServerInfo},
    ServerHandle,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => cli.apply(config),
        Err(err) => {
            error!(error = %err, "invalid configuration");
            process::exit(1);
        }
    };

    let info = ServerInfo::from_package();
    info!(
        name = %info.name,
        version = %info.version,
        transport = %config.mode,
        "server starting"
    );

    let server: ServerHandle = Arc::new(McpServer::new(info));
    let controller = LifecycleController::new(server, config.shutdown_timeout);
    spawn_signal_listener(controller.signal());

    // A pending stdin read would keep the runtime from shutting down, so exit explicitly.
    let code = match controller.run(&config.transport()).await {
        Ok(()) => {
            info!("server stopped");
            0
        }
        Err(err) => {
            error!(error = %err, fatal = err.is_fatal(), "server failed");
            1
        }
    };
    process::exit(code);
}
