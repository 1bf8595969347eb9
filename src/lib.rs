pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod mcp;
pub mod transport;

pub use lifecycle::{LifecycleController, ShutdownSignal};
pub use mcp::handle::{ProtocolServer, ServerHandle};
pub use transport::Transport;
