//! Server lifecycle: startup, supervision, and a single graceful shutdown
//!
//! Startup validates the transport configuration, selects the adapter and binds it to the
//! protocol server. Shutdown can be requested any number of times (operator action,
//! SIGINT, SIGTERM, end of the stdio stream) and still runs exactly once.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::errors::TransportError;
use crate::mcp::handle::ServerHandle;
use crate::transport::{flatten, RunningTransport, Transport};

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts shutdown. Only the first call returns `true`.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(reason, "shutdown already in progress");
            return false;
        }
        info!(reason, "shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}

pub struct LifecycleController {
    server: ServerHandle,
    signal: ShutdownSignal,
    drain_timeout: Duration,
    released: AtomicBool,
}

impl LifecycleController {
    pub fn new(server: ServerHandle, drain_timeout: Duration) -> Self {
        Self {
            server,
            signal: ShutdownSignal::new(),
            drain_timeout,
            released: AtomicBool::new(false),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Validates, selects and binds. Nothing is left listening if this fails.
    pub async fn start(&self, config: &TransportConfig) -> Result<RunningTransport, TransportError> {
        let transport = Transport::select(config)?;
        let kind = transport.kind();
        let running = transport.bind(&self.server, self.signal.token()).await?;
        info!(
            transport = %kind,
            addr = ?running.local_addr(),
            "transport started"
        );
        Ok(running)
    }

    /// Runs the server until the transport ends or shutdown is requested, then shuts down.
    pub async fn run(&self, config: &TransportConfig) -> Result<(), TransportError> {
        let running = match self.start(config).await {
            Ok(running) => running,
            Err(err) => {
                self.release_handle().await;
                return Err(err);
            }
        };

        let result = self.supervise(running).await;
        self.shutdown().await;
        result
    }

    pub async fn supervise(&self, mut running: RunningTransport) -> Result<(), TransportError> {
        let finished = tokio::select! {
            joined = running.task_mut() => Some(flatten(joined)),
            () = self.signal.triggered() => None,
        };

        if let Some(result) = finished {
            self.signal.trigger("transport finished");
            if let Err(err) = &result {
                error!(error = %err, transport = %running.kind(), "transport stopped with error");
            }
            return result;
        }

        match tokio::time::timeout(self.drain_timeout, running.task_mut()).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let closed = running.abort();
                warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    closed_sessions = closed,
                    "drain timed out, forcing transport closed"
                );
                Ok(())
            }
        }
    }

    /// Stops the transport and releases the protocol server. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.signal.trigger("shutdown");
        self.release_handle().await;
    }

    async fn release_handle(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.server.close().await {
            let err = TransportError::Shutdown(err);
            error!(error = %err, "shutdown continued after failure");
        }
    }
}

/// Triggers shutdown on SIGINT and, on unix, SIGTERM. Repeated signals are absorbed.
pub fn spawn_signal_listener(signal: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = listen_for_signals(&signal).await {
            warn!(error = %err, "signal handling unavailable");
        }
    })
}

#[cfg(unix)]
async fn listen_for_signals(signal: &ShutdownSignal) -> io::Result<()> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut terminate = unix_signal(SignalKind::terminate())?;
    loop {
        let name = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                "SIGINT"
            }
            _ = terminate.recv() => "SIGTERM",
        };
        signal.trigger(name);
    }
}

#[cfg(not(unix))]
async fn listen_for_signals(signal: &ShutdownSignal) -> io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        signal.trigger("ctrl-c");
    }
}
