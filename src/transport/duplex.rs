//! Duplex-stream transport over the process's stdin/stdout
//!
//! Messages are newline-delimited JSON. There is exactly one implicit session, and the
//! transport ends when the input stream closes.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{BindError, TransportError};
use crate::mcp::handle::{ChannelKind, ServerHandle};
use crate::mcp::rpc::{json_rpc_error, PARSE_ERROR};
use crate::transport::{connection::Connection, RunningTransport};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct DuplexAdapter {
    io: Option<(BoxedReader, BoxedWriter)>,
}

impl DuplexAdapter {
    /// Adapter over the process streams, which are only touched on `bind`.
    pub fn stdio() -> Self {
        Self { io: None }
    }

    pub fn with_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            io: Some((Box::new(reader), Box::new(writer))),
        }
    }

    pub async fn bind(
        self,
        server: &ServerHandle,
        shutdown: CancellationToken,
    ) -> Result<RunningTransport, TransportError> {
        let connection =
            Connection::open(server, ChannelKind::Duplex, None).map_err(BindError::from)?;
        let (reader, writer): (BoxedReader, BoxedWriter) = match self.io {
            Some(io) => io,
            None => (Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout())),
        };

        info!(connection = %connection.id(), "stdio transport attached");
        let task = tokio::spawn(pump(connection, reader, writer, shutdown));
        Ok(RunningTransport::new(ChannelKind::Duplex, None, None, task))
    }
}

impl std::fmt::Debug for DuplexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexAdapter")
            .field("stdio", &self.io.is_none())
            .finish()
    }
}

async fn pump(
    connection: Connection,
    reader: BoxedReader,
    writer: BoxedWriter,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    let mut lines = BufReader::new(reader).lines();
    let mut writer = BufWriter::new(writer);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("stdio transport stopping on shutdown");
                break;
            }
            line = lines.next_line() => line.map_err(TransportError::Stream)?,
        };

        let Some(line) = line else {
            info!("stdin closed");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Value>(line) {
            Ok(payload) => connection.request(payload).await,
            Err(_) => Some(json_rpc_error(None, PARSE_ERROR, "Parse error")),
        };

        if let Some(reply) = reply {
            write_line(&mut writer, &reply).await?;
        }
    }

    writer.flush().await.map_err(TransportError::Stream)
}

async fn write_line(
    writer: &mut BufWriter<BoxedWriter>,
    message: &Value,
) -> Result<(), TransportError> {
    let mut frame = message.to_string();
    frame.push('\n');
    writer
        .write_all(frame.as_bytes())
        .await
        .map_err(TransportError::Stream)?;
    writer.flush().await.map_err(TransportError::Stream)
}
