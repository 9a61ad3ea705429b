//! Server network layer handling TCP connections
//!
//! Two listeners share one [`Server`]: a binary one and a JSON one. Each
//! accepted socket gets a reader task, which decodes and dispatches packets
//! in arrival order, and a writer task, which encodes whatever handlers
//! queued on the connection. A keepalive task pings every connection and
//! drops the silent ones.

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::facade::Server;
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use shared::{CodecError, Encoding, Packet, ServerPing};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::interval;

const READ_CHUNK_SIZE: usize = 4096;

/// Listening half of the server
pub struct NetworkServer {
    binary: TcpListener,
    json: TcpListener,
    server: Arc<Server>,
    dispatcher: Arc<Dispatcher>,
}

impl NetworkServer {
    /// Binds both listeners on the addresses of the server configuration
    pub async fn bind(server: Arc<Server>, dispatcher: Arc<Dispatcher>) -> Result<Self, ServerError> {
        let binary = TcpListener::bind(&server.config().binary_addr).await?;
        let json = TcpListener::bind(&server.config().json_addr).await?;
        info!(
            "Server listening on {} (binary) and {} (json)",
            binary.local_addr()?,
            json.local_addr()?
        );

        Ok(Self {
            binary,
            json,
            server,
            dispatcher,
        })
    }

    pub fn binary_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.binary.local_addr()?)
    }

    pub fn json_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.json.local_addr()?)
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Serves until ctrl-c
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let keepalive = tokio::spawn(keepalive(Arc::clone(&self.server)));
        tokio::pin!(shutdown);

        info!("Server started successfully");
        loop {
            tokio::select! {
                accepted = self.binary.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr, Encoding::Binary),
                    Err(e) => warn!("Failed to accept binary connection: {}", e),
                },
                accepted = self.json.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr, Encoding::Json),
                    Err(e) => warn!("Failed to accept json connection: {}", e),
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        keepalive.abort();
        for conn in self.server.registry().snapshot() {
            conn.close();
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, encoding: Encoding) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(addr, encoding, tx));
        if let Err(e) = self.server.connect(Arc::clone(&conn)) {
            warn!("Refusing {}: {}", addr, e);
            return;
        }
        info!("Client connected from {} ({})", addr, encoding);

        let (reader, writer) = stream.into_split();
        tokio::spawn(async move {
            if let Err(e) = write_loop(writer, rx, encoding).await {
                debug!("Writer for {} stopped: {}", addr, e);
            }
        });

        let server = Arc::clone(&self.server);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            match read_loop(reader, &conn, &server, &dispatcher).await {
                Ok(()) => info!("Client {} disconnected", addr),
                Err(e) => warn!("Client {} dropped: {}", addr, e),
            }
            server.disconnect(&conn);
        });
    }
}

/// Reads, decodes and dispatches until EOF, close or a transport failure
pub async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    conn: &Arc<Connection>,
    server: &Server,
    dispatcher: &Dispatcher,
) -> Result<(), ServerError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = conn.closed() => {
                debug!("Closing connection {}", conn.addr());
                return Ok(());
            }
        };
        if read == 0 {
            return Ok(());
        }

        buffer.extend_from_slice(&chunk[..read]);
        let used = process_buffer(&buffer, conn, server, dispatcher)?;
        buffer.drain(..used);
    }
}

/// Dispatches every complete packet in `buffer`, returning the bytes used
fn process_buffer(
    buffer: &[u8],
    conn: &Arc<Connection>,
    server: &Server,
    dispatcher: &Dispatcher,
) -> Result<usize, CodecError> {
    let encoding = conn.encoding();
    let limit = server.config().max_frame_size;
    let mut offset = 0;

    while offset < buffer.len() {
        match encoding.decode_with_limit(&buffer[offset..], limit) {
            Ok((packet, consumed)) => {
                offset += consumed;
                dispatcher.dispatch(server, conn, packet);
            }
            Err(CodecError::IncompleteFrame) => break,
            Err(CodecError::MalformedMessage { consumed, reason }) => {
                warn!("Malformed message from {}: {}", conn.addr(), reason);
                offset += consumed;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(offset)
}

/// Encodes queued packets onto the socket until every sender is gone
pub async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Packet>,
    encoding: Encoding,
) -> std::io::Result<()> {
    while let Some(packet) = outbound.recv().await {
        match encoding.encode(&packet) {
            Ok(bytes) => writer.write_all(&bytes).await?,
            Err(e) => warn!("Failed to encode command {}: {}", packet.command_id(), e),
        }
    }
    writer.shutdown().await
}

/// Pings every connection and closes the ones idle for too long
async fn keepalive(server: Arc<Server>) {
    let config = server.config();
    let idle_limit = u64::try_from(config.idle_timeout.as_millis()).unwrap_or(u64::MAX);
    let mut ticker = interval(config.ping_interval);

    loop {
        ticker.tick().await;
        let now = get_timestamp();

        for conn in server.registry().snapshot() {
            let last_seen = conn.with_session(|s| s.last_seen);
            if now.saturating_sub(last_seen) > idle_limit {
                info!("Client {} timed out", conn.addr());
                conn.close();
            } else {
                conn.send(ServerPing {});
            }
        }
    }
}
