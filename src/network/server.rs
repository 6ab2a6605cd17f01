//! TCP Game Server
//!
//! Async TCP server for sea battle matches.
//! Each connection gets a reader task (frame dispatch) and a writer task
//! (outbound queue), plus one background sweeper for expired rooms.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::RoomTimeouts;
use crate::network::connection::{Connection, Flow};
use crate::network::protocol::ServerMessage;
use crate::network::registry::RoomRegistry;
use crate::network::session::{Outbound, Outbox};
use crate::PROTOCOL_VERSION;

/// Default listening address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5691";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Read deadline before the player has a room.
    pub handshake_timeout: Duration,
    /// Read deadline once in a room.
    pub ping_timeout: Duration,
    /// Per-frame write deadline.
    pub write_timeout: Duration,
    /// Frames closer together than this count towards a flood.
    pub flood_interval: Duration,
    /// Consecutive quick frames that close the connection.
    pub flood_threshold: u32,
    /// Security errors that close the connection. 0 disables the ceiling.
    pub max_security_errors: u32,
    /// Phase ceilings.
    pub room_timeouts: RoomTimeouts,
    /// How often the sweeper looks for expired rooms.
    pub sweep_interval: Duration,
    /// Protocol version clients must send.
    pub client_version: String,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5691)),
            max_connections: 1000,
            handshake_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(2),
            flood_interval: Duration::from_millis(150),
            flood_threshold: 5,
            max_security_errors: 0,
            room_timeouts: RoomTimeouts::default(),
            sweep_interval: Duration::from_secs(60),
            client_version: PROTOCOL_VERSION.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("SEABATTLE_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("SEABATTLE_MAX_CONNECTIONS", defaults.max_connections),
            max_security_errors: env_or("SEABATTLE_MAX_SECURITY_ERRORS", defaults.max_security_errors),
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Result of writing one line under a deadline.
#[derive(Debug)]
enum LineWrite {
    Written,
    /// Deadline hit before any byte was written.
    Dropped,
    /// Deadline hit after part of the line was written.
    Truncated,
    Failed(std::io::Error),
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8], deadline: Duration) -> LineWrite {
    let mut written = 0;
    let result = timeout(deadline, async {
        while written < line.len() {
            match writer.write(&line[written..]).await {
                Ok(0) => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) => return Err(e),
            }
        }
        writer.flush().await
    })
    .await;

    match result {
        Ok(Ok(())) => LineWrite::Written,
        Ok(Err(e)) => LineWrite::Failed(e),
        Err(_) if written == 0 => LineWrite::Dropped,
        Err(_) => LineWrite::Truncated,
    }
}

/// Connected client bookkeeping.
struct ConnectedClient {
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: Arc<ServerConfig>,
    /// Live rooms.
    rooms: Arc<RoomRegistry>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config: Arc::new(config),
            rooms: Arc::new(RoomRegistry::new()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Sea battle server v{} listening on {}", self.config.version, self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let sweep_rooms = self.rooms.clone();
        let sweep_interval = self.config.sweep_interval;
        let sweep_handle = tokio::spawn(async move {
            Self::run_sweep_loop(sweep_rooms, sweep_interval).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if let Err(e) = self.admit(addr).await {
                                warn!("{}, rejecting {}", e, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();

        Ok(())
    }

    /// Register a client unless the connection limit is reached.
    async fn admit(&self, addr: SocketAddr) -> Result<(), GameServerError> {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.config.max_connections {
            return Err(GameServerError::ConnectionLimitReached);
        }
        clients.insert(addr, ConnectedClient { connected_at: Instant::now() });
        Ok(())
    }

    /// Spawn the reader and writer tasks for one connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let rooms = self.rooms.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let (outbox, outbound_rx) = Outbox::channel(addr);
            let connection = Connection::new(addr, outbox, rooms, config.clone());

            let mut writer_task = tokio::spawn(Self::run_writer(writer, outbound_rx, config.write_timeout, addr));
            let mut writer_done = false;
            let mut lines = BufReader::new(reader).lines();

            loop {
                let deadline = connection.read_timeout().await;

                tokio::select! {
                    read = timeout(deadline, lines.next_line()) => {
                        match read {
                            Ok(Ok(Some(line))) => {
                                if connection.check_flood(Instant::now()).await == Flow::Close {
                                    break;
                                }
                                if connection.handle_line(&line).await == Flow::Close {
                                    break;
                                }
                            }
                            Ok(Ok(None)) => {
                                debug!("{} closed the connection", addr);
                                break;
                            }
                            Ok(Err(e)) => {
                                debug!("Read error from {}: {}", addr, e);
                                break;
                            }
                            Err(_) => {
                                info!("Read deadline exceeded for {}", addr);
                                break;
                            }
                        }
                    }
                    _ = &mut writer_task => {
                        writer_done = true;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            connection.teardown().await;

            if !writer_done && timeout(config.write_timeout, &mut writer_task).await.is_err() {
                writer_task.abort();
            }

            let connected_for = clients
                .write()
                .await
                .remove(&addr)
                .map(|client| client.connected_at.elapsed())
                .unwrap_or_default();
            info!("Connection {} closed after {:?}", addr, connected_for);
        });
    }

    /// Drain the outbound queue onto the socket.
    ///
    /// A frame that times out before any byte went out is dropped. A frame cut
    /// off mid-line would corrupt the line framing, so that closes the writer.
    async fn run_writer<W: AsyncWrite + Unpin>(
        mut writer: W,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        write_timeout: Duration,
        addr: SocketAddr,
    ) {
        while let Some(outbound) = outbound_rx.recv().await {
            let (message, last) = match outbound {
                Outbound::Message(message) => (message, false),
                Outbound::Close => (ServerMessage::Disconnect, true),
            };

            let mut text = match message.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            text.push('\n');

            match write_line(&mut writer, text.as_bytes(), write_timeout).await {
                LineWrite::Written => {}
                LineWrite::Dropped => warn!("Write to {} timed out, dropping {:?}", addr, message.code()),
                LineWrite::Truncated => {
                    warn!("Write to {} timed out mid-frame, closing", addr);
                    break;
                }
                LineWrite::Failed(e) => {
                    debug!("Write error to {}: {}", addr, e);
                    break;
                }
            }

            if last {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }

    /// Periodically destroy rooms past their phase ceiling.
    async fn run_sweep_loop(rooms: Arc<RoomRegistry>, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            let removed = rooms.sweep(Instant::now()).await;
            if removed > 0 {
                info!("Swept {} rooms", removed);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }
}
