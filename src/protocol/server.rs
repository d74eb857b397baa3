//! Protocol server: framed JSON over TCP
//!
//! Two listeners: one for station links, one for trusted operator/API
//! callers. Each accepted socket gets its own task that reads one
//! newline-framed JSON request at a time, routes it, and writes exactly
//! one reply. A writer task owns the write half and drains an mpsc
//! channel, so synchronous replies and asynchronously pushed commands
//! never interleave mid-frame.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::protocol::handler::{self, CoordinatorContext};
use crate::protocol::message::{Reply, Request};
use crate::support::shutdown::ShutdownSignal;

/// Frames larger than this are a protocol violation, not a message.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Which listener a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Station,
    Operator,
}

/// Listener configuration for the protocol server.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub station_addr: String,
    pub operator_addr: String,
    /// A peer silent for longer than this gets disconnected.
    pub read_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            station_addr: "0.0.0.0:9090".to_string(),
            operator_addr: "0.0.0.0:9091".to_string(),
            read_timeout: Duration::from_secs(120),
        }
    }
}

/// The coordinator's TCP front end.
pub struct ProtocolServer {
    config: ProtocolConfig,
    ctx: CoordinatorContext,
    shutdown: Option<ShutdownSignal>,
}

impl ProtocolServer {
    pub fn new(config: ProtocolConfig, ctx: CoordinatorContext) -> Self {
        Self {
            config,
            ctx,
            shutdown: None,
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Bind both listeners. Separated from [`BoundProtocolServer::run`]
    /// so callers (and tests binding port 0) can learn the local
    /// addresses before serving.
    pub async fn bind(self) -> std::io::Result<BoundProtocolServer> {
        let station_listener = TcpListener::bind(&self.config.station_addr).await?;
        let operator_listener = TcpListener::bind(&self.config.operator_addr).await?;

        let station_addr = station_listener.local_addr()?;
        let operator_addr = operator_listener.local_addr()?;
        info!("Station listener on {}", station_addr);
        info!("Operator listener on {}", operator_addr);

        Ok(BoundProtocolServer {
            station_listener,
            operator_listener,
            station_addr,
            operator_addr,
            read_timeout: self.config.read_timeout,
            ctx: self.ctx,
            shutdown: self.shutdown,
        })
    }
}

/// A protocol server with both sockets bound.
pub struct BoundProtocolServer {
    station_listener: TcpListener,
    operator_listener: TcpListener,
    pub station_addr: SocketAddr,
    pub operator_addr: SocketAddr,
    read_timeout: Duration,
    ctx: CoordinatorContext,
    shutdown: Option<ShutdownSignal>,
}

impl BoundProtocolServer {
    /// Accept connections until shutdown (or forever without a signal).
    pub async fn run(self) -> std::io::Result<()> {
        let shutdown = self.shutdown.clone().unwrap_or_default();

        loop {
            tokio::select! {
                accepted = self.station_listener.accept() => {
                    self.spawn_connection(accepted, Origin::Station);
                }
                accepted = self.operator_listener.accept() => {
                    self.spawn_connection(accepted, Origin::Operator);
                }
                _ = shutdown.wait(), if self.shutdown.is_some() => {
                    info!("Protocol server received shutdown signal");
                    for station_id in self.ctx.registry.connected_ids() {
                        self.ctx.registry.unregister(station_id);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(
        &self,
        accepted: std::io::Result<(TcpStream, SocketAddr)>,
        origin: Origin,
    ) {
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                return;
            }
        };

        let ctx = self.ctx.clone();
        let read_timeout = self.read_timeout;
        tokio::spawn(async move {
            handle_connection(stream, addr, origin, ctx, read_timeout).await;
        });
    }
}

/// Serve one socket until the peer closes, errs, or idles out.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    origin: Origin,
    ctx: CoordinatorContext,
    read_timeout: Duration,
) {
    debug!(%addr, ?origin, "New connection");

    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_loop(write_half, rx, addr));

    // the station id this socket registered, for cleanup on exit
    let mut registered_station: Option<i64> = None;

    // the limit applies while reading: read_until returns as soon as
    // the allowance runs out, so a peer streaming bytes without a
    // delimiter cannot grow the buffer past the cap
    let frame_allowance = MAX_FRAME_BYTES as u64 + 1;
    let mut reader = BufReader::new(read_half).take(frame_allowance);
    let mut frame_buf = Vec::with_capacity(1024);
    loop {
        frame_buf.clear();
        reader.set_limit(frame_allowance);

        let read = match timeout(read_timeout, reader.read_until(b'\n', &mut frame_buf)).await {
            Err(_) => {
                warn!(%addr, "Read timeout, closing connection");
                break;
            }
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "Transport error, closing connection");
                break;
            }
            Ok(Ok(0)) => {
                debug!(%addr, "Peer closed connection");
                break;
            }
            Ok(Ok(read)) => read,
        };

        if frame_buf.last() != Some(&b'\n') {
            // the allowance ran out before a delimiter, or the peer
            // vanished mid-frame
            if read > MAX_FRAME_BYTES {
                warn!(%addr, len = read, "Oversized frame, closing connection");
            } else {
                debug!(%addr, "Connection closed mid-frame");
            }
            break;
        }

        let frame = trim_frame(&frame_buf);
        if frame.is_empty() {
            continue;
        }

        let reply = match serde_json::from_slice::<Request>(frame) {
            Err(e) => Reply::error(format!("invalid request: {}", e)),
            Ok(req) => {
                debug!(%addr, action = req.action(), "Request");
                match origin {
                    Origin::Station => {
                        let station_id = registration_intent(&req);
                        let reply = handler::handle_station(req, &ctx, &tx).await;
                        if reply.is_success() {
                            if let Some(id) = station_id {
                                registered_station = Some(id);
                            }
                        }
                        reply
                    }
                    Origin::Operator => handler::handle_operator(req, &ctx).await,
                }
            }
        };

        let frame = match serde_json::to_string(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                error!(%addr, error = %e, "Failed to encode reply");
                break;
            }
        };
        if tx.send(frame).is_err() {
            break;
        }
    }

    // disconnect of either socket takes both channel entries with it,
    // unless a reconnect has already superseded this socket
    if let Some(station_id) = registered_station {
        ctx.registry.unregister_matching(station_id, &tx);
        info!(station_id, %addr, "Station connection closed");
    }

    drop(tx);
    let _ = writer.await;
}

/// Which station id a request would register, if it succeeds.
fn registration_intent(req: &Request) -> Option<i64> {
    match req {
        Request::Init { station_id } | Request::RegisterCommand { station_id } => Some(*station_id),
        _ => None,
    }
}

/// Strip the delimiter and surrounding whitespace from a raw frame.
fn trim_frame(buf: &[u8]) -> &[u8] {
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    let end = buf
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &buf[start..end]
}

/// Drain queued frames to the socket, one per line.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    addr: SocketAddr,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_half.write_all(frame.as_bytes()).await {
            debug!(%addr, error = %e, "Write error");
            break;
        }
        if let Err(e) = write_half.write_all(b"\n").await {
            debug!(%addr, error = %e, "Write error");
            break;
        }
    }
}
