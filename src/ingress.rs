//! Request ingress and the management status listener.
//!
//! The ingress is a deliberately thin carrier: newline-delimited JSON over
//! TCP, one [`CliRequest`] per line in, one [`CliResponse`] per line out.
//! The dispatcher accepts any carrier of these payloads; richer RPC framing
//! can front this daemon without touching the core.

use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config;
use crate::dispatch;
use crate::protocol::{CliRequest, CliResponse, ErrorKind};
use crate::session::POOL;

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

/// Binds the ingress listener and serves requests until the process exits.
pub async fn serve(addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("ingress listening on {addr}");
    serve_on(listener).await
}

/// Accept loop over an already-bound listener. One task per connection;
/// requests on one connection are answered in order, connections proceed
/// independently.
pub async fn serve_on(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(handle_connection(stream, peer));
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) {
    debug!("ingress connection from {peer}");
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<CliRequest>(&line) {
            Ok(request) => route(request).await,
            Err(err) => {
                warn!("malformed request from {peer}: {err}");
                CliResponse::from_error(ErrorKind::Internal, format!("malformed request: {err}"))
            }
        };
        let mut payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to serialize response for {peer}: {err}");
                break;
            }
        };
        payload.push('\n');
        if write_half.write_all(payload.as_bytes()).await.is_err() {
            break;
        }
    }
    debug!("ingress connection from {peer} closed");
}

async fn route(request: CliRequest) -> CliResponse {
    if config::get().pool_sessions {
        POOL.execute(request).await
    } else {
        dispatch::dispatch(&request).await
    }
}

/// Management listener: answers every connection with one JSON status line
/// and closes it.
pub async fn serve_status(addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("management status listening on {addr}");
    serve_status_on(listener).await
}

/// Accept loop for the status listener over an already-bound socket.
pub async fn serve_status_on(listener: TcpListener) -> std::io::Result<()> {
    // Pin the start instant before the first probe arrives.
    let _ = *STARTED;
    loop {
        let (mut stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let status = serde_json::json!({
                "service": "netd",
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_secs": STARTED.elapsed().as_secs(),
            });
            let mut payload = status.to_string();
            payload.push('\n');
            let _ = stream.write_all(payload.as_bytes()).await;
        });
    }
}
