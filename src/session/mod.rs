//! Session layer: transport binding, the interactive driver, and pooling.
//!
//! One session couples one duplex byte stream to one vendor operator for the
//! life of one request. Exactly one command is in flight per session; the
//! background I/O task hands raw chunks to the driver over an mpsc channel
//! and the driver interleaves writes and reads strictly.
//!
//! # Main components
//!
//! - [`Transport`] - duplex stream plus the close handle that owns it
//! - [`SessionDriver`] - open / navigate / command loop / close phases
//! - [`SessionPool`] - optional keep-alive reuse of opened sessions

use std::sync::Arc;
use std::time::Duration;

use async_ssh2_tokio::client::Client;
use log::{debug, trace};
use moka::future::Cache;
use once_cell::sync::Lazy;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{RwLock, oneshot};

use crate::error::CliError;
use crate::operator::Operator;
use crate::protocol::{CliRequest, CliResponse};

/// Per-command deadline when a request does not set one.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for the open phase (transport ready to first recognized prompt).
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for the best-effort homeward transition during close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A duplex byte stream to one device.
///
/// Reads and writes go through mpsc channels serviced by a background I/O
/// task; the optional client handle keeps the SSH connection alive and
/// closes it on drop. In-memory transports (tests, replay) have no handle.
pub struct Transport {
    tx: Sender<String>,
    rx: Receiver<String>,
    client: Option<Client>,
}

/// Drives one interactive session through its lifecycle phases.
///
/// `current_mode` is only ever set from an observed prompt match, so it is
/// always a member of the operator's prompt table once `open` returns.
pub struct SessionDriver {
    transport: Transport,
    operator: Arc<dyn Operator>,
    current_mode: String,
    /// Concrete start mode resolved at open; close steers back here.
    home_mode: String,
    /// Last matched prompt text.
    prompt: String,
    log_prefix: String,
}

/// Keep-alive session pool keyed by `user@addr:port`.
///
/// Sessions idle for five minutes are evicted; eviction drops the transport,
/// which closes the SSH connection.
pub struct SessionPool {
    cache: Cache<String, (mpsc::Sender<PoolJob>, Arc<RwLock<PooledSession>>)>,
}

/// One queued request against a pooled session.
pub struct PoolJob {
    pub request: CliRequest,
    pub responder: oneshot::Sender<CliResponse>,
}

pub(crate) struct PooledSession {
    driver: SessionDriver,
    /// Credential digest gating connection reuse.
    fingerprint: [u8; 32],
}

/// Global pool used by the ingress when session reuse is enabled.
pub static POOL: Lazy<SessionPool> = Lazy::new(SessionPool::new);

mod driver;
mod pool;
mod transport;

pub use transport::connect;
