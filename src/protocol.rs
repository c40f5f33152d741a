//! Wire types exchanged with the ingress.
//!
//! A [`CliRequest`] names one device, a target mode, and an ordered command
//! batch; a [`CliResponse`] carries one [`CmdResult`] per input command plus
//! an optional session-level error. The concrete RPC framing is up to the
//! carrier; these types only fix the payload shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default SSH port when a request leaves `port` unset.
fn default_port() -> u16 {
    22
}

/// Credentials used for the device login.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

/// A logical request to run a command batch on one device.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CliRequest {
    /// Device type selector, dot separated, matched case-insensitively
    /// against operator registration patterns.
    /// Examples: `cisco.ios.c2960`, `fortinet.FortiGate-VM64-KVM.v5.6.0`.
    pub device_type: String,

    /// Device address (IP or hostname).
    pub address: String,

    /// SSH port, defaults to 22.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login credentials.
    pub auth: Auth,

    /// Target mode the command batch runs in.
    ///
    /// Mode names are vendor specific: `login_enable` or
    /// `configure_terminal` for Cisco IOS, a VDOM name such as `root` or
    /// `global` for FortiGate.
    pub mode: String,

    /// Commands executed in order, one result each.
    pub commands: Vec<String>,

    /// Per-command deadline in seconds. Defaults to 60. The overall request
    /// deadline is derived from it and the batch length.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Opaque correlator echoed into every log line for this request.
    #[serde(default)]
    pub log_prefix: String,
}

impl CliRequest {
    /// `user@addr:port`, the session identity used for logs and pooling.
    pub fn device_addr(&self) -> String {
        format!("{}@{}:{}", self.auth.username, self.address, self.port)
    }
}

/// Completion status of a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CmdStatus {
    /// The command ran and its output was delimited by a prompt.
    Done,
    /// No prompt arrived within the per-command deadline.
    ReadTimeout,
    /// The command bytes could not be written within the deadline.
    WriteTimeout,
    /// A preceding failure tore the session down before this command ran.
    NotAttempted,
}

/// Result of one input command.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CmdResult {
    /// The command as submitted.
    pub command: String,

    /// Captured output between the command echo and the next prompt, with
    /// exclude lines filtered out.
    pub output: String,

    /// The first output line matching an operator error pattern, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_error: Option<String>,

    /// True when the output was cut short by a timeout.
    #[serde(default)]
    pub truncated: bool,

    pub status: CmdStatus,
}

impl CmdResult {
    /// A placeholder for a command the session never reached.
    pub fn not_attempted(command: &str) -> Self {
        Self {
            command: command.to_string(),
            output: String::new(),
            matched_error: None,
            truncated: false,
            status: CmdStatus::NotAttempted,
        }
    }
}

/// Session-level failure taxonomy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoOperatorFound,
    TransportOpen,
    InitialPromptTimeout,
    NoTransition,
    TransitionLost,
    WriteTimeout,
    ReadTimeout,
    Cancelled,
    Internal,
}

/// Session-level error surfaced in a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reply to a [`CliRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CliResponse {
    /// True iff every command completed without a device error and the
    /// session finished cleanly.
    pub ok: bool,

    /// One entry per input command, in submission order.
    pub results: Vec<CmdResult>,

    /// Set when a transport or protocol failure ended the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<RpcError>,
}

impl CliResponse {
    /// Builds a response from per-command results and an optional fatal
    /// session error. `ok` is derived, never set directly.
    pub fn from_results(results: Vec<CmdResult>, err: Option<RpcError>) -> Self {
        let ok = err.is_none()
            && results
                .iter()
                .all(|r| r.status == CmdStatus::Done && r.matched_error.is_none());
        Self { ok, results, err }
    }

    /// A response for a request that failed before any command ran.
    pub fn from_error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            results: Vec::new(),
            err: Some(RpcError {
                kind,
                message: message.into(),
            }),
        }
    }
}
