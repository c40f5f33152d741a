//! Error types for operator resolution, transport setup, and session driving.
//!
//! Per-command failures (device-reported errors, per-command timeouts) are
//! carried inside [`crate::protocol::CmdResult`]; the variants here are the
//! session-level failures that abort a request.

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

use crate::protocol::ErrorKind;

/// Errors raised while resolving an operator or driving a device session.
#[derive(Error, Debug)]
pub enum CliError {
    /// No registered operator pattern matched the request's device type.
    #[error("no operator registered for device type {0}")]
    NoOperatorFound(String),

    /// SSH handshake, authentication, or shell channel setup failed.
    #[error("transport open failed: {0}")]
    TransportOpen(String),

    /// The opened shell never produced a recognizable start-mode prompt.
    #[error("no start prompt recognized: {0}")]
    InitialPromptTimeout(String),

    /// The operator's transition table has no entry for the requested pair.
    #[error("no transition from {src} to {dst}")]
    NoTransition { src: String, dst: String },

    /// Transition commands were sent but the target prompt was not observed.
    #[error("transition to {0} lost")]
    TransitionLost(String),

    /// A write to the device stream did not complete within the deadline.
    #[error("write timeout")]
    WriteTimeout,

    /// No prompt arrived within the per-command deadline.
    #[error("read timeout, captured so far: {0:?}")]
    ReadTimeout(String),

    /// The device stream closed while a read or write was pending.
    #[error("device channel disconnected")]
    ChannelClosed,

    /// The request deadline expired or the request was cancelled externally.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A vendor operator definition is internally inconsistent.
    #[error("invalid operator definition: {0}")]
    InvalidOperator(String),

    /// An error surfaced by the async-ssh2-tokio layer.
    #[error("ssh client error: {0}")]
    Ssh(#[from] async_ssh2_tokio::Error),

    /// An error surfaced by the russh layer.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// The in-process channel to the I/O task rejected a send.
    #[error("failed to hand data to the I/O task: {0}")]
    SendData(#[from] SendError<String>),

    /// Anything that does not fit the taxonomy above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Maps the error onto the wire-level taxonomy tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::NoOperatorFound(_) => ErrorKind::NoOperatorFound,
            CliError::TransportOpen(_) | CliError::Ssh(_) | CliError::Russh(_) => {
                ErrorKind::TransportOpen
            }
            CliError::InitialPromptTimeout(_) => ErrorKind::InitialPromptTimeout,
            CliError::NoTransition { .. } => ErrorKind::NoTransition,
            CliError::TransitionLost(_) => ErrorKind::TransitionLost,
            CliError::WriteTimeout => ErrorKind::WriteTimeout,
            CliError::ReadTimeout(_) => ErrorKind::ReadTimeout,
            CliError::Cancelled(_) => ErrorKind::Cancelled,
            CliError::ChannelClosed
            | CliError::SendData(_)
            | CliError::InvalidOperator(_)
            | CliError::Internal(_) => ErrorKind::Internal,
        }
    }
}
