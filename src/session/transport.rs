use std::borrow::Cow;

use async_ssh2_tokio::client::AuthMethod;
use async_ssh2_tokio::{Config, ServerCheckMethod};
use russh::{ChannelMsg, Preferred};
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::config;

use super::*;

impl Transport {
    /// Binds a transport over raw channels. Used by in-memory device
    /// doubles; there is no connection handle to close.
    pub fn from_channels(tx: Sender<String>, rx: Receiver<String>) -> Self {
        Self {
            tx,
            rx,
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        match &self.client {
            Some(client) => !client.is_closed(),
            None => !self.tx.is_closed(),
        }
    }

    /// Next chunk from the device, `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Discards buffered chunks left over from a previous exchange.
    pub fn try_drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Hands bytes to the I/O task, bounded by the write deadline.
    pub async fn send_timeout(&self, data: String, limit: Duration) -> Result<(), CliError> {
        match self.tx.send_timeout(data, limit).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(CliError::WriteTimeout),
            Err(SendTimeoutError::Closed(_)) => Err(CliError::ChannelClosed),
        }
    }

    /// Releases the stream. The SSH client closes on drop.
    pub async fn close(&mut self) {
        self.rx.close();
        if let Some(client) = self.client.take() {
            drop(client);
        }
    }
}

/// Opens an SSH connection to the request's device, starts an interactive
/// shell on it, and spawns the I/O task bridging the shell channel to the
/// driver. The operator decides whether a PTY is requested first.
pub async fn connect(
    request: &CliRequest,
    operator: &dyn Operator,
) -> Result<Transport, CliError> {
    let device_addr = request.device_addr();

    let ssh_config = Config {
        preferred: Preferred {
            kex: Cow::Borrowed(config::KEX_ORDER),
            key: Cow::Borrowed(config::KEY_TYPES),
            cipher: Cow::Borrowed(config::CIPHERS),
            mac: Cow::Borrowed(config::MAC_ALGORITHMS),
            compression: Cow::Borrowed(config::COMPRESSION_ALGORITHMS),
        },
        inactivity_timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    };

    // Network devices rarely keep a stable host key discipline, so server
    // verification is off. Credentials come from the request, never disk.
    let client = Client::connect_with_config(
        (request.address.clone(), request.port),
        &request.auth.username,
        AuthMethod::with_password(&request.auth.password),
        ServerCheckMethod::NoCheck,
        ssh_config,
    )
    .await?;
    debug!("{} {} TCP connection successful", request.log_prefix, device_addr);

    let mut channel = client.get_channel().await?;
    if operator.request_pty() {
        channel.request_pty(false, "vt100", 80, 40, 0, 0, &[]).await?;
    }
    channel.request_shell(false).await?;
    debug!("{} {} shell request successful", request.log_prefix, device_addr);

    let (to_device_tx, mut to_device_rx) = mpsc::channel::<String>(256);
    let (from_device_tx, from_device_rx) = mpsc::channel::<String>(256);

    let io_addr = device_addr.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(data) = to_device_rx.recv() => {
                    if let Err(err) = channel.data(data.as_bytes()).await {
                        debug!("{io_addr} failed to write to shell: {err:?}");
                        break;
                    }
                },
                Some(msg) = channel.wait() => {
                    match msg {
                        ChannelMsg::Data { ref data } => {
                            let text = String::from_utf8_lossy(data).to_string();
                            if from_device_tx.send(text).await.is_err() {
                                debug!("{io_addr} output receiver dropped, stopping I/O task");
                                break;
                            }
                        }
                        // Stderr is folded into the same stream.
                        ChannelMsg::ExtendedData { ref data, .. } => {
                            let text = String::from_utf8_lossy(data).to_string();
                            if from_device_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        ChannelMsg::ExitStatus { exit_status } => {
                            debug!("{io_addr} shell exited with status {exit_status}");
                            let _ = channel.eof().await;
                            break;
                        }
                        ChannelMsg::Eof => {
                            debug!("{io_addr} shell sent EOF");
                            break;
                        }
                        _ => {}
                    }
                },
                else => break,
            }
        }
        debug!("{io_addr} I/O task ended");
    });

    Ok(Transport {
        tx: to_device_tx,
        rx: from_device_rx,
        client: Some(client),
    })
}
