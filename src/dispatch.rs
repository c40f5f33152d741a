//! Request dispatcher: one `CliRequest` in, one `CliResponse` out.
//!
//! The dispatcher is stateless between requests. It resolves the operator,
//! opens a fresh transport, drives the session phases under the overall
//! request deadline, and never retries; retry policy belongs to the caller.
//! Session reuse is layered on top by [`crate::session::SessionPool`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use crate::config;
use crate::error::CliError;
use crate::operator::REGISTRY;
use crate::protocol::{CliRequest, CliResponse};
use crate::session::{self, DEFAULT_CMD_TIMEOUT, OPEN_TIMEOUT, SessionDriver};

/// Upper bound for a whole request, derived from the per-command deadline
/// with headroom for the open and navigation phases.
pub fn overall_deadline(request: &CliRequest) -> Duration {
    let per_cmd = request.timeout.unwrap_or(DEFAULT_CMD_TIMEOUT.as_secs());
    Duration::from_secs(per_cmd.saturating_mul(request.commands.len() as u64 + 2))
}

/// Resolves the operator for the request, registers the requested mode on
/// dynamic operators, and opens a driver over a fresh transport.
pub async fn open_session(request: &CliRequest) -> Result<SessionDriver, CliError> {
    let operator = REGISTRY.resolve(&request.device_type)?;
    if let Some(dynamic) = operator.as_dynamic() {
        dynamic.register_mode(&request.mode, &request.log_prefix)?;
    }
    let transport = session::connect(request, operator.as_ref()).await?;
    SessionDriver::open(
        transport,
        operator,
        request.log_prefix.clone(),
        OPEN_TIMEOUT,
    )
    .await
}

/// Runs one request end to end on a dedicated session.
///
/// Deadline expiry drops the session future, which tears the transport down
/// unconditionally: pending writes are abandoned and buffered output is
/// discarded.
pub async fn dispatch(request: &CliRequest) -> CliResponse {
    info!(
        "{} dispatching {} command(s) to {} as {} (mode {})",
        request.log_prefix,
        request.commands.len(),
        request.address,
        request.device_type,
        request.mode,
    );

    let deadline = overall_deadline(request);
    let run = async {
        let mut driver = open_session(request).await?;
        let response = driver.execute(request).await;
        driver.close().await;
        Ok::<CliResponse, CliError>(response)
    };

    let response = match tokio::time::timeout(deadline, run).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            warn!("{} request failed: {err}", request.log_prefix);
            CliResponse::from_error(err.kind(), err.to_string())
        }
        Err(_) => {
            warn!(
                "{} request deadline of {deadline:?} exceeded, session torn down",
                request.log_prefix
            );
            let err = CliError::Cancelled(format!("request deadline of {deadline:?} exceeded"));
            CliResponse::from_error(err.kind(), err.to_string())
        }
    };

    info!(
        "{} request finished, ok={} results={}",
        request.log_prefix,
        response.ok,
        response.results.len()
    );
    persist_outputs(request, &response);
    response
}

/// Side channel: writes captured command output to the configured directory
/// when enabled. Best effort, a failure only logs.
fn persist_outputs(request: &CliRequest, response: &CliResponse) {
    let config = config::get();
    if !config.log_cfg_flag || response.results.is_empty() {
        return;
    }

    let name = sanitize(&format!("{}-{}", request.device_addr(), request.mode));
    let path = Path::new(&config.log_cfg_dir).join(format!("{name}.cfg"));
    let mut body = String::new();
    for result in &response.results {
        body.push_str(&result.output);
        if !result.output.ends_with('\n') {
            body.push('\n');
        }
    }
    if let Err(err) = fs::write(&path, body) {
        warn!(
            "{} failed to persist output to {}: {err}",
            request.log_prefix,
            path.display()
        );
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Auth, ErrorKind};

    #[tokio::test]
    async fn unknown_device_type_yields_no_operator_found() {
        let request = CliRequest {
            device_type: "acme.routeros.7".to_string(),
            address: "192.0.2.9".to_string(),
            port: 22,
            auth: Auth {
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
            mode: "login".to_string(),
            commands: vec!["show version".to_string()],
            timeout: Some(1),
            log_prefix: "[test]".to_string(),
        };
        let response = dispatch(&request).await;
        assert!(!response.ok);
        assert!(response.results.is_empty());
        assert_eq!(
            response.err.expect("session error").kind,
            ErrorKind::NoOperatorFound
        );
    }

    #[test]
    fn deadline_scales_with_batch_length() {
        let mut request = CliRequest {
            device_type: "cisco.ios.c2960".to_string(),
            address: "192.0.2.1".to_string(),
            port: 22,
            auth: Auth {
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
            mode: "login_enable".to_string(),
            commands: vec!["a".to_string(), "b".to_string()],
            timeout: Some(10),
            log_prefix: String::new(),
        };
        assert_eq!(overall_deadline(&request), Duration::from_secs(40));
        request.timeout = None;
        assert_eq!(overall_deadline(&request), Duration::from_secs(240));
    }

    #[test]
    fn side_channel_names_are_filesystem_safe() {
        assert_eq!(
            sanitize("admin@192.0.2.1:22-login_enable"),
            "admin_192.0.2.1_22-login_enable"
        );
    }
}
