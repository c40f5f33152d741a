//! End-to-end session driver scenarios over an in-memory transport.
//!
//! A scripted device double sits on the far side of the channel pair: it
//! echoes every received command, appends canned output, and finishes with
//! the prompt of whatever mode the exchange left it in. No SSH involved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use netd::operator::{DynamicOperator, Operator};
use netd::protocol::{Auth, CliRequest, CmdStatus, ErrorKind};
use netd::session::{SessionDriver, Transport};
use netd::vendors::cisco_ios::IosOperator;
use netd::vendors::fortigate::FortigateOperator;

const OPEN_LIMIT: Duration = Duration::from_secs(5);

fn request(device_type: &str, mode: &str, commands: &[&str]) -> CliRequest {
    CliRequest {
        device_type: device_type.to_string(),
        address: "192.0.2.1".to_string(),
        port: 22,
        auth: Auth {
            username: "admin".to_string(),
            password: "secret".to_string(),
        },
        mode: mode.to_string(),
        commands: commands.iter().map(|c| c.to_string()).collect(),
        timeout: Some(1),
        log_prefix: "[test]".to_string(),
    }
}

fn cisco_request(mode: &str, commands: &[&str]) -> CliRequest {
    request("cisco.ios.c2960", mode, commands)
}

/// A Cisco-flavored device double. `slow_command` delays the reply to one
/// named command, for the timeout scenarios.
fn cisco_device(slow_command: Option<(&'static str, Duration)>) -> Transport {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(256);
    let (out_tx, out_rx) = mpsc::channel::<String>(256);

    tokio::spawn(async move {
        if out_tx
            .send("\r\nUser Access Verification\r\n\r\nSwitch#".to_string())
            .await
            .is_err()
        {
            return;
        }
        let mut hostname = "Switch".to_string();
        let mut configuring = false;
        while let Some(line) = cmd_rx.recv().await {
            let command = line.trim_end_matches('\n').to_string();
            if let Some((slow, delay)) = slow_command
                && command == slow
            {
                tokio::time::sleep(delay).await;
            }
            let mut reply = format!("{command}\r\n");
            match command.as_str() {
                "show version" => {
                    reply.push_str("Cisco IOS Software, C2960 Software, Version 15.0(2)SE\r\n");
                }
                "show clock" => reply.push_str("12:00:00.000 UTC Mon Mar 1 2021\r\n"),
                "show tech-support" => reply.push_str("------------------ show version ------------------\r\n"),
                "config terminal" => configuring = true,
                "exit" => configuring = false,
                "bogus" => reply.push_str("% Invalid input detected at '^' marker.\r\n"),
                other => {
                    if configuring
                        && let Some(name) = other.strip_prefix("hostname ")
                    {
                        hostname = name.to_string();
                    }
                }
            }
            if configuring {
                reply.push_str(&format!("{hostname}(config)#"));
            } else {
                reply.push_str(&format!("{hostname}#"));
            }
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    Transport::from_channels(cmd_tx, out_rx)
}

/// A FortiGate-flavored double tracking its VDOM/global context.
fn fortigate_device() -> Transport {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(256);
    let (out_tx, out_rx) = mpsc::channel::<String>(256);

    tokio::spawn(async move {
        if out_tx.send("FGT-VM64 # ".to_string()).await.is_err() {
            return;
        }
        let mut context: Option<String> = None;
        while let Some(line) = cmd_rx.recv().await {
            let command = line.trim_end_matches('\n').to_string();
            let mut reply = format!("{command}\r\n");
            let trimmed = command.trim_start();
            if trimmed == "config vdom" {
                context = Some("vdom".to_string());
            } else if trimmed == "config global" {
                context = Some("global".to_string());
            } else if let Some(name) = trimmed.strip_prefix("edit ") {
                context = Some(name.to_string());
            } else if trimmed == "end" {
                context = None;
            } else if trimmed == "get system status" {
                reply.push_str("Version: FortiGate-VM64-KVM v5.6.0,build1449,171218 (GA)\r\n");
            }
            match &context {
                Some(ctx) => reply.push_str(&format!("FGT-VM64 ({ctx}) # ")),
                None => reply.push_str("FGT-VM64 # "),
            }
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    Transport::from_channels(cmd_tx, out_rx)
}

async fn open_cisco(transport: Transport) -> SessionDriver {
    let operator: Arc<dyn Operator> = Arc::new(IosOperator::new());
    SessionDriver::open(transport, operator, "[test]".to_string(), OPEN_LIMIT)
        .await
        .expect("open session")
}

#[tokio::test]
async fn simple_show_captures_output_between_echo_and_prompt() {
    let mut driver = open_cisco(cisco_device(None)).await;
    assert_eq!(driver.current_mode(), "login_enable");

    let response = driver
        .execute(&cisco_request("login_enable", &["show version"]))
        .await;
    driver.close().await;

    assert!(response.ok);
    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.status, CmdStatus::Done);
    assert!(result.matched_error.is_none());
    assert!(result.output.contains("Cisco IOS Software"));
    assert!(!result.output.contains("show version\r"));
    assert!(!result.output.contains("Switch#"));
}

#[tokio::test]
async fn config_mode_is_entered_and_prompt_follows_hostname_change() {
    let mut driver = open_cisco(cisco_device(None)).await;

    let response = driver
        .execute(&cisco_request("configure_terminal", &["hostname R1"]))
        .await;

    assert!(response.ok);
    assert_eq!(driver.current_mode(), "configure_terminal");
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].status, CmdStatus::Done);

    // Close steers back to the start mode through the `exit` transition.
    driver.close().await;
}

#[tokio::test]
async fn rejected_command_is_flagged_but_batch_completes() {
    let mut driver = open_cisco(cisco_device(None)).await;

    let response = driver
        .execute(&cisco_request("login_enable", &["bogus", "show version"]))
        .await;
    driver.close().await;

    assert!(!response.ok);
    assert_eq!(response.results.len(), 2);
    let flagged = &response.results[0];
    assert_eq!(flagged.status, CmdStatus::Done);
    assert!(
        flagged
            .matched_error
            .as_deref()
            .is_some_and(|line| line.starts_with("% Invalid input"))
    );
    // The device error must not suppress the rest of the batch.
    assert_eq!(response.results[1].status, CmdStatus::Done);
    assert!(response.results[1].matched_error.is_none());
}

#[tokio::test]
async fn unreachable_mode_fails_navigation_with_no_results() {
    let mut driver = open_cisco(cisco_device(None)).await;

    let response = driver
        .execute(&cisco_request("rommon", &["confreg 0x2142"]))
        .await;
    driver.close().await;

    assert!(!response.ok);
    assert!(response.results.is_empty());
    assert_eq!(
        response.err.expect("session error").kind,
        ErrorKind::NoTransition
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_command_resyncs_and_batch_continues() {
    let transport = cisco_device(Some(("show tech-support", Duration::from_millis(1500))));
    let mut driver = open_cisco(transport).await;

    let response = driver
        .execute(&cisco_request(
            "login_enable",
            &["show tech-support", "show clock"],
        ))
        .await;
    driver.close().await;

    assert!(!response.ok);
    assert!(response.err.is_none(), "session must survive the resync");
    assert_eq!(response.results.len(), 2);

    let timed_out = &response.results[0];
    assert_eq!(timed_out.status, CmdStatus::ReadTimeout);
    assert!(timed_out.truncated);

    let second = &response.results[1];
    assert_eq!(second.status, CmdStatus::Done);
    assert!(second.output.contains("12:00:00"));
}

#[tokio::test(start_paused = true)]
async fn lost_transition_is_fatal_for_the_request() {
    // A device that ignores `config terminal` and stays at the enable prompt.
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(256);
    let (out_tx, out_rx) = mpsc::channel::<String>(256);
    tokio::spawn(async move {
        let _ = out_tx.send("Switch#".to_string()).await;
        while let Some(line) = cmd_rx.recv().await {
            let command = line.trim_end_matches('\n');
            if out_tx.send(format!("{command}\r\nSwitch#")).await.is_err() {
                break;
            }
        }
    });

    let mut driver = open_cisco(Transport::from_channels(cmd_tx, out_rx)).await;
    let response = driver
        .execute(&cisco_request("configure_terminal", &["hostname R1"]))
        .await;
    driver.close().await;

    assert!(!response.ok);
    assert!(response.results.is_empty());
    assert_eq!(
        response.err.expect("session error").kind,
        ErrorKind::TransitionLost
    );
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_the_open_phase() {
    let (cmd_tx, _cmd_rx) = mpsc::channel::<String>(256);
    let (out_tx, out_rx) = mpsc::channel::<String>(256);
    // Keep the device side alive without ever producing a prompt.
    tokio::spawn(async move {
        let _keep = out_tx;
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let operator: Arc<dyn Operator> = Arc::new(IosOperator::new());
    let err = SessionDriver::open(
        Transport::from_channels(cmd_tx, out_rx),
        operator,
        "[test]".to_string(),
        Duration::from_secs(1),
    )
    .await
    .expect_err("open must time out");
    assert!(matches!(
        err,
        netd::error::CliError::InitialPromptTimeout(_)
    ));
}

#[tokio::test]
async fn fortigate_registers_vdom_and_navigates_into_it() {
    let fortigate = Arc::new(FortigateOperator::new());
    // The dispatcher registers the requested mode before opening.
    fortigate.register_mode("root", "[test]").expect("register vdom");

    let operator: Arc<dyn Operator> = fortigate;
    let mut driver = SessionDriver::open(
        fortigate_device(),
        operator,
        "[test]".to_string(),
        OPEN_LIMIT,
    )
    .await
    .expect("open session");
    assert_eq!(driver.current_mode(), "login");

    let response = driver
        .execute(&request(
            "fortinet.FortiGate-VM64-KVM.v5.6.0",
            "root",
            &["get system status"],
        ))
        .await;

    assert!(response.ok);
    assert_eq!(driver.current_mode(), "root");
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].output.contains("FortiGate-VM64-KVM"));

    // `end` brings the session home to the root shell.
    driver.close().await;
}
