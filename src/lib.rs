//! # netd - network device command execution daemon
//!
//! `netd` runs command-line operations on heterogeneous network devices
//! (routers, firewalls, switches) on behalf of remote clients. A client
//! submits a device address, credentials, a target CLI mode, and a command
//! batch; the daemon drives an interactive shell session over SSH, navigates
//! the device's modal prompt hierarchy, transmits the commands, captures
//! their output, detects device-reported errors, and returns a structured
//! result.
//!
//! The interesting part is the interactive driver: a duplex byte stream with
//! no framing and no end-of-output marker, delimited only by vendor prompt
//! grammars. Each vendor family declares its prompts, mode transition verbs,
//! and error signatures as an [`operator::Operator`]; the
//! [`session::SessionDriver`] turns those declarations into deterministic
//! per-command results.
//!
//! ## Request flow
//!
//! ingress -> [`dispatch::dispatch`] -> operator lookup -> SSH transport ->
//! session open (start prompt) -> mode navigation -> command loop -> response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use netd::dispatch;
//! use netd::protocol::{Auth, CliRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let request = CliRequest {
//!         device_type: "cisco.ios.c2960".to_string(),
//!         address: "192.0.2.1".to_string(),
//!         port: 22,
//!         auth: Auth {
//!             username: "admin".to_string(),
//!             password: "secret".to_string(),
//!         },
//!         mode: "login_enable".to_string(),
//!         commands: vec!["show version".to_string()],
//!         timeout: Some(30),
//!         log_prefix: "[req-1]".to_string(),
//!     };
//!     let response = dispatch::dispatch(&request).await;
//!     for result in &response.results {
//!         println!("{} -> {}", result.command, result.output);
//!     }
//! }
//! ```
//!
//! ## Main components
//!
//! - [`operator`] - vendor contract and the device-type registry
//! - [`vendors`] - shipped vendor operators (Cisco IOS, FortiGate)
//! - [`matcher`] - prompt/echo/error matching over the raw stream
//! - [`session`] - transport binding, driver phases, session pool
//! - [`dispatch`] - request orchestration and the output side channel
//! - [`ingress`] - JSON-lines TCP carrier and the status listener

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingress;
pub mod matcher;
pub mod operator;
pub mod protocol;
pub mod session;
pub mod vendors;
