//! Vendor operator contract and the device-type registry.
//!
//! An operator declares everything the session driver needs to speak one
//! vendor's modal CLI: prompt regexes per mode, the transition table between
//! modes, error signatures, the line break, and transport preferences. Most
//! operators are immutable after construction; vendors with an unbounded
//! mode set (FortiGate VDOMs) additionally implement [`DynamicOperator`] and
//! grow their tables at request time under a lock.

use std::sync::Arc;

use log::info;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::error::CliError;
use crate::matcher::ModePrompts;
use crate::vendors;

/// Per-vendor CLI declaration consumed by the session driver.
pub trait Operator: Send + Sync {
    /// Registered mode names in candidate order. Prompt disambiguation and
    /// tie-breaking follow this order.
    fn modes(&self) -> Vec<String>;

    /// Snapshot of a mode's ordered prompt regexes, `None` for unknown
    /// modes. Dynamic operators take their table lock here.
    fn prompts(&self, mode: &str) -> Option<Vec<Regex>>;

    /// Ordered command batches moving the device from `src` to `dst`.
    /// `src == dst` yields an empty sequence; unknown pairs yield `None`.
    /// Callers treat a missing entry and an empty sequence identically.
    fn transition(&self, src: &str, dst: &str) -> Option<Vec<String>>;

    /// Compiled error signatures, one match flags the command as failed.
    fn error_patterns(&self) -> &RegexSet;

    /// Lines to filter from captured output. Optional capability.
    fn excludes(&self) -> Option<&[Regex]> {
        None
    }

    /// Byte sequence terminating each transmitted command.
    fn line_break(&self) -> &str;

    /// Decoder name for device output; empty means pass-through.
    fn encoding(&self) -> &str {
        ""
    }

    /// The mode expected right after login. May be a disjunction, in which
    /// case [`Operator::start_modes`] lists the concrete members.
    fn start_mode(&self) -> &str;

    /// Concrete candidate modes for the login prompt, in resolution order.
    fn start_modes(&self) -> Vec<String> {
        vec![self.start_mode().to_string()]
    }

    /// Loose prompt regex delimiting embedded transition steps, for vendors
    /// whose transition macros pass through unregistered contexts.
    fn intermediate_prompt(&self) -> Option<Regex> {
        None
    }

    /// Whether the shell channel should request a PTY. Off by default; some
    /// firmware garbles prompt echo under a PTY.
    fn request_pty(&self) -> bool {
        false
    }

    /// Narrows to the dynamic-registration capability when implemented.
    fn as_dynamic(&self) -> Option<&dyn DynamicOperator> {
        None
    }
}

/// Capability of operators whose mode set is discovered per request.
pub trait DynamicOperator: Send + Sync {
    /// Ensures `mode` exists in the prompt and transition tables,
    /// synthesizing entries on first sight. Idempotent.
    fn register_mode(&self, mode: &str, log_prefix: &str) -> Result<(), CliError>;
}

/// Collects the prompt candidates for a set of mode names, preserving order.
pub fn candidate_prompts(operator: &dyn Operator, modes: &[String]) -> Vec<ModePrompts> {
    modes
        .iter()
        .filter_map(|mode| {
            operator
                .prompts(mode)
                .map(|prompts| (mode.clone(), prompts))
        })
        .collect()
}

/// Ordered `(pattern, operator)` pairs resolved by first match.
pub struct OperatorRegistry {
    entries: Vec<(Regex, Arc<dyn Operator>)>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers an operator under a device-type pattern. Patterns are
    /// matched in registration order; registration happens at process
    /// startup only.
    pub fn register(&mut self, pattern: &str, operator: Arc<dyn Operator>) {
        match Regex::new(pattern) {
            Ok(regex) => {
                info!("registered operator for {pattern}");
                self.entries.push((regex, operator));
            }
            Err(err) => panic!("invalid operator registration pattern {pattern:?}: {err}"),
        }
    }

    /// Returns the first operator whose pattern matches the device type.
    pub fn resolve(&self, device_type: &str) -> Result<Arc<dyn Operator>, CliError> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(device_type))
            .map(|(_, operator)| operator.clone())
            .ok_or_else(|| CliError::NoOperatorFound(device_type.to_string()))
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry. Built once, read-only afterwards.
pub static REGISTRY: Lazy<OperatorRegistry> = Lazy::new(|| {
    let mut registry = OperatorRegistry::new();
    vendors::register_all(&mut registry);
    registry
});
