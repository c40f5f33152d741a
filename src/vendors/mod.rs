//! Vendor operator implementations.
//!
//! Each submodule declares one device family: its prompt grammar, mode
//! transition verbs, error signatures, and transport quirks. New vendors
//! plug in by adding a module and a registration line here.

use crate::operator::OperatorRegistry;

pub mod cisco_ios;
pub mod fortigate;

/// Registers every shipped vendor into the process registry.
pub fn register_all(registry: &mut OperatorRegistry) {
    registry.register(
        r"(?i)cisco\.ios\..*",
        std::sync::Arc::new(cisco_ios::IosOperator::new()),
    );
    registry.register(
        r"(?i)fortinet\.fortigate-vm64-kvm\..*",
        std::sync::Arc::new(fortigate::FortigateOperator::new()),
    );
}
