//! FortiGate (FortiOS 5.6.x) operator with dynamic VDOM registration.
//!
//! FortiOS scopes its CLI by virtual domain: `config vdom` + `edit <name>`
//! enters a VDOM, `config global` enters global scope, `end` returns to the
//! root shell. The set of VDOMs is a device property, not a vendor constant,
//! so modes are registered per request: the first request naming a VDOM
//! synthesizes its prompt regex from a template and materializes transitions
//! between the new mode and every mode already known.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::info;
use regex::{Regex, RegexSet};

use crate::error::CliError;
use crate::operator::{DynamicOperator, Operator};

struct Tables {
    prompts: Vec<(String, Vec<Regex>)>,
    transitions: HashMap<(String, String), Vec<String>>,
}

pub struct FortigateOperator {
    tables: Mutex<Tables>,
    errors: RegexSet,
    intermediate: Regex,
    line_break: &'static str,
}

impl FortigateOperator {
    pub fn new() -> Self {
        let login = Regex::new(r"[[:alnum:]][[:alnum:]_-]* (#|\$) $").unwrap();
        Self {
            tables: Mutex::new(Tables {
                prompts: vec![("login".to_string(), vec![login])],
                transitions: HashMap::new(),
            }),
            errors: RegexSet::new([
                r"^Unknown action 0$",
                r" # Unknown action 0$",
                r"^command parse error",
                r"^value parse error",
                r"^Command fail\. Return code",
                r" # Command fail\. Return code",
                r"^please use 'end' to return to root shell",
                r"^entry not found in datasource",
                r"^node_check_object fail",
            ])
            .unwrap(),
            intermediate: Regex::new(r"[[:alnum:]][[:alnum:]_-]* \([[:alnum:]_-]+\) (#|\$) $")
                .unwrap(),
            line_break: "\n",
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Transition commands from `src` to `dst`. Any scope change passes
    /// through the root shell, so non-login sources chain an `end` first.
    fn transition_commands(src: &str, dst: &str) -> Vec<String> {
        if src == dst {
            return Vec::new();
        }
        if dst == "login" {
            return vec!["end".to_string()];
        }
        if src == "login" && dst == "global" {
            return vec!["config global".to_string()];
        }
        if src == "login" {
            return vec![format!("config vdom\n\tedit {dst}")];
        }
        if dst == "global" {
            return vec!["end\nconfig global".to_string()];
        }
        vec![format!("end\nconfig vdom\n\tedit {dst}")]
    }
}

impl Default for FortigateOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for FortigateOperator {
    fn modes(&self) -> Vec<String> {
        self.tables()
            .prompts
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn prompts(&self, mode: &str) -> Option<Vec<Regex>> {
        self.tables()
            .prompts
            .iter()
            .find(|(name, _)| name == mode)
            .map(|(_, prompts)| prompts.clone())
    }

    fn transition(&self, src: &str, dst: &str) -> Option<Vec<String>> {
        let tables = self.tables();
        if src == dst && tables.prompts.iter().any(|(name, _)| name == src) {
            return Some(Vec::new());
        }
        tables
            .transitions
            .get(&(src.to_string(), dst.to_string()))
            .cloned()
    }

    fn error_patterns(&self) -> &RegexSet {
        &self.errors
    }

    fn line_break(&self) -> &str {
        self.line_break
    }

    fn start_mode(&self) -> &str {
        "login"
    }

    fn intermediate_prompt(&self) -> Option<Regex> {
        Some(self.intermediate.clone())
    }

    fn as_dynamic(&self) -> Option<&dyn DynamicOperator> {
        Some(self)
    }
}

impl DynamicOperator for FortigateOperator {
    fn register_mode(&self, mode: &str, log_prefix: &str) -> Result<(), CliError> {
        let mut tables = self.tables();
        if tables.prompts.iter().any(|(name, _)| name == mode) {
            return Ok(());
        }

        info!("{log_prefix} registering prompt pattern for mode {mode}");
        let pattern = format!(
            r"[[:alnum:]][[:alnum:]_-]* \({}\) (#|\$) $",
            regex::escape(mode)
        );
        let prompt = Regex::new(&pattern)
            .map_err(|err| CliError::InvalidOperator(format!("mode {mode} prompt: {err}")))?;
        tables.prompts.push((mode.to_string(), vec![prompt]));

        // Other vdom/global modes may already be registered without a
        // transition to this one yet; connect both directions for all.
        let known: Vec<String> = tables.prompts.iter().map(|(name, _)| name.clone()).collect();
        for other in known {
            tables.transitions.insert(
                (other.clone(), mode.to_string()),
                Self::transition_commands(&other, mode),
            );
            tables.transitions.insert(
                (mode.to_string(), other.clone()),
                Self::transition_commands(mode, &other),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher;
    use crate::operator::candidate_prompts;

    fn with_modes(modes: &[&str]) -> FortigateOperator {
        let op = FortigateOperator::new();
        for mode in modes {
            op.register_mode(mode, "[test]").expect("register mode");
        }
        op
    }

    #[test]
    fn synthesized_prompt_matches_vdom_shell() {
        let op = with_modes(&["root"]);
        let candidates = candidate_prompts(&op, &op.modes());

        assert_eq!(matcher::match_tail("FGT-VM64 # ", &candidates), Some("login"));
        assert_eq!(
            matcher::match_tail("FGT-VM64 (root) # ", &candidates),
            Some("root")
        );
        assert_eq!(matcher::match_tail("FGT-VM64 (vdom) # ", &candidates), None);
    }

    #[test]
    fn registration_is_idempotent() {
        let op = with_modes(&["root"]);
        let before = op.modes();
        op.register_mode("root", "[test]").expect("re-register");
        assert_eq!(op.modes(), before);
        assert_eq!(
            op.transition("login", "root"),
            Some(vec!["config vdom\n\tedit root".to_string()])
        );
    }

    #[test]
    fn transitions_are_total_over_registered_modes() {
        let op = with_modes(&["root", "global", "dmz"]);
        let modes = op.modes();
        for src in &modes {
            for dst in &modes {
                assert!(
                    op.transition(src, dst).is_some(),
                    "missing transition {src} -> {dst}"
                );
            }
        }
    }

    #[test]
    fn scope_changes_route_through_the_root_shell() {
        let op = with_modes(&["root", "global", "dmz"]);

        assert_eq!(op.transition("root", "login"), Some(vec!["end".to_string()]));
        assert_eq!(
            op.transition("login", "global"),
            Some(vec!["config global".to_string()])
        );
        assert_eq!(
            op.transition("root", "global"),
            Some(vec!["end\nconfig global".to_string()])
        );
        assert_eq!(
            op.transition("root", "dmz"),
            Some(vec!["end\nconfig vdom\n\tedit dmz".to_string()])
        );
        assert_eq!(
            op.transition("global", "dmz"),
            Some(vec!["end\nconfig vdom\n\tedit dmz".to_string()])
        );
    }

    #[test]
    fn self_transitions_are_empty() {
        let op = with_modes(&["root"]);
        for mode in op.modes() {
            assert_eq!(op.transition(&mode, &mode), Some(Vec::new()));
        }
    }

    #[test]
    fn error_signatures_cover_fortios_failures() {
        let op = FortigateOperator::new();
        assert!(op.error_patterns().is_match("command parse error before 'bogus'"));
        assert!(op.error_patterns().is_match("Command fail. Return code -61"));
        assert!(op.error_patterns().is_match("entry not found in datasource"));
        assert!(!op.error_patterns().is_match("config vdom"));
    }

    #[test]
    fn intermediate_prompt_covers_unregistered_contexts() {
        let op = FortigateOperator::new();
        let loose = op.intermediate_prompt().expect("fortigate declares one");
        assert!(loose.is_match("FGT-VM64 (vdom) # "));
        assert!(loose.is_match("FGT-VM64 (root) # "));
        assert!(!loose.is_match("FGT-VM64 # "));
    }
}
