//! Cisco IOS / IOS-XE operator.
//!
//! Three modes: `login` (user EXEC, `Switch>`), `login_enable` (privileged
//! EXEC, `Switch#`), and `configure_terminal` (`Switch(config)#`). The login
//! prompt observed after SSH auth is either of the first two depending on
//! the device's privilege configuration, so the start mode is a disjunction.

use std::collections::HashMap;

use regex::{Regex, RegexSet};

use crate::operator::Operator;

pub struct IosOperator {
    prompts: Vec<(String, Vec<Regex>)>,
    transitions: HashMap<(String, String), Vec<String>>,
    errors: RegexSet,
    excludes: Vec<Regex>,
    line_break: &'static str,
}

impl IosOperator {
    pub fn new() -> Self {
        let login = Regex::new(r"^[[:alnum:]._-]+> ?$").unwrap();
        let login_enable = Regex::new(r"[[:alnum:]]{1,}(-[[:alnum:]]+){0,}#$").unwrap();
        let configure_terminal =
            Regex::new(r"[[:alnum:]]{1,}(-[[:alnum:]]+){0,}\(config\)#$").unwrap();

        let mut transitions = HashMap::new();
        transitions.insert(
            ("login_enable".to_string(), "configure_terminal".to_string()),
            vec!["config terminal".to_string()],
        );
        transitions.insert(
            ("configure_terminal".to_string(), "login_enable".to_string()),
            vec!["exit".to_string()],
        );

        Self {
            prompts: vec![
                ("login".to_string(), vec![login]),
                ("login_enable".to_string(), vec![login_enable]),
                ("configure_terminal".to_string(), vec![configure_terminal]),
            ],
            transitions,
            errors: RegexSet::new([
                r"^Command authorization failed\.$",
                r"^% ",
                r"^Command rejected:",
            ])
            .unwrap(),
            excludes: vec![
                Regex::new(r"^\s*--More--\s*$").unwrap(),
                Regex::new(r"^\s*<--- More --->\s*$").unwrap(),
            ],
            line_break: "\n",
        }
    }

    fn known(&self, mode: &str) -> bool {
        self.prompts.iter().any(|(name, _)| name == mode)
    }
}

impl Default for IosOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for IosOperator {
    fn modes(&self) -> Vec<String> {
        self.prompts.iter().map(|(name, _)| name.clone()).collect()
    }

    fn prompts(&self, mode: &str) -> Option<Vec<Regex>> {
        self.prompts
            .iter()
            .find(|(name, _)| name == mode)
            .map(|(_, prompts)| prompts.clone())
    }

    fn transition(&self, src: &str, dst: &str) -> Option<Vec<String>> {
        if src == dst && self.known(src) {
            return Some(Vec::new());
        }
        self.transitions
            .get(&(src.to_string(), dst.to_string()))
            .cloned()
    }

    fn error_patterns(&self) -> &RegexSet {
        &self.errors
    }

    fn excludes(&self) -> Option<&[Regex]> {
        Some(&self.excludes)
    }

    fn line_break(&self) -> &str {
        self.line_break
    }

    fn start_mode(&self) -> &str {
        "login_or_login_enable"
    }

    fn start_modes(&self) -> Vec<String> {
        vec!["login".to_string(), "login_enable".to_string()]
    }
}
