//! Prompt, echo, error, and exclude matching over accumulating device output.
//!
//! The device stream has no framing: output for a command is everything
//! between the echoed command and the next prompt. Lines terminated by the
//! operator's line break are scanned for error signatures; the un-terminated
//! tail is what prompt regexes run against. Matching order is fixed: the
//! first candidate mode wins, and within a mode the first regex wins, so a
//! given buffer always resolves to the same mode.

use std::borrow::Cow;

use log::debug;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

/// A candidate mode: its name plus its ordered prompt regexes.
pub type ModePrompts = (String, Vec<Regex>);

/// Leading carriage-return and backspace runs emitted by device terminals.
/// Stripped before any line-level matching.
static CONTROL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)").unwrap());

/// Strips terminal control artifacts from the start of a line.
pub fn clean_line(line: &str) -> Cow<'_, str> {
    CONTROL_PREFIX.replace(line, "")
}

/// Tests the buffer tail against every prompt regex of every candidate mode,
/// in order. Returns the name of the first mode with a matching regex.
pub fn match_tail<'a>(tail: &str, candidates: &'a [ModePrompts]) -> Option<&'a str> {
    for (mode, prompts) in candidates {
        if prompts.iter().any(|p| p.is_match(tail)) {
            return Some(mode.as_str());
        }
    }
    None
}

/// Offset just past the first occurrence of the transmitted command in the
/// accumulated output. Prompt detection must not begin before this point,
/// since the device may echo the previous prompt and the command together.
pub fn find_echo(buffer: &str, command: &str) -> Option<usize> {
    if command.is_empty() {
        return Some(0);
    }
    buffer.find(command).map(|pos| pos + command.len())
}

/// Removes the leading command echo and its line terminator from captured
/// output. Applying it twice yields the same result as once.
pub fn strip_echo<'a>(output: &'a str, command: &str) -> &'a str {
    if command.is_empty() {
        return output;
    }
    match output.strip_prefix(command) {
        Some(rest) => rest.trim_start_matches(['\r', '\n']),
        None => output,
    }
}

/// Scans captured output line by line and returns the first line matching
/// any error pattern.
pub fn first_error_line<'a>(output: &'a str, errors: &RegexSet) -> Option<&'a str> {
    output
        .lines()
        .map(|line| clean_trimmed(line))
        .find(|line| errors.is_match(line))
}

fn clean_trimmed(line: &str) -> &str {
    let line = line.trim_start_matches(['\r', '\u{8}']);
    line.trim_end_matches('\r')
}

/// Drops output lines matching any exclude pattern (banners, pagination
/// prompts). Runs after error detection so an excluded line can still have
/// flagged the command.
pub fn apply_excludes(output: &str, excludes: Option<&[Regex]>) -> String {
    let Some(excludes) = excludes else {
        return output.to_string();
    };
    let mut kept = String::with_capacity(output.len());
    for line in output.split_inclusive('\n') {
        let probe = clean_trimmed(line.trim_end_matches('\n'));
        if excludes.iter().any(|e| e.is_match(probe)) {
            continue;
        }
        kept.push_str(line);
    }
    kept
}

/// Applies the operator's named decoder to captured output. The empty name
/// is pass-through; unknown names fall back to pass-through with a note.
/// Chunk-level byte conversion happens at the transport boundary.
pub fn decode_output(encoding: &str, text: String) -> String {
    if encoding.is_empty() {
        return text;
    }
    debug!("no decoder registered for encoding {encoding:?}, passing through");
    text
}
