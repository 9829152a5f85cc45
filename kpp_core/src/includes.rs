//! Scanning of the include-marker side channel emitted by the macro engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;

/// One include-marker record: the engine emits `line:file:op` with op 1 on
/// entering a file and op 2 on leaving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRecord {
    pub line: u32,
    pub path: String,
    pub event: IncludeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeEvent {
    Enter,
    Exit,
}

// Anchored at line start on purpose: a record preceded by the engine's own
// comment sequence (or any whitespace) is not a real include. Paths run to
// the first whitespace character; embedded whitespace is upstream-illegal
// and is not repaired here.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^-- INCLUDE_MARKER (\d+):(\S+):(\d+|)").expect("marker pattern")
});

/// Parses all well-formed include-marker records out of `text`.
pub fn scan_records(text: &str) -> Vec<IncludeRecord> {
    MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let event = match &caps[3] {
                "1" => IncludeEvent::Enter,
                "2" => IncludeEvent::Exit,
                _ => return None,
            };
            Some(IncludeRecord {
                line: caps[1].parse().unwrap_or(0),
                path: caps[2].to_string(),
                event,
            })
        })
        .collect()
}

/// Returns the distinct included paths in first-seen order, considering
/// only file-enter records.
pub fn scan_includes(text: &str) -> Vec<String> {
    let mut incs: Vec<String> = Vec::new();
    for rec in scan_records(text) {
        if rec.event == IncludeEvent::Enter && !incs.contains(&rec.path) {
            incs.push(rec.path);
        }
    }
    incs
}

/// [`scan_includes`] over a file on disk.
pub fn scan_includes_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(scan_includes(&text))
}

/// Locates `name` in the ordered include directories; first match wins.
/// Returns the directory that contained it.
pub fn find_in_include_dirs(name: &str, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    include_dirs
        .iter()
        .find(|dir| dir.join(name).exists())
        .cloned()
}
