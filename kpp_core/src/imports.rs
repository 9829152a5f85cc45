//! Selective header imports: `%from <header> %import <symbol-list>`.
//!
//! Instead of pulling a whole header in, only the requested declarations
//! (plus the header's program-name metadata) are extracted and substituted
//! in place of the declaration line. Extraction is line-oriented: a full
//! grammar is deliberately out of scope for the supported subset.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{KppError, Result};
use crate::includes::find_in_include_dirs;

/// Fixed directive prepended to every substitution so the extracted
/// declarations resolve against the namespacing macros.
const NAMESPACE_DIRECTIVE: &str = "%include namespace.m";

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%from\s+(\S+)\s+%import\s+(.+)$").expect("import pattern"));

// Program-name declarations are kept regardless of the requested symbols.
static PROG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%define\s+prog_name(_alias)?\b").expect("prog_name pattern"));

/// Rewrites `path` in place, resolving every `%from ... %import ...`
/// declaration against the ordered include directories. A header missing
/// from all of them is fatal.
pub fn resolve_imports(path: &Path, include_dirs: &[PathBuf]) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let mut out = String::with_capacity(text.len());
    let mut changed = false;

    for line in text.lines() {
        if let Some(caps) = IMPORT_RE.captures(line) {
            let header = &caps[1];
            let symbols: Vec<&str> = caps[2]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();

            let dir = find_in_include_dirs(header, include_dirs).ok_or_else(|| {
                KppError::HeaderNotFound {
                    header: header.to_string(),
                    searched: include_dirs.len(),
                }
            })?;
            debug!("importing {symbols:?} from {header} (found in {})", dir.display());

            out.push_str(&extract_declarations(&dir.join(header), &symbols)?);
            changed = true;
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    if changed {
        fs::write(path, out)?;
    }
    Ok(())
}

/// Pulls the requested symbols out of a header: program-name lines always,
/// declaration lines on a case-insensitive whole-word match. A matched line
/// ending in the `\` continuation marker absorbs the following lines until
/// one without it.
fn extract_declarations(header_path: &Path, symbols: &[&str]) -> Result<String> {
    let matchers: Vec<Regex> = symbols
        .iter()
        .map(|sym| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(sym))))
        .collect::<std::result::Result<_, _>>()?;

    let text = fs::read_to_string(header_path)?;
    let lines: Vec<&str> = text.lines().collect();

    let mut picked = String::from(NAMESPACE_DIRECTIVE);
    picked.push('\n');

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let wanted = PROG_NAME_RE.is_match(line) || matchers.iter().any(|m| m.is_match(line));
        if wanted {
            picked.push_str(line);
            picked.push('\n');
            while lines[i].trim_end().ends_with('\\') && i + 1 < lines.len() {
                i += 1;
                picked.push_str(lines[i]);
                picked.push('\n');
            }
        }
        i += 1;
    }

    Ok(picked)
}
