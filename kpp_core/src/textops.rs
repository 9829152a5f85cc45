//! In-place text cleanups applied between macro passes.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Removes every line whose stripped content is empty, rewriting the file
/// in place. Repeated macro passes otherwise accumulate blank lines that
/// confuse the next pass's line-oriented matching. Idempotent.
pub fn compact_blank_lines(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let kept: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    if out != text {
        fs::write(path, out)?;
    }
    Ok(())
}

/// Removes the stray `\` escape characters left in front of `%` directives
/// once the deferred macro definitions carried inside injected headers have
/// been evaluated. Idempotent.
pub fn strip_stray_escapes(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let cleaned = text.replace("\\%", "%");
    if cleaned != text {
        fs::write(path, cleaned)?;
    }
    Ok(())
}
