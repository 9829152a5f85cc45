//! Re-injection of expanded header units at their placeholder markers.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::classes::ClassDecl;
use crate::error::{KppError, Result};

/// Replaces every placeholder marker in `path` whose `(seq, object)` pair
/// matches a known declaration with the full content of that object's
/// expanded header unit, rewriting the file in place.
///
/// `headers` holds the final files of all header units expanded so far; the
/// unit for an object is found by its `<object>_h` file stem. A marker that
/// names a known declaration but has no expanded unit behind it signals an
/// orchestration bug and is fatal.
pub fn inject_headers(path: &Path, decls: &[ClassDecl], headers: &[PathBuf]) -> Result<()> {
    if decls.is_empty() {
        return Ok(());
    }

    let names = decls
        .iter()
        .map(|d| regex::escape(&d.object))
        .collect::<Vec<_>>()
        .join("|");
    let marker_re = Regex::new(&format!(r"^-- INCLUDE_MARKER (\d+):({names}):1\s*$"))?;

    let text = fs::read_to_string(path)?;
    let mut out = String::with_capacity(text.len());
    let mut changed = false;

    for line in text.lines() {
        match marker_re.captures(line) {
            Some(caps) => {
                let seq: u32 = caps[1].parse().unwrap_or(0);
                let object = &caps[2];
                if decls.iter().any(|d| d.seq == seq && d.object == object) {
                    let header = find_header_unit(object, headers).ok_or_else(|| {
                        KppError::MissingHeaderUnit {
                            seq,
                            object: object.to_string(),
                        }
                    })?;
                    debug!("injecting {} at marker {seq}:{object}", header.display());
                    let content = fs::read_to_string(&header)?;
                    out.push_str(&content);
                    if !content.ends_with('\n') {
                        out.push('\n');
                    }
                    changed = true;
                } else {
                    // marker names a known object but a foreign sequence id;
                    // leave it for the recursion level that owns it
                    out.push_str(line);
                    out.push('\n');
                }
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    if changed {
        fs::write(path, out)?;
    }
    Ok(())
}

fn find_header_unit(object: &str, headers: &[PathBuf]) -> Option<PathBuf> {
    let stem = format!("{object}_h");
    headers
        .iter()
        .find(|h| h.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decl(seq: u32, object: &str) -> ClassDecl {
        ClassDecl {
            seq,
            object: object.into(),
            class_file: format!("{object}.klc"),
            header_file: format!("{object}.klh"),
            type_file: None,
        }
    }

    #[test]
    fn marker_is_replaced_by_header_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p1-prog.kl");
        fs::write(&target, "head\n-- INCLUDE_MARKER 1:widget:1\ntail\n").unwrap();

        let header = dir.path().join("widget_h.kl");
        fs::write(&header, "ROUTINE widget_init FROM widget\n").unwrap();

        inject_headers(&target, &[decl(1, "widget")], &[header]).unwrap();

        let out = fs::read_to_string(&target).unwrap();
        assert_eq!(out, "head\nROUTINE widget_init FROM widget\ntail\n");
    }

    #[test]
    fn missing_expanded_unit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p1-prog.kl");
        fs::write(&target, "-- INCLUDE_MARKER 1:widget:1\n").unwrap();

        let err = inject_headers(&target, &[decl(1, "widget")], &[]).unwrap_err();
        assert!(matches!(
            err,
            KppError::MissingHeaderUnit { seq: 1, ref object } if object == "widget"
        ));
    }

    #[test]
    fn unknown_object_markers_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p1-prog.kl");
        let text = "-- INCLUDE_MARKER 1:stranger:1\n";
        fs::write(&target, text).unwrap();

        let header = dir.path().join("widget_h.kl");
        fs::write(&header, "unused\n").unwrap();

        inject_headers(&target, &[decl(1, "widget")], &[header.clone()]).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), text);

        // same object name under a foreign sequence id is also left alone
        let text = "-- INCLUDE_MARKER 7:widget:1\n";
        fs::write(&target, text).unwrap();
        inject_headers(&target, &[decl(1, "widget")], &[header]).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), text);
    }

    #[test]
    fn include_trace_records_are_not_markers() {
        // a real engine trace record has a path, not a bare object name,
        // and never collides with the alternation
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p1-prog.kl");
        let text = "-- INCLUDE_MARKER 12:some/path.kl:1\n";
        fs::write(&target, text).unwrap();

        let header = dir.path().join("widget_h.kl");
        fs::write(&header, "unused\n").unwrap();

        inject_headers(&target, &[decl(1, "widget")], &[header]).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), text);
    }
}
