//! Makefile/Ninja-style dependency rule emission from an include trace.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{KppError, Result};
use crate::includes::find_in_include_dirs;

/// Headers shipped with the controller software (V7.70-1); with
/// `ignore_system_headers` these never show up as prerequisites.
pub const SYSTEM_HEADERS: &[&str] = &[
    "iosetup.kl",
    "kldctptx.kl",
    "kldcutil.kl",
    "klersys.kl",
    "klerxmlf.kl",
    "klevaxdf.kl",
    "klevccdf.kl",
    "klevkeys.kl",
    "klevkmsk.kl",
    "klevksp.kl",
    "klevtpe.kl",
    "klevutil.kl",
    "kliosop.kl",
    "kliotyps.kl",
    "kliouop.kl",
    "klrdread.kl",
    "klrdutil.kl",
    "kluifdir.kl",
    "passcons.kl",
    "ppedef.kl",
    "runform.kl",
    "sledef.kl",
];

pub fn is_system_header(header: &str) -> bool {
    SYSTEM_HEADERS.contains(&header)
}

#[derive(Debug, Clone, Default)]
pub struct DepOptions {
    /// Target of the emitted rule, e.g. `prog.pc`.
    pub target: String,
    /// Drop allowlisted controller headers from the prerequisite list.
    pub ignore_system_headers: bool,
    /// Treat unresolvable headers as generated files: keep them in the
    /// list, unresolved, instead of failing.
    pub ignore_missing: bool,
    /// Append a phony no-prerequisite rule per dependency so renames don't
    /// break existing build files.
    pub phony_targets: bool,
}

/// Renders the dependency rule for one include trace. Relative paths are
/// resolved against the include directories, first match wins.
pub fn emit_depfile(
    trace: &[String],
    include_dirs: &[PathBuf],
    opts: &DepOptions,
) -> Result<String> {
    let mut deps: Vec<String> = Vec::new();

    for header in trace {
        if opts.ignore_system_headers && is_system_header(header) {
            debug!("ignoring system header '{header}'");
            continue;
        }

        let mut dep = PathBuf::from(header);
        if dep.is_relative() {
            match find_in_include_dirs(header, include_dirs) {
                Some(dir) => {
                    debug!("found {header} in '{}'", dir.display());
                    dep = dir.join(header);
                }
                None if opts.ignore_missing => {
                    warn!("assuming '{header}' is a generated file");
                }
                None => {
                    return Err(KppError::DependencyResolution {
                        header: header.clone(),
                    });
                }
            }
        }
        deps.push(dep.to_string_lossy().into_owned());
    }

    // ninja chokes on unescaped spaces
    let escape = |s: &str| s.replace(' ', "\\ ");
    let target = escape(&opts.target);
    let deps: Vec<String> = deps.iter().map(|d| escape(d)).collect();

    let mut out = format!("{target}: {}\n", deps.join(" "));
    if opts.phony_targets {
        for dep in &deps {
            out.push_str(dep);
            out.push_str(":\n");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn opts(target: &str) -> DepOptions {
        DepOptions {
            target: target.to_string(),
            ..DepOptions::default()
        }
    }

    #[test]
    fn system_headers_are_filtered_when_asked() {
        let inc = tempfile::tempdir().unwrap();
        std::fs::write(inc.path().join("user.klh"), "").unwrap();
        let dirs = vec![inc.path().to_path_buf()];

        let trace = vec!["kliotyps.kl".to_string(), "user.klh".to_string()];

        let mut o = opts("prog.pc");
        o.ignore_system_headers = true;
        let out = emit_depfile(&trace, &dirs, &o).unwrap();
        assert_eq!(
            out,
            format!("prog.pc: {}\n", inc.path().join("user.klh").display())
        );
    }

    #[test]
    fn unresolved_header_is_a_data_error() {
        let trace = vec!["ghost.klh".to_string()];
        let err = emit_depfile(&trace, &[], &opts("prog.pc")).unwrap_err();
        assert!(matches!(err, KppError::DependencyResolution { .. }));
        assert_eq!(err.exit_code(), crate::error::EX_DATAERR);
    }

    #[test]
    fn missing_headers_kept_when_assumed_generated() {
        let trace = vec!["generated.klh".to_string()];
        let mut o = opts("prog.pc");
        o.ignore_missing = true;
        let out = emit_depfile(&trace, &[], &o).unwrap();
        assert_eq!(out, "prog.pc: generated.klh\n");
    }

    #[test]
    fn absolute_paths_skip_resolution() {
        let trace = vec!["/abs/path/hdr.klh".to_string()];
        let out = emit_depfile(&trace, &[], &opts("prog.pc")).unwrap();
        assert_eq!(out, "prog.pc: /abs/path/hdr.klh\n");
    }

    #[test]
    fn spaces_are_escaped() {
        let trace = vec!["/a dir/hdr.klh".to_string()];
        let out = emit_depfile(&trace, &[], &opts("my prog.pc")).unwrap();
        assert_eq!(out, "my\\ prog.pc: /a\\ dir/hdr.klh\n");
    }

    #[test]
    fn phony_rules_follow_the_main_rule() {
        let trace = vec!["/x/a.klh".to_string(), "/x/b.klh".to_string()];
        let mut o = opts("prog.pc");
        o.phony_targets = true;
        let out = emit_depfile(&trace, &[], &o).unwrap();
        assert_eq!(out, "prog.pc: /x/a.klh /x/b.klh\n/x/a.klh:\n/x/b.klh:\n");
    }
}
