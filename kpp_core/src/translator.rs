//! Invocation of the vendor translator (or compressor) binary.
//!
//! The vendor tools take their arguments in forward-slash notation and are
//! picky about paths: anything that is neither an option nor a core version
//! identifier is treated as a path and made absolute. Arguments are passed
//! as a discrete vector, so embedded spaces survive without shell quoting.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{KppError, Result};

/// Output of one vendor tool run, with stderr folded into the text: the
/// tools use the two streams interchangeably, so they are relayed as one.
#[derive(Debug)]
pub struct ToolOutput {
    pub code: i32,
    pub text: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Options start with `/`; tokens starting with `V`/`v` are core version
/// identifiers (e.g. `V7.70-1`). Everything else is a path.
pub fn is_passthrough_token(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with('V') || arg.starts_with('v')
}

/// Makes every path argument absolute, leaving options and version
/// identifiers untouched.
pub fn absolutize_args(args: &[String]) -> Result<Vec<String>> {
    args.iter()
        .map(|arg| {
            if is_passthrough_token(arg) {
                Ok(arg.clone())
            } else {
                Ok(std::path::absolute(arg)?.to_string_lossy().into_owned())
            }
        })
        .collect()
}

/// Swaps the caller's source-file argument for the preprocessed file.
pub fn substitute_source(args: &[String], source: &str, replacement: &Path) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg == source {
                replacement.to_string_lossy().into_owned()
            } else {
                arg.clone()
            }
        })
        .collect()
}

/// Rewrites build-directory references in relayed tool output so messages
/// point at the original source location instead of the scratch copy.
pub fn remap_output(text: &str, build_dir: &Path, source_dir: &Path) -> String {
    let from = build_dir.to_string_lossy();
    let to = source_dir.to_string_lossy();
    text.replace(from.as_ref(), to.as_ref())
}

/// Runs the tool to completion and captures its combined output. A spawn
/// failure is an error; a non-zero exit is not, the caller decides how to
/// relay it.
pub fn run_tool(bin: &Path, args: &[String], cwd: Option<&Path>) -> Result<ToolOutput> {
    debug!("running {} with {} argument(s)", bin.display(), args.len());

    let mut cmd = Command::new(bin);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let out = cmd.output().map_err(|err| {
        KppError::Io(std::io::Error::new(
            err.kind(),
            format!("failed to run {}: {err}", bin.display()),
        ))
    })?;

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));

    Ok(ToolOutput {
        code: out.status.code().unwrap_or(1),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn options_and_versions_pass_through() {
        assert!(is_passthrough_token("/config"));
        assert!(is_passthrough_token("V7.70-1"));
        assert!(is_passthrough_token("v8.30"));
        assert!(!is_passthrough_token("robot.ini"));
        assert!(!is_passthrough_token("my_prog.kl"));
    }

    #[test]
    fn only_path_arguments_are_absolutized() {
        let args = vec![
            "/config".to_string(),
            "robot.ini".to_string(),
            "V7.70-1".to_string(),
        ];
        let abs = absolutize_args(&args).unwrap();
        assert_eq!(abs[0], "/config");
        assert!(Path::new(&abs[1]).is_absolute());
        assert!(abs[1].ends_with("robot.ini"));
        assert_eq!(abs[2], "V7.70-1");
    }

    #[test]
    fn source_argument_is_substituted() {
        let args = vec!["prog.kl".to_string(), "/config".to_string()];
        let out = substitute_source(&args, "prog.kl", Path::new("/tmp/build/prog.kl"));
        assert_eq!(out, vec!["/tmp/build/prog.kl", "/config"]);
    }

    #[test]
    fn build_dir_references_are_remapped() {
        let text = "error in /tmp/ktransw-x-buildd/prog.kl line 3";
        let out = remap_output(
            text,
            Path::new("/tmp/ktransw-x-buildd"),
            Path::new("/home/user/src"),
        );
        assert_eq!(out, "error in /home/user/src/prog.kl line 3");
    }
}
