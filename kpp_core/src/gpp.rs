//! One pass of the external gpp macro engine.
//!
//! The engine is driven with a fixed argument template: user-defined mode
//! tuned so plain KAREL source needs no macro sigils, meta-macros keyed off
//! a line-leading `%`, and an include-marker side channel that records every
//! file the engine pulls in. The template is based on gpp's C++
//! compatibility mode, adjusted to sit well with KAREL sources.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::{KppError, Result};

/// Include-marker record format handed to the engine via `--includemarker`.
/// The `--` prefix keeps the records commented out as far as the KAREL
/// translator is concerned, so they can ride along to the final file.
pub const INCLUDE_MARKER_FORMAT: &str = "-- INCLUDE_MARKER %:%:%";

/// One gpp invocation target: the engine binary plus the caller-supplied
/// include directories and user macro definitions shared by every pass.
#[derive(Debug, Clone, Default)]
pub struct GppConfig {
    pub bin: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
}

impl GppConfig {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        GppConfig {
            bin: bin.into(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
        }
    }

    /// Builds the full argument vector for one pass over `input`, writing
    /// the engine's output to `output`.
    pub fn build_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);

        // Unix line endings, and the include-marker side channel.
        cmd.arg("+z");
        cmd.arg("--includemarker").arg(INCLUDE_MARKER_FORMAT);

        // User-defined mode: no macro start/end sequences (zero/one-argument
        // macros need no syntax), parenthesized argument lists, `#` for
        // argument references, no quote character.
        cmd.args(["-U", "", "", "(", ",", ")", "(", ")", "#", ""]);

        // Meta-macros start a line with `%` and run to end of line, with
        // space-separated arguments.
        cmd.args(["-M", "\\n%\\w", "\\n", " ", " ", "\\n", "", ""]);

        for dir in &self.include_dirs {
            let mut flag = OsString::from("-I");
            flag.push(dir.as_os_str());
            cmd.arg(flag);
        }
        for def in &self.defines {
            cmd.arg(format!("-D{def}"));
        }

        cmd.arg("-o").arg(output).arg(input);
        cmd
    }

    /// Runs one blocking pass. A non-zero exit aborts the whole pipeline:
    /// the engine's exit code and stderr are surfaced verbatim.
    pub fn run_pass(&self, input: &Path, output: &Path) -> Result<()> {
        debug!("gpp pass: {} -> {}", input.display(), output.display());

        let out = self.build_command(input, output).output()?;
        if !out.status.success() {
            return Err(KppError::ToolInvocation {
                tool: self.bin.display().to_string(),
                code: out.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

/// Resolves a tool to an invocable path: explicit paths are made absolute,
/// bare names are looked up on `PATH`.
pub fn resolve_tool(explicit: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(std::path::absolute(path)?),
        None => which::which(default_name).map_err(|_| KppError::ToolNotFound {
            tool: default_name.to_string(),
        }),
    }
}
