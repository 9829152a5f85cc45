use std::path::PathBuf;
use thiserror::Error;

/// Exit code for data errors (`EX_DATAERR`), used when a traced include
/// cannot be resolved and missing-header tolerance is off.
pub const EX_DATAERR: i32 = 65;

#[derive(Error, Debug)]
pub enum KppError {
    #[error("{tool} exited with code {code}:\n{stderr}")]
    ToolInvocation {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{header}: not found in any of {searched} include directories")]
    HeaderNotFound { header: String, searched: usize },

    #[error("no expanded header unit for placeholder {seq}:{object}")]
    MissingHeaderUnit { seq: u32, object: String },

    #[error("{header}: No such file or directory")]
    DependencyResolution { header: String },

    #[error("manifest {path} unreadable after {attempts} attempts")]
    ManifestContention { path: PathBuf, attempts: u32 },

    #[error("cyclic class composition involving '{class_file}' (depth {depth})")]
    CyclicComposition { class_file: String, depth: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl KppError {
    /// Process exit code to report for this error.
    ///
    /// Tool failures mirror the failing tool's own exit code; unresolvable
    /// dependencies use the distinct data-error code.
    pub fn exit_code(&self) -> i32 {
        match self {
            KppError::ToolInvocation { code, .. } => *code,
            KppError::DependencyResolution { .. } => EX_DATAERR,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, KppError>;
