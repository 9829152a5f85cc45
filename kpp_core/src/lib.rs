//! Preprocessing core shared by the `ktransw` and `kcdictw` wrappers.
//!
//! The vendor toolchain for FANUC's KAREL language predates most modern
//! build conveniences. This crate supplies them in front of it: multi-pass
//! macro expansion through an external gpp engine, pseudo-class composition
//! via synthesized compilation units, selective header imports, dependency
//! rule emission and a persisted build manifest. The wrappers own the
//! command lines and the vendor tool processes; everything in between lives
//! here.

pub mod classes;
pub mod deps;
pub mod error;
pub mod gpp;
pub mod imports;
pub mod includes;
pub mod inject;
pub mod manifest;
pub mod pipeline;
pub mod textops;
pub mod translator;
pub mod workdir;

pub use classes::ClassDecl;
pub use error::{EX_DATAERR, KppError, Result};
pub use gpp::GppConfig;
pub use manifest::{ManifestOptions, SourceKind};
pub use pipeline::{Pipeline, RunContext, UnitKind};
pub use workdir::BuildDir;
