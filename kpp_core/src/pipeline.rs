//! The recursive expansion pipeline.
//!
//! One source file moves through a fixed sequence of engine passes and text
//! rewrites; every `%class` declaration found along the way synthesizes two
//! tiny units that re-enter the same pipeline before the parent can finish.
//! All run-wide state lives in [`RunContext`], created once per top-level
//! invocation and threaded through every recursion level.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::classes::{self, ClassDecl};
use crate::error::{KppError, Result};
use crate::gpp::GppConfig;
use crate::{imports, inject, textops};

/// Composition deeper than this fails fast instead of recursing further;
/// the source format itself carries no cycle detection.
pub const MAX_COMPOSITION_DEPTH: usize = 32;

/// What a pipeline invocation is expanding. Top-level sources and class
/// bodies end up on the translation list; header units only feed the
/// re-injection step and are never handed to the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Source,
    Body,
    Header,
}

/// Run-scoped accumulators, visible to every recursion level.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Every class declaration discovered during the run, in discovery
    /// order. Placeholder matching needs these addressable across levels.
    pub classes: Vec<ClassDecl>,
    /// Final files of all expanded header units.
    pub headers: Vec<PathBuf>,
    /// Final files in translation order: a class body always precedes the
    /// unit that declared it.
    pub outputs: Vec<PathBuf>,
    /// Class files on the active expansion path, for cycle detection.
    expansion_stack: Vec<String>,
}

impl RunContext {
    pub fn new() -> Self {
        RunContext::default()
    }
}

pub struct Pipeline<'a> {
    gpp: &'a GppConfig,
    build_dir: &'a Path,
    pub ctx: RunContext,
}

impl<'a> Pipeline<'a> {
    pub fn new(gpp: &'a GppConfig, build_dir: &'a Path) -> Self {
        Pipeline {
            gpp,
            build_dir,
            ctx: RunContext::new(),
        }
    }

    /// Expands one top-level source to its translation-ready form. The
    /// returned path is the last entry of `ctx.outputs`.
    pub fn run_source(&mut self, source: &Path) -> Result<PathBuf> {
        self.expand(source, UnitKind::Source)
    }

    fn expand(&mut self, source: &Path, kind: UnitKind) -> Result<PathBuf> {
        let base = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                KppError::Io(std::io::Error::other(format!(
                    "unusable source file name: {}",
                    source.display()
                )))
            })?;
        debug!("expanding {} ({kind:?})", source.display());

        // raw pass: resolve includes, emit the include-marker trace
        let raw = self.stage_path("raw", &base);
        self.gpp.run_pass(source, &raw)?;
        textops::compact_blank_lines(&raw)?;

        // class scan replaces declarations with placeholder markers
        let scanned = self.stage_path("cls", &base);
        let decls = classes::scan_classes(&raw, &scanned)?;
        if !decls.is_empty() {
            debug!("{} class declaration(s) in {base}", decls.len());
        }
        self.ctx.classes.extend(decls.iter().cloned());

        imports::resolve_imports(&scanned, &self.gpp.include_dirs)?;

        let pass1 = self.stage_path("p1", &base);
        self.gpp.run_pass(&scanned, &pass1)?;
        textops::compact_blank_lines(&pass1)?;

        if !decls.is_empty() {
            // each declaration expands as two independent units before the
            // expanded headers can be spliced back in, strictly in
            // declaration order
            for decl in &decls {
                self.expand_class_unit(decl)?;
            }
            inject::inject_headers(&pass1, &self.ctx.classes, &self.ctx.headers)?;
        }

        // pass 2 evaluates the deferred directives carried inside injected
        // headers, then the escape characters that deferred them go away
        let pass2 = self.stage_path("p2", &base);
        self.gpp.run_pass(&pass1, &pass2)?;
        textops::strip_stray_escapes(&pass2)?;

        let final_path = self.build_dir.join(&base);
        self.gpp.run_pass(&pass2, &final_path)?;
        textops::compact_blank_lines(&final_path)?;

        match kind {
            UnitKind::Source | UnitKind::Body => self.ctx.outputs.push(final_path.clone()),
            UnitKind::Header => self.ctx.headers.push(final_path.clone()),
        }
        Ok(final_path)
    }

    fn expand_class_unit(&mut self, decl: &ClassDecl) -> Result<()> {
        let depth = self.ctx.expansion_stack.len();
        if depth >= MAX_COMPOSITION_DEPTH
            || self.ctx.expansion_stack.contains(&decl.class_file)
        {
            return Err(KppError::CyclicComposition {
                class_file: decl.class_file.clone(),
                depth,
            });
        }

        self.ctx.expansion_stack.push(decl.class_file.clone());
        let result = self.expand_class_units_inner(decl);
        self.ctx.expansion_stack.pop();
        result
    }

    fn expand_class_units_inner(&mut self, decl: &ClassDecl) -> Result<()> {
        // unit sources live apart from the expansion outputs, whose names
        // they would otherwise collide with
        let units = self.build_dir.join("units");
        fs::create_dir_all(&units)?;

        let body_src = units.join(decl.body_unit_name());
        fs::write(&body_src, classes::synthesize_body(decl))?;
        self.expand(&body_src, UnitKind::Body)?;

        let header_src = units.join(decl.header_unit_name());
        fs::write(&header_src, classes::synthesize_header(decl))?;
        self.expand(&header_src, UnitKind::Header)?;

        Ok(())
    }

    fn stage_path(&self, stage: &str, base: &str) -> PathBuf {
        self.build_dir.join(format!("{stage}-{base}"))
    }
}
