//! Detection of `%class` declarations and synthesis of the tiny compilation
//! units that realize object composition.
//!
//! A declaration names an object plus the files it is glued together from:
//!
//! ```text
//! %class widget('widget.klc','widget.klh','widget.klt')
//! ```
//!
//! The type file is optional. Each detected declaration is replaced by a
//! placeholder marker so the expanded header can be injected back at the
//! same spot once its own preprocessing has finished.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;

// One declaration per line, anchored at line start; nested matches are not
// part of the supported grammar.
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%class\s+(\w+)\s*\(\s*'([^']+)'\s*,\s*'([^']+)'\s*(?:,\s*'([^']+)'\s*)?\)")
        .expect("class pattern")
});

/// One detected pseudo-constructor declaration.
///
/// `seq` is assigned in declaration order, starting at 1 for each scan, and
/// forms the placeholder key together with `object`. Object names must be
/// unique across a run: the re-injection pattern is an alternation over all
/// known names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub seq: u32,
    pub object: String,
    pub class_file: String,
    pub header_file: String,
    pub type_file: Option<String>,
}

impl ClassDecl {
    /// The placeholder line written in place of the declaration.
    pub fn marker(&self) -> String {
        format!("-- INCLUDE_MARKER {}:{}:1", self.seq, self.object)
    }

    /// File name of the synthesized body unit.
    pub fn body_unit_name(&self) -> String {
        format!("{}.kl", self.object)
    }

    /// File name of the synthesized header unit. The `_h` stem suffix is
    /// how the re-injector finds the expanded unit again.
    pub fn header_unit_name(&self) -> String {
        format!("{}_h.kl", self.object)
    }
}

/// Scans `input` line by line, replacing every `%class` declaration with
/// its placeholder marker, and writes the result to `output`. Returns the
/// declarations in source order.
pub fn scan_classes(input: &Path, output: &Path) -> Result<Vec<ClassDecl>> {
    let text = fs::read_to_string(input)?;
    let mut decls: Vec<ClassDecl> = Vec::new();
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        if let Some(caps) = CLASS_RE.captures(line) {
            let decl = ClassDecl {
                seq: decls.len() as u32 + 1,
                object: caps[1].to_string(),
                class_file: caps[2].to_string(),
                header_file: caps[3].to_string(),
                type_file: caps.get(4).map(|m| m.as_str().to_string()),
            };
            out.push_str(&decl.marker());
            decls.push(decl);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    fs::write(output, out)?;
    Ok(decls)
}

/// Synthesizes the body unit: binds the `class_name` macro variable, pulls
/// in the type definition when present, then the class file itself.
pub fn synthesize_body(decl: &ClassDecl) -> String {
    synthesize_unit(decl, &decl.class_file)
}

/// Synthesizes the header unit, gluing the type definition to the header
/// file instead of the class body.
pub fn synthesize_header(decl: &ClassDecl) -> String {
    synthesize_unit(decl, &decl.header_file)
}

fn synthesize_unit(decl: &ClassDecl, include: &str) -> String {
    let mut unit = format!("%define class_name {}\n", decl.object);
    if let Some(type_file) = &decl.type_file {
        unit.push_str(&format!("%include {type_file}\n"));
    }
    unit.push_str(&format!("%include {include}\n"));
    unit
}
