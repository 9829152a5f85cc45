//! The persisted build manifest: which artifacts a source generated.
//!
//! The manifest is a YAML mapping of source kind to parent artifact to the
//! set of child artifacts built alongside it. Updates union into what is
//! already recorded, so a parent rebuilt with different children across
//! invocations keeps the superset. Concurrent build workers may hit the
//! file mid-write; reads retry a bounded number of times before giving up.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KppError, Result};

/// Default manifest file name, written to the invoking directory.
pub const MANIFEST_FILENAME: &str = ".man_log";

/// Fixed source extension -> build artifact extension table.
pub const EXT_MAP: &[(&str, &str)] = &[
    (".kl", ".pc"),
    (".vr", ".vr"),
    (".ftx", ".tx"),
    (".utx", ".tx"),
];

/// The three fixed source kinds a manifest entry can fall under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Source,
    Library,
    Test,
}

impl SourceKind {
    pub fn key(self) -> &'static str {
        match self {
            SourceKind::Source => "source",
            SourceKind::Library => "library",
            SourceKind::Test => "test",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "source" => Ok(SourceKind::Source),
            "library" => Ok(SourceKind::Library),
            "test" => Ok(SourceKind::Test),
            other => Err(format!("unknown source kind '{other}'")),
        }
    }
}

type ManifestMap = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

#[derive(Debug, Clone)]
pub struct ManifestOptions {
    /// How often an unreadable (locked or mid-write) manifest is retried.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        ManifestOptions {
            retries: 5,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Translates a source file name to its build artifact name per [`EXT_MAP`];
/// names with an unlisted extension pass through unchanged.
pub fn translate_extension(name: &str) -> String {
    if let Some(dot) = name.rfind('.') {
        let ext = name[dot..].to_ascii_lowercase();
        for (src, dst) in EXT_MAP {
            if *src == ext {
                return format!("{}{dst}", &name[..dot]);
            }
        }
    }
    name.to_string()
}

/// Records `children` as artifacts generated while building `parent`,
/// merging into whatever the manifest already holds for it.
pub fn update_manifest(
    path: &Path,
    kind: SourceKind,
    parent: &str,
    children: &[String],
    opts: &ManifestOptions,
) -> Result<()> {
    let mut manifest = load_with_retry(path, opts)?;

    let parent = translate_extension(parent);
    let entry = manifest
        .entry(kind.key().to_string())
        .or_default()
        .entry(parent.clone())
        .or_default();
    for child in children {
        let child = translate_extension(child);
        if child != parent {
            entry.insert(child);
        }
    }

    debug!("manifest {}: {} now has {} children", path.display(), parent, entry.len());
    fs::write(path, serde_yaml::to_string(&manifest)?)?;
    Ok(())
}

fn load_with_retry(path: &Path, opts: &ManifestOptions) -> Result<ManifestMap> {
    if !path.exists() {
        return Ok(ManifestMap::new());
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        if let Ok(text) = fs::read_to_string(path) {
            if text.trim().is_empty() {
                return Ok(ManifestMap::new());
            }
            if let Ok(manifest) = serde_yaml::from_str(&text) {
                return Ok(manifest);
            }
        }
        // a locked or half-written file is transient; a manifest that never
        // parses is not
        if attempts > opts.retries {
            return Err(KppError::ManifestContention {
                path: path.to_path_buf(),
                attempts,
            });
        }
        std::thread::sleep(opts.retry_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fast_opts() -> ManifestOptions {
        ManifestOptions {
            retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn children_of(path: &Path, kind: &str, parent: &str) -> Vec<String> {
        let manifest: ManifestMap =
            serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        manifest[kind][parent].iter().cloned().collect()
    }

    #[test]
    fn extensions_are_translated() {
        assert_eq!(translate_extension("prog.kl"), "prog.pc");
        assert_eq!(translate_extension("vars.vr"), "vars.vr");
        assert_eq!(translate_extension("form.ftx"), "form.tx");
        assert_eq!(translate_extension("dict.utx"), "dict.tx");
        assert_eq!(translate_extension("notes.txt"), "notes.txt");
        assert_eq!(translate_extension("noext"), "noext");
    }

    #[test]
    fn update_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);
        let children = vec!["widget.kl".to_string(), "vars.vr".to_string()];

        update_manifest(&path, SourceKind::Source, "prog.kl", &children, &fast_opts()).unwrap();
        let once = children_of(&path, "source", "prog.pc");
        update_manifest(&path, SourceKind::Source, "prog.kl", &children, &fast_opts()).unwrap();
        let twice = children_of(&path, "source", "prog.pc");

        assert_eq!(once, twice);
        assert_eq!(once, vec!["vars.vr".to_string(), "widget.pc".to_string()]);
    }

    #[test]
    fn updates_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);

        update_manifest(
            &path,
            SourceKind::Library,
            "lib.kl",
            &["a.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();
        update_manifest(
            &path,
            SourceKind::Library,
            "lib.kl",
            &["b.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();

        assert_eq!(
            children_of(&path, "library", "lib.pc"),
            vec!["a.pc".to_string(), "b.pc".to_string()]
        );
    }

    #[test]
    fn parent_is_never_its_own_child() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);

        update_manifest(
            &path,
            SourceKind::Source,
            "prog.kl",
            &["prog.kl".to_string(), "other.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();

        assert_eq!(
            children_of(&path, "source", "prog.pc"),
            vec!["other.pc".to_string()]
        );
    }

    #[test]
    fn categories_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);

        update_manifest(
            &path,
            SourceKind::Source,
            "prog.kl",
            &["a.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();
        update_manifest(
            &path,
            SourceKind::Test,
            "prog.kl",
            &["b.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();

        assert_eq!(children_of(&path, "source", "prog.pc"), vec!["a.pc"]);
        assert_eq!(children_of(&path, "test", "prog.pc"), vec!["b.pc"]);
    }

    #[test]
    fn unparseable_manifest_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);
        fs::write(&path, "category: [unterminated").unwrap();

        let err = update_manifest(
            &path,
            SourceKind::Source,
            "prog.kl",
            &[],
            &fast_opts(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KppError::ManifestContention { attempts: 3, .. }
        ));
    }

    #[test]
    fn empty_manifest_file_reads_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);
        fs::write(&path, "").unwrap();

        update_manifest(
            &path,
            SourceKind::Source,
            "prog.kl",
            &["a.kl".to_string()],
            &fast_opts(),
        )
        .unwrap();
        assert_eq!(children_of(&path, "source", "prog.pc"), vec!["a.pc"]);
    }
}
