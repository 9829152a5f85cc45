//! Wrapper around FANUC's command-line KAREL translator.
//!
//! Sources are run through the preprocessing pipeline in a scoped build
//! directory; the translator then gets the expanded files, with its output
//! relayed as if it had compiled the original source in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kpp_core::deps::DepOptions;
use kpp_core::gpp::resolve_tool;
use kpp_core::manifest::{self, ManifestOptions, SourceKind};
use kpp_core::{BuildDir, GppConfig, KppError, Pipeline, deps, includes, translator};

const KTRANS_BIN_NAME: &str = "ktrans.exe";
const GPP_BIN_NAME: &str = "gpp.exe";
const KL_SUFFIX: &str = ".kl";
const PCODE_SUFFIX: &str = ".pc";

#[derive(Parser)]
#[command(name = "ktransw", version)]
#[command(about = "A wrapper around Fanuc Robotics' command-line Karel translator that adds \
a C-like preprocessor, support for multiple include directories, conditional \
compilation, include guards, macros and class composition")]
#[command(after_help = "Example invocation:\n\n  \
ktransw /IC:\\foo\\bar\\include /IC:\\baz\\include C:\\my_prog.kl /config robot.ini\n\n\
All arguments using forward-slash notation (except '/I') are passed on to ktrans.")]
struct Cli {
    /// Print (lots of) debug information
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print nothing, except when ktrans encounters an error
    #[arg(short, long)]
    quiet: bool,

    /// Do nothing, except checking parameters
    #[arg(short, long)]
    dry_run: bool,

    /// Preprocess only; do not translate
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Output GCC compatible dependency info
    #[arg(short = 'M')]
    dep_output: bool,

    /// Like '-M', but don't include system headers
    #[arg(long = "MM")]
    ignore_syshdrs: bool,

    /// Change the target of the rule emitted by dependency generation
    /// (default: base name of source, with object extension (.pc))
    #[arg(long = "MT", value_name = "target")]
    dep_target: Option<String>,

    /// When used with -M or -MM, specifies a file to write the dependencies to
    #[arg(long = "MF", value_name = "file")]
    dep_fname: Option<PathBuf>,

    /// Assume missing header files are generated files and add them to the
    /// dependency list without raising an error
    #[arg(long = "MG")]
    ignore_missing_hdrs: bool,

    /// Add a phony target for each dependency to support renaming
    /// dependencies without having to update the Makefile to match
    #[arg(long = "MP")]
    add_phony_targets: bool,

    /// Don't delete the temporary build directory on exit
    #[arg(short = 'k', long)]
    keep_build_dir: bool,

    /// Location of ktrans (by default ktransw assumes it's on the PATH)
    #[arg(long, value_name = "PATH")]
    ktrans: Option<PathBuf>,

    /// Location of gpp (by default ktransw assumes it's on the PATH)
    #[arg(long, value_name = "PATH")]
    gpp: Option<PathBuf>,

    /// Include paths (multiple allowed)
    #[arg(short = 'I', value_name = "PATH")]
    include_dirs: Vec<PathBuf>,

    /// User macro definitions (multiple allowed)
    #[arg(short = 'D', value_name = "NAME")]
    defines: Vec<String>,

    /// Record this run's generated artifacts in the build manifest
    #[arg(long)]
    manifest: bool,

    /// Manifest file to update
    #[arg(long, value_name = "PATH", default_value = manifest::MANIFEST_FILENAME)]
    manifest_file: PathBuf,

    /// Source kind the manifest entry is recorded under (source, library, test)
    #[arg(long, value_name = "KIND", default_value = "source")]
    manifest_kind: SourceKind,

    /// Arguments to pass on to ktrans. Use normal (forward-slash) notation here
    #[arg(value_name = "ARG")]
    args: Vec<String>,
}

/// Rewrites the legacy argument spellings in place: forward-slash include
/// flags (`/Idir`) and the single-dash dependency flags inherited from gcc
/// (`-MM`, `-MT`, ...). The program name at index 0 is left alone.
fn rewrite_legacy_args(argv: &mut [String]) {
    for arg in argv.iter_mut().skip(1) {
        if let Some(rest) = arg.strip_prefix("/I") {
            *arg = format!("-I{rest}");
        } else if matches!(arg.as_str(), "-MM" | "-MT" | "-MF" | "-MG" | "-MP") {
            *arg = format!("-{arg}");
        }
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let log_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run() -> Result<i32> {
    let mut argv: Vec<String> = std::env::args().collect();
    rewrite_legacy_args(&mut argv);
    let cli = Cli::parse_from(argv);

    init_logging(cli.quiet, cli.verbose);
    debug!("ktransw v{}", env!("CARGO_PKG_VERSION"));

    // anything that is neither an option nor a version identifier is a
    // (potentially relative) path; ktrans wants those absolute
    let ktrans_args = translator::absolutize_args(&cli.args)?;

    // ktrans only considers files with the .kl extension
    let kl_files: Vec<&String> = ktrans_args
        .iter()
        .filter(|arg| arg.ends_with(KL_SUFFIX))
        .collect();

    // no translation unit on the command line means there is nothing to
    // preprocess: hand everything to ktrans as-is
    let Some(kl_file) = kl_files.first().map(|s| s.to_string()) else {
        println!("ktransw v{}", env!("CARGO_PKG_VERSION"));
        let ktrans = resolve_tool(cli.ktrans.as_deref(), KTRANS_BIN_NAME)?;
        let status = Command::new(&ktrans)
            .args(&ktrans_args)
            .status()
            .with_context(|| format!("failed to run {}", ktrans.display()))?;
        return Ok(status.code().unwrap_or(1));
    };

    if cli.dry_run {
        debug!("not calling ktrans or gpp: dry run requested");
        return Ok(0);
    }

    let mut build = BuildDir::create("ktransw-", cli.keep_build_dir)?;
    let gpp = GppConfig {
        bin: resolve_tool(cli.gpp.as_deref(), GPP_BIN_NAME)?,
        include_dirs: cli.include_dirs.clone(),
        defines: cli.defines.clone(),
    };

    match drive(&cli, &gpp, build.path(), &kl_file, &ktrans_args) {
        Ok(code) => Ok(code),
        Err(err) => {
            // keep whatever was produced so the failure can be inspected
            build.retain();
            debug!("build directory kept for diagnosis: {}", build.path().display());
            Err(err)
        }
    }
}

/// Preprocess, then dependency emission, manifest update and translation,
/// per the requested flags.
fn drive(
    cli: &Cli,
    gpp: &GppConfig,
    build_dir: &Path,
    kl_file: &str,
    ktrans_args: &[String],
) -> Result<i32> {
    debug!("starting pre-processing of {kl_file}");
    let mut pipeline = Pipeline::new(gpp, build_dir);
    let final_file = pipeline.run_source(Path::new(kl_file))?;

    if cli.dep_output || cli.ignore_syshdrs {
        emit_dependencies(cli, kl_file, &final_file, &gpp.include_dirs)?;
    }

    if cli.preprocess_only {
        print!("{}", fs::read_to_string(&final_file)?);
        return Ok(0);
    }

    if cli.manifest {
        update_manifest(cli, kl_file, &pipeline)?;
    }

    translate_outputs(cli, kl_file, &pipeline, build_dir, ktrans_args)
}

/// Scans the final expansion for its include trace and writes the
/// dependency rule to the requested file, or stdout.
fn emit_dependencies(
    cli: &Cli,
    kl_file: &str,
    final_file: &Path,
    include_dirs: &[PathBuf],
) -> Result<()> {
    let trace = includes::scan_includes_file(final_file)?;
    debug!("found {} include(s)", trace.len());

    let base = source_base_name(kl_file);
    let opts = DepOptions {
        target: cli
            .dep_target
            .clone()
            .unwrap_or_else(|| format!("{base}{PCODE_SUFFIX}")),
        ignore_system_headers: cli.ignore_syshdrs,
        ignore_missing: cli.ignore_missing_hdrs,
        phony_targets: cli.add_phony_targets,
    };

    let dep_lines = deps::emit_depfile(&trace, include_dirs, &opts)?;
    match &cli.dep_fname {
        Some(path) => fs::write(path, dep_lines)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{dep_lines}"),
    }
    Ok(())
}

fn update_manifest(cli: &Cli, kl_file: &str, pipeline: &Pipeline) -> Result<()> {
    let parent = source_file_name(kl_file);
    let children: Vec<String> = pipeline
        .ctx
        .outputs
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .map(str::to_owned)
        .collect();

    manifest::update_manifest(
        &cli.manifest_file,
        cli.manifest_kind,
        &parent,
        &children,
        &ManifestOptions::default(),
    )?;
    Ok(())
}

/// Feeds every produced file to ktrans, in append order, substituting the
/// original source argument with the expanded file. Output is relayed with
/// build-directory paths remapped to the source's own directory.
fn translate_outputs(
    cli: &Cli,
    kl_file: &str,
    pipeline: &Pipeline,
    build_dir: &Path,
    ktrans_args: &[String],
) -> Result<i32> {
    let ktrans = resolve_tool(cli.ktrans.as_deref(), KTRANS_BIN_NAME)?;
    let source_dir = Path::new(kl_file)
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut code = 0;
    for produced in &pipeline.ctx.outputs {
        let args = translator::substitute_source(ktrans_args, kl_file, produced);
        debug!("starting ktrans for {}", produced.display());
        let out = translator::run_tool(&ktrans, &args, None)?;

        if !out.success() || !cli.quiet || cli.verbose > 0 {
            println!("{}", translator::remap_output(&out.text, build_dir, &source_dir));
        }

        code = out.code;
        if !out.success() {
            break;
        }
    }
    Ok(code)
}

fn source_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned())
}

fn source_base_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned())
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "ktransw: fatal error:".red());
            err.downcast_ref::<KppError>().map_or(1, KppError::exit_code)
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewritten(args: &[&str]) -> Vec<String> {
        let mut argv: Vec<String> = args.iter().map(ToString::to_string).collect();
        rewrite_legacy_args(&mut argv);
        argv
    }

    #[test]
    fn forward_slash_includes_are_rewritten() {
        assert_eq!(
            rewritten(&["ktransw", "/IC:\\foo", "prog.kl", "/config"]),
            vec!["ktransw", "-IC:\\foo", "prog.kl", "/config"]
        );
    }

    #[test]
    fn gcc_style_dep_flags_become_long_options() {
        assert_eq!(
            rewritten(&["ktransw", "-MM", "-MT", "t.pc", "-MF", "out.d", "-M"]),
            vec!["ktransw", "--MM", "--MT", "t.pc", "--MF", "out.d", "-M"]
        );
    }

    #[test]
    fn program_name_is_left_alone() {
        assert_eq!(rewritten(&["/Installed/ktransw"]), vec!["/Installed/ktransw"]);
    }

    #[test]
    fn cli_parses_mixed_arguments() {
        let mut argv: Vec<String> = [
            "ktransw", "-q", "/I/inc/a", "-I", "/inc/b", "-MM", "--MF", "deps.d",
            "prog.kl", "/config", "robot.ini",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        rewrite_legacy_args(&mut argv);

        let cli = Cli::parse_from(argv);
        assert!(cli.quiet);
        assert!(cli.ignore_syshdrs);
        assert_eq!(cli.include_dirs, vec![PathBuf::from("/inc/a"), PathBuf::from("/inc/b")]);
        assert_eq!(cli.dep_fname.as_deref(), Some(Path::new("deps.d")));
        assert_eq!(cli.args, vec!["prog.kl", "/config", "robot.ini"]);
    }
}
