//! Wrapper around FANUC's kcdict dictionary compressor.
//!
//! Dictionary sources (`.ftx` form files, `.utx` text dictionaries) get two
//! gpp passes before compression; the compressed dictionary and any
//! generated variable files are copied back out of the build directory and
//! recorded in the build manifest.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kpp_core::gpp::resolve_tool;
use kpp_core::manifest::{self, ManifestOptions, SourceKind};
use kpp_core::{BuildDir, GppConfig, KppError, textops, translator};

const KCDICT_BIN_NAME: &str = "kcdict.exe";
const GPP_BIN_NAME: &str = "gpp.exe";
const FORM_SUFFIX: &str = ".ftx";
const DICT_SUFFIX: &str = ".utx";
const COMPRESSED_SUFFIX: &str = ".tx";

#[derive(Parser)]
#[command(name = "kcdictw", version)]
#[command(about = "A wrapper around FANUC's kcdict dictionary compressor with gpp \
preprocessing and build manifest logging")]
#[command(after_help = "Usage example:\n\n  \
kcdictw <name>.utx <output_name>.tx /IC:\\baz\\include /config robot.ini")]
struct Cli {
    /// Print (lots of) debug information
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print nothing, except when kcdict encounters an error
    #[arg(short, long)]
    quiet: bool,

    /// Don't delete the temporary build directory on exit
    #[arg(short = 'k', long)]
    keep_build_dir: bool,

    /// Preprocess only; do not compress
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Location of kcdict (by default kcdictw assumes it's on the PATH)
    #[arg(long, value_name = "PATH")]
    kcdict: Option<PathBuf>,

    /// Location of gpp (by default kcdictw assumes it's on the PATH)
    #[arg(long, value_name = "PATH")]
    gpp: Option<PathBuf>,

    /// Include paths (multiple allowed)
    #[arg(short = 'I', value_name = "PATH")]
    include_dirs: Vec<PathBuf>,

    /// Arguments to pass on to kcdict. Use normal (forward-slash) notation here
    #[arg(value_name = "ARG")]
    args: Vec<String>,
}

fn rewrite_legacy_args(argv: &mut [String]) {
    for arg in argv.iter_mut().skip(1) {
        if let Some(rest) = arg.strip_prefix("/I") {
            *arg = format!("-I{rest}");
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
    debug!("kcdictw v{}", env!("CARGO_PKG_VERSION"));

    let Some(dict_file) = cli
        .args
        .iter()
        .find(|arg| arg.ends_with(FORM_SUFFIX) || arg.ends_with(DICT_SUFFIX))
        .cloned()
    else {
        anyhow::bail!("no {FORM_SUFFIX} or {DICT_SUFFIX} input file given");
    };

    let base = Path::new(&dict_file)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .with_context(|| format!("unusable input file name: {dict_file}"))?;

    let mut build = BuildDir::create("kcdictw-", cli.keep_build_dir)?;
    let gpp = GppConfig {
        bin: resolve_tool(cli.gpp.as_deref(), GPP_BIN_NAME)?,
        include_dirs: cli.include_dirs.clone(),
        defines: Vec::new(),
    };

    match drive(&cli, &gpp, build.path(), &dict_file, &base) {
        Ok(code) => Ok(code),
        Err(err) => {
            // keep whatever was produced so the failure can be inspected
            build.retain();
            debug!("build directory kept for diagnosis: {}", build.path().display());
            Err(err)
        }
    }
}

fn drive(
    cli: &Cli,
    gpp: &GppConfig,
    build_dir: &Path,
    dict_file: &str,
    base: &str,
) -> Result<i32> {
    // two plain passes: expand, compact, expand again
    let pre_file = build_dir.join(format!("pre-{base}"));
    let final_file = build_dir.join(base);
    gpp.run_pass(Path::new(dict_file), &pre_file)?;
    textops::compact_blank_lines(&pre_file)?;
    gpp.run_pass(&pre_file, &final_file)?;

    // the karel programs accompanying a form file land in the include
    // folder of the repository the source lives in
    let source_abs = std::path::absolute(dict_file)?;
    let kl_dir = cli.include_dirs.iter().find(|inc| {
        std::path::absolute(inc)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .is_some_and(|parent| source_abs.starts_with(&parent))
    });
    let Some(kl_dir) = kl_dir else {
        println!("No parent include directory detected. Add include folder.");
        return Ok(0);
    };

    if cli.preprocess_only {
        print!("{}", fs::read_to_string(&final_file)?);
        return Ok(0);
    }

    // compress from inside the build directory so relative output names
    // land next to the preprocessed source
    let kcdict = resolve_tool(cli.kcdict.as_deref(), KCDICT_BIN_NAME)?;
    let args = translator::substitute_source(&cli.args, dict_file, &final_file);
    let out = translator::run_tool(&kcdict, &args, Some(build_dir))?;

    let source_dir = source_abs
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if !out.success() || cli.verbose > 0 {
        println!("{}", translator::remap_output(&out.text, build_dir, &source_dir));
    }
    if !out.success() {
        return Ok(out.code);
    }

    copy_artifacts(build_dir, base, dict_file, kl_dir)?;
    Ok(out.code)
}

/// Copies the compressed dictionary and generated `.vr` files to the
/// invoking directory and the accompanying `.kl` programs to the include
/// folder, then records everything in the manifest.
fn copy_artifacts(build_dir: &Path, base: &str, dict_file: &str, kl_dir: &Path) -> Result<()> {
    let stem = Path::new(base)
        .file_stem()
        .map_or_else(|| base.to_string(), |s| s.to_string_lossy().into_owned());
    let target = build_dir.join(format!("{stem}{COMPRESSED_SUFFIX}"));
    let cwd = std::env::current_dir()?;

    fs::copy(&target, cwd.join(format!("{stem}{COMPRESSED_SUFFIX}")))
        .with_context(|| format!("compressor produced no {}", target.display()))?;

    let mut file_list: Vec<String> = vec![base.to_string()];
    for entry in fs::read_dir(build_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".vr") {
            fs::copy(entry.path(), cwd.join(&name))?;
            file_list.push(name);
        } else if name.to_ascii_lowercase().ends_with(".kl") {
            debug!("copying {name} to {}", kl_dir.display());
            fs::copy(entry.path(), kl_dir.join(&name))?;
        }
    }

    let parent = Path::new(dict_file)
        .file_name()
        .map_or_else(|| dict_file.to_string(), |n| n.to_string_lossy().into_owned());
    manifest::update_manifest(
        Path::new(manifest::MANIFEST_FILENAME),
        SourceKind::Source,
        &parent,
        &file_list,
        &ManifestOptions::default(),
    )?;
    Ok(())
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "kcdictw: fatal error:".red());
            err.downcast_ref::<KppError>().map_or(1, KppError::exit_code)
        }
    };
    std::process::exit(code);
}
