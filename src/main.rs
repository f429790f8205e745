//! # docfind-build CLI
//!
//! Builds per-branch static search indexes for a git repository and the
//! manifest that describes them.
//!
//! ## Usage
//!
//! ```bash
//! docfind-build --config ./docfind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docfind-build generate` | Run the pipeline if the environment enables it |
//! | `docfind-build plan` | Print the resolved run plan without side effects |
//! | `docfind-build provision` | Ensure the indexer binary and print its path |
//! | `docfind-build verify` | Re-hash artifacts against the manifest |
//!
//! Logs go to stderr (`RUST_LOG` controls verbosity); stdout carries only
//! command results.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docfind_build::config;
use docfind_build::env::{self, ExecutionContext, RawInputs};
use docfind_build::{manifest, pipeline, provision};

/// Per-branch static search index generator.
#[derive(Parser)]
#[command(
    name = "docfind-build",
    about = "Build per-branch static search indexes and their manifest",
    version
)]
struct Cli {
    /// Path to the optional configuration file (TOML).
    ///
    /// Defaults to `./docfind.toml`; when the file does not exist all
    /// settings take their defaults.
    #[arg(long, global = true, default_value = "./docfind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate indexes for every configured branch and write the manifest.
    ///
    /// Does nothing (and exits successfully) unless ENABLED_SEARCH_INDEX is
    /// true and SEARCH_INDEX_GENERATION_MODE matches the execution context.
    Generate {
        /// Override execution context detection: `build` or `action`.
        #[arg(long)]
        context: Option<String>,

        /// Pre-installed indexer binary (overrides DOCFIND_BIN).
        #[arg(long)]
        bin: Option<PathBuf>,

        /// Already checked-out repository (overrides DOCFIND_REPO_PATH).
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Print the resolved run plan.
    Plan {
        /// Override execution context detection: `build` or `action`.
        #[arg(long)]
        context: Option<String>,
    },

    /// Ensure the indexer binary is available and print its path.
    Provision {
        /// Pre-installed indexer binary (overrides DOCFIND_BIN).
        #[arg(long)]
        bin: Option<PathBuf>,
    },

    /// Check every artifact in the manifest against its recorded hash.
    Verify,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn resolve_context(raw: Option<&str>, inputs: &RawInputs) -> Result<ExecutionContext> {
    match raw {
        Some(raw) => ExecutionContext::parse(raw),
        None => Ok(ExecutionContext::detect(inputs)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;
    let mut inputs = RawInputs::from_env();

    match cli.command {
        Commands::Generate { context, bin, repo } => {
            if bin.is_some() {
                inputs.binary_path = bin;
            }
            if repo.is_some() {
                inputs.repo_path = repo;
            }
            let context = resolve_context(context.as_deref(), &inputs)?;
            let plan = env::resolve_plan(&inputs, context)?;
            let result = pipeline::run(
                &cfg,
                &plan,
                || env::repo_source(&inputs),
                inputs.binary_path.as_deref(),
            )?;
            if let Some(manifest) = result {
                println!(
                    "generated {} branch index(es) -> {}",
                    manifest.branches.len(),
                    cfg.manifest_path().display()
                );
            }
        }
        Commands::Plan { context } => {
            let context = resolve_context(context.as_deref(), &inputs)?;
            let plan = env::resolve_plan(&inputs, context)?;
            println!("run: {}", plan.should_run);
            if let Some(reason) = &plan.skip_reason {
                println!("  reason: {}", reason);
            }
            println!("  mode: {}", plan.mode);
            println!("  context: {}", plan.context);
            println!("  branches: {}", plan.branches.join(", "));
            println!("  extensions: {}", plan.extension_whitelist.len());
            println!("  output: {}", cfg.output.dir.display());
        }
        Commands::Provision { bin } => {
            let explicit = bin.or(inputs.binary_path);
            let path = provision::ensure_binary(explicit.as_deref(), &cfg.indexer, &cfg.cache_dir())?;
            println!("{}", path.display());
        }
        Commands::Verify => {
            let mismatches = manifest::verify_manifest(&cfg.manifest_path(), &cfg.output.dir)?;
            if !mismatches.is_empty() {
                for m in &mismatches {
                    println!(
                        "{}: expected {} got {}",
                        m.branch,
                        m.expected,
                        m.actual.as_deref().unwrap_or("<missing>")
                    );
                }
                anyhow::bail!("{} branch artifact(s) do not match the manifest", mismatches.len());
            }
            println!("ok");
        }
    }

    Ok(())
}
