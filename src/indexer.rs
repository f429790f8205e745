//! External indexer invocation.
//!
//! Serializes a branch's documents to a JSON payload, runs
//! `docfind <payload> <output_dir>`, and patches the generated loader so its
//! initializer accepts the positional argument the site runtime passes.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::DocumentRecord;
use crate::process;

/// Loader script emitted by the indexer.
pub const LOADER_FILE: &str = "docfind.js";
/// Compiled search artifact emitted by the indexer; its hash keys the manifest.
pub const ARTIFACT_FILE: &str = "docfind_bg.wasm";

/// Initializer signature as emitted by the published indexer.
const LOADER_NEEDLE: &str = "async function __wbg_init(module_or_path) {";
/// Same initializer, also accepting the legacy positional argument.
const LOADER_REPLACEMENT: &str = "async function __wbg_init(module_or_path, ..._legacy) { \
if (module_or_path === undefined && _legacy.length) module_or_path = _legacy[0];";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("loader {0} was not produced by the indexer")]
    MissingLoader(String),
    #[error("loader {0} does not contain the expected initializer signature; the indexer output format changed")]
    SignatureNotFound(String),
    #[error("failed to rewrite loader {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of applying the loader patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyPatched,
}

/// Produce the index bundle for `documents` in `output_dir`.
///
/// The directory is emptied first so no artifact of a previous run
/// survives into the new bundle.
pub fn build(binary: &Path, documents: &[DocumentRecord], output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        std::fs::remove_dir_all(output_dir)
            .with_context(|| format!("Failed to clear {}", output_dir.display()))?;
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut payload = tempfile::Builder::new()
        .prefix("docfind-payload-")
        .suffix(".json")
        .tempfile()
        .context("Failed to create payload file")?;
    serde_json::to_writer(&mut payload, documents).context("Failed to serialize documents")?;
    payload.flush()?;
    debug!(path = %payload.path().display(), documents = documents.len(), "wrote payload");

    let output = process::run(Command::new(binary).arg(payload.path()).arg(output_dir))
        .with_context(|| format!("Indexer failed for {}", output_dir.display()))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(output = %stdout.trim(), "indexer output");
    }

    let outcome = patch_loader(&output_dir.join(LOADER_FILE))?;
    info!(dir = %output_dir.display(), patch = ?outcome, "index bundle written");
    Ok(())
}

/// Rewrite the initializer signature in the generated loader.
///
/// A loader that already carries the replacement is left untouched; one that
/// carries neither form is an error.
pub fn patch_loader(path: &Path) -> Result<PatchOutcome, PatchError> {
    let display = path.display().to_string();
    if !path.is_file() {
        return Err(PatchError::MissingLoader(display));
    }
    let source = std::fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: display.clone(),
        source,
    })?;

    if source.contains(LOADER_REPLACEMENT) {
        return Ok(PatchOutcome::AlreadyPatched);
    }
    if !source.contains(LOADER_NEEDLE) {
        return Err(PatchError::SignatureNotFound(display));
    }

    let patched = source.replacen(LOADER_NEEDLE, LOADER_REPLACEMENT, 1);
    std::fs::write(path, patched).map_err(|source| PatchError::Io {
        path: display,
        source,
    })?;
    Ok(PatchOutcome::Applied)
}
