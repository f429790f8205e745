//! Manifest assembly, persistence, and verification.
//!
//! The manifest maps each built branch to its index bundle and the SHA-256
//! of the compiled artifact, which the client uses as a cache-busting key.

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::indexer::ARTIFACT_FILE;
use crate::models::{BranchEntry, Manifest, SCHEMA_VERSION};

/// Streamed SHA-256 of a file, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Describe the bundle in `bundle_dir` for the manifest.
pub fn branch_entry(bundle_dir: &Path, index_path: &str, file_count: usize) -> Result<BranchEntry> {
    let hash = hash_file(&bundle_dir.join(ARTIFACT_FILE))?;
    Ok(BranchEntry {
        index_path: index_path.to_string(),
        hash,
        file_count,
        generated_at: Utc::now(),
    })
}

/// Branch entries accumulated over a run.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    branches: BTreeMap<String, BranchEntry>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the entry for `branch`.
    pub fn record_branch(mut self, branch: &str, entry: BranchEntry) -> Self {
        self.branches.insert(branch.to_string(), entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn finish(self) -> Manifest {
        Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            branches: self.branches,
        }
    }

    /// Write the manifest as pretty-printed JSON, replacing any previous file.
    pub fn finalize(self, path: &Path) -> Result<Manifest> {
        let manifest = self.finish();
        write_manifest(&manifest, path)?;
        Ok(manifest)
    }
}

pub fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    info!(
        path = %path.display(),
        branches = manifest.branches.len(),
        "manifest written"
    );
    Ok(())
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest: Manifest =
        serde_json::from_str(&content).with_context(|| "Failed to parse manifest")?;
    if manifest.schema_version != SCHEMA_VERSION {
        anyhow::bail!(
            "Unsupported manifest schema '{}', expected '{}'",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

/// A branch whose artifact no longer matches its recorded hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub branch: String,
    pub expected: String,
    /// `None` when the artifact is missing or unreadable.
    pub actual: Option<String>,
}

/// Re-hash every artifact named by the manifest at `manifest_path`.
///
/// Bundles are looked up as `<output_dir>/<encoded branch>/` artifacts.
pub fn verify_manifest(manifest_path: &Path, output_dir: &Path) -> Result<Vec<Mismatch>> {
    let manifest = load_manifest(manifest_path)?;
    let mut mismatches = Vec::new();
    for (branch, entry) in &manifest.branches {
        let artifact = output_dir
            .join(crate::pipeline::branch_dir_name(branch))
            .join(ARTIFACT_FILE);
        let actual = hash_file(&artifact).ok();
        if actual.as_deref() != Some(entry.hash.as_str()) {
            mismatches.push(Mismatch {
                branch: branch.clone(),
                expected: entry.hash.clone(),
                actual,
            });
        }
    }
    Ok(mismatches)
}
