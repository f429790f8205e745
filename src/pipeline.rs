//! Index generation driver.
//!
//! Coordinates the full run: plan → provision → per branch (fetch, collect,
//! build, record) → manifest. Branches are processed strictly one after
//! another because they share one working tree.
//!
//! Failure policy:
//! - a branch that cannot be fetched or yields no documents is skipped with
//!   a warning and contributes no manifest entry;
//! - provisioning, checkout, indexer and loader-patch failures abort the run.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::collect;
use crate::config::Config;
use crate::env::{RepoSource, RunPlan};
use crate::indexer;
use crate::manifest::{self, ManifestBuilder};
use crate::mirror::Workspace;
use crate::models::Manifest;
use crate::provision;

/// Directory name for a branch bundle: the branch as one URL path segment.
pub fn branch_dir_name(branch: &str) -> String {
    urlencoding::encode(branch).into_owned()
}

/// Public URL of a branch bundle.
pub fn index_path(public_base: &str, branch: &str) -> String {
    format!(
        "{}/{}/",
        public_base.trim_end_matches('/'),
        branch_dir_name(branch)
    )
}

/// Run the whole pipeline. Returns `None` without side effects when the
/// plan says this invocation should not build.
pub fn run(
    config: &Config,
    plan: &RunPlan,
    source: impl FnOnce() -> Result<RepoSource>,
    explicit_binary: Option<&Path>,
) -> Result<Option<Manifest>> {
    if !plan.should_run {
        info!(
            reason = plan.skip_reason.as_deref().unwrap_or("unknown"),
            "search index generation skipped"
        );
        return Ok(None);
    }

    let source = source()?;
    let binary = provision::ensure_binary(explicit_binary, &config.indexer, &config.cache_dir())?;
    let workspace = open_workspace(config, &source)?;

    let pipeline = Pipeline {
        config,
        whitelist: &plan.extension_whitelist,
        workspace: &workspace,
        binary,
    };

    let mut builder = ManifestBuilder::new();
    for branch in &plan.branches {
        builder = pipeline.process_branch(branch, builder)?;
    }

    if builder.is_empty() {
        warn!("no branch produced an index; writing an empty manifest");
    }
    let manifest = builder.finalize(&config.manifest_path())?;
    Ok(Some(manifest))
}

fn open_workspace(config: &Config, source: &RepoSource) -> Result<Workspace> {
    match source {
        RepoSource::Local(path) => Workspace::existing(path),
        RepoSource::Remote { owner, name, token } => Workspace::prepare(
            &config.repository.remote_base,
            owner,
            name,
            token.as_deref(),
        ),
    }
}

/// Per-run state shared by every branch step.
pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub whitelist: &'a BTreeSet<String>,
    pub workspace: &'a Workspace,
    pub binary: PathBuf,
}

impl Pipeline<'_> {
    /// Build one branch and return the accumulator with its entry added,
    /// or unchanged when the branch is skipped.
    pub fn process_branch(&self, branch: &str, builder: ManifestBuilder) -> Result<ManifestBuilder> {
        info!(branch, "processing branch");

        let Some(reference) = self.workspace.resolve_branch(branch) else {
            return Ok(builder);
        };

        let collection = collect::collect(
            self.workspace,
            &reference,
            branch,
            self.whitelist,
            self.config.collect.max_file_bytes,
        )?;
        if collection.documents.is_empty() {
            warn!(branch, "no documents collected, skipping branch");
            return Ok(builder);
        }

        let bundle_dir = self.config.output.dir.join(branch_dir_name(branch));
        indexer::build(&self.binary, &collection.documents, &bundle_dir)?;

        let entry = manifest::branch_entry(
            &bundle_dir,
            &index_path(&self.config.output.public_base, branch),
            collection.documents.len(),
        )?;
        info!(branch, hash = %entry.hash, files = entry.file_count, "branch indexed");
        Ok(builder.record_branch(branch, entry))
    }
}
