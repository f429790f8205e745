//! Branch retrieval without a full clone.
//!
//! A [`Workspace`] is one git working directory reused for every branch of
//! a run. Remote workspaces are created in a temporary directory, fetch each
//! branch shallowly into its own remote-tracking ref, and are deleted when
//! the workspace is dropped. Local workspaces borrow an existing checkout
//! and resolve branches from refs it already has.
//!
//! Branches are checked out one at a time with a forced detached checkout,
//! so the working tree always reflects exactly one branch.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

use crate::process;

/// Username GitHub accepts alongside a token in basic-auth clone URLs.
const TOKEN_USER: &str = "x-access-token";

pub struct Workspace {
    root: PathBuf,
    origin: Origin,
    /// Held for its `Drop`: removes the temporary checkout.
    _temp: Option<TempDir>,
}

enum Origin {
    /// Token spellings that may surface in git's stderr.
    Remote { secrets: Vec<String> },
    Local,
}

impl Workspace {
    /// Create an empty repository in a temporary directory with `origin`
    /// pointing at `<remote_base>/<owner>/<name>.git`.
    pub fn prepare(remote_base: &str, owner: &str, name: &str, token: Option<&str>) -> Result<Self> {
        let url = remote_url(remote_base, owner, name, token)?;
        let secrets = token.map(secret_forms).unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix("docfind-workspace-")
            .tempdir()
            .context("Failed to create workspace directory")?;
        let root = temp.path().to_path_buf();

        process::git(&root, &["init", "--quiet"]).context("git init failed")?;
        process::git(&root, &["remote", "add", "origin", &url])
            .map_err(|e| e.redact(&secrets))
            .context("git remote add failed")?;

        info!(repo = %format!("{}/{}", owner, name), path = %root.display(), "prepared workspace");

        Ok(Self {
            root,
            origin: Origin::Remote { secrets },
            _temp: Some(temp),
        })
    }

    /// Borrow an existing repository. It is checked out in place but never deleted.
    pub fn existing(path: &Path) -> Result<Self> {
        process::git(path, &["rev-parse", "--git-dir"])
            .with_context(|| format!("Not a git repository: {}", path.display()))?;
        warn!(
            path = %path.display(),
            "using existing repository; its working tree will be checked out detached per branch"
        );
        Ok(Self {
            root: path.to_path_buf(),
            origin: Origin::Local,
            _temp: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Produce a ref for `branch`, or `None` when the branch cannot be
    /// obtained. Callers skip the branch on `None`.
    pub fn resolve_branch(&self, branch: &str) -> Option<String> {
        if branch.starts_with('-') {
            warn!(branch, "refusing branch name that looks like an option");
            return None;
        }
        match &self.origin {
            Origin::Remote { secrets } => self.fetch_branch(branch, secrets),
            Origin::Local => self.resolve_local(branch),
        }
    }

    /// Shallow, tag-less fetch of one branch into `refs/remotes/origin/<branch>`.
    fn fetch_branch(&self, branch: &str, secrets: &[String]) -> Option<String> {
        let tracking = format!("refs/remotes/origin/{}", branch);
        let refspec = format!("+refs/heads/{}:{}", branch, tracking);
        match process::git(
            &self.root,
            &["fetch", "--depth=1", "--no-tags", "--quiet", "origin", &refspec],
        ) {
            Ok(_) => {
                debug!(branch, "fetched");
                Some(tracking)
            }
            Err(e) => {
                warn!(branch, error = %e.redact(secrets), "fetch failed, skipping branch");
                None
            }
        }
    }

    /// First local spelling of `branch` that resolves to a commit.
    fn resolve_local(&self, branch: &str) -> Option<String> {
        let candidates = [
            branch.to_string(),
            format!("refs/heads/{}", branch),
            format!("refs/remotes/origin/{}", branch),
        ];
        let found = candidates.into_iter().find(|candidate| {
            let spec = format!("{}^{{commit}}", candidate);
            process::git(&self.root, &["rev-parse", "--verify", "--quiet", &spec]).is_ok()
        });
        if found.is_none() {
            warn!(branch, "branch not found in local repository, skipping");
        }
        found
    }

    /// Forced, detached checkout of `reference` into the shared working tree.
    pub fn checkout(&self, reference: &str) -> Result<()> {
        process::git(
            &self.root,
            &["checkout", "--quiet", "--force", "--detach", reference],
        )
        .with_context(|| format!("git checkout {} failed", reference))?;
        Ok(())
    }
}

/// Clone URL for `owner/name` under `remote_base`, with `token` embedded as
/// basic-auth credentials for http(s) remotes.
pub fn remote_url(remote_base: &str, owner: &str, name: &str, token: Option<&str>) -> Result<String> {
    if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
        bail!("Invalid repository identity: '{}/{}'", owner, name);
    }
    let raw = format!("{}/{}/{}.git", remote_base.trim_end_matches('/'), owner, name);
    let mut url = Url::parse(&raw).with_context(|| format!("Invalid remote URL: {}", raw))?;

    if let Some(token) = token {
        if matches!(url.scheme(), "http" | "https") {
            url.set_username(TOKEN_USER)
                .map_err(|_| anyhow::anyhow!("Remote URL cannot carry credentials"))?;
            url.set_password(Some(token))
                .map_err(|_| anyhow::anyhow!("Remote URL cannot carry credentials"))?;
        }
    }

    Ok(url.to_string())
}

/// The raw token plus the percent-encoded form it takes inside a URL.
fn secret_forms(token: &str) -> Vec<String> {
    let mut forms = vec![token.to_string()];
    if let Ok(mut carrier) = Url::parse("http://user@localhost/") {
        if carrier.set_password(Some(token)).is_ok() {
            if let Some(encoded) = carrier.password().filter(|p| *p != token) {
                forms.push(encoded.to_string());
            }
        }
    }
    forms
}
