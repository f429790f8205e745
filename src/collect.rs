//! Document collection for one checked-out branch.
//!
//! Every git-tracked file becomes exactly one [`DocumentRecord`]. Content is
//! embedded only when the file passes two gates: its extension is
//! whitelisted and its size is within the limit, and then its first
//! [`BINARY_SNIFF_BYTES`] bytes contain no NUL. Everything else is indexed
//! by path alone.
//!
//! Symlinks are followed. A link whose target is missing or not a regular
//! file is skipped; one that resolves outside the repository is indexed by
//! path alone.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::env::normalize_extension;
use crate::mirror::Workspace;
use crate::models::DocumentRecord;
use crate::process;

/// How many leading bytes are inspected when classifying binary content.
pub const BINARY_SNIFF_BYTES: usize = 8000;

/// Documents collected for one branch.
#[derive(Debug, Default)]
pub struct Collection {
    pub documents: Vec<DocumentRecord>,
    /// Tracked paths dropped entirely (stat failure or not a regular file,
    /// after following symlinks).
    pub skipped: usize,
}

impl Collection {
    pub fn with_content(&self) -> usize {
        self.documents.iter().filter(|d| d.has_content()).count()
    }
}

/// Check out `reference` and collect documents for every tracked file.
pub fn collect(
    workspace: &Workspace,
    reference: &str,
    branch: &str,
    whitelist: &BTreeSet<String>,
    max_size: u64,
) -> Result<Collection> {
    workspace.checkout(reference)?;
    let root = workspace.path();
    let paths = tracked_files(root)?;

    let collector = FileCollector::new(root, branch, whitelist, max_size, |p: &Path| {
        std::fs::read(p)
    })?;
    let collection = collector.collect_paths(&paths);

    info!(
        branch,
        documents = collection.documents.len(),
        with_content = collection.with_content(),
        skipped = collection.skipped,
        "collected documents"
    );
    Ok(collection)
}

/// Paths tracked in the index of the current checkout, in git's order.
pub fn tracked_files(root: &Path) -> Result<Vec<String>> {
    let output = process::run(process::git_command(root).args(["ls-files", "-z"]))
        .context("git ls-files failed")?;
    Ok(output
        .stdout
        .split(|b| *b == 0)
        .filter(|p| !p.is_empty())
        .map(|p| String::from_utf8_lossy(p).to_string())
        .collect())
}

/// Per-branch gate state. `read` loads file contents once a file has
/// passed the stat and eligibility checks.
struct FileCollector<'a, R> {
    root: &'a Path,
    canonical_root: PathBuf,
    branch: &'a str,
    whitelist: &'a BTreeSet<String>,
    max_size: u64,
    read: R,
}

impl<'a, R> FileCollector<'a, R>
where
    R: Fn(&Path) -> io::Result<Vec<u8>>,
{
    fn new(
        root: &'a Path,
        branch: &'a str,
        whitelist: &'a BTreeSet<String>,
        max_size: u64,
        read: R,
    ) -> Result<Self> {
        let canonical_root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        Ok(Self {
            root,
            canonical_root,
            branch,
            whitelist,
            max_size,
            read,
        })
    }

    fn collect_paths(&self, paths: &[String]) -> Collection {
        let mut collection = Collection::default();
        for path in paths {
            match self.collect_file(path) {
                Some(doc) => collection.documents.push(doc),
                None => collection.skipped += 1,
            }
        }
        collection
    }

    /// Build the record for one tracked path, or `None` when it must be skipped.
    fn collect_file(&self, rel_path: &str) -> Option<DocumentRecord> {
        let full = self.root.join(rel_path);

        // Follows symlinks: a dangling link fails here and is skipped.
        let metadata = match std::fs::metadata(&full) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = rel_path, error = %e, "stat failed, skipping");
                return None;
            }
        };
        if !metadata.is_file() {
            warn!(path = rel_path, "not a regular file, skipping");
            return None;
        }

        let title = Path::new(rel_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_path.to_string());
        let extension = file_extension(rel_path);
        let path_only = || DocumentRecord::path_only(rel_path, self.branch, &title, &extension);

        if !self.inside_root(&full) {
            warn!(path = rel_path, "resolves outside the repository, indexing path only");
            return Some(path_only());
        }

        let eligible = self.whitelist.contains(&extension) && metadata.len() <= self.max_size;
        if !eligible {
            return Some(path_only());
        }

        let bytes = match (self.read)(&full) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = rel_path, error = %e, "read failed, indexing path only");
                return Some(path_only());
            }
        };

        if looks_binary(&bytes) {
            return Some(path_only());
        }

        let content = String::from_utf8_lossy(&bytes);
        Some(DocumentRecord::with_content(
            rel_path,
            self.branch,
            &title,
            &extension,
            &content,
        ))
    }

    fn inside_root(&self, full: &Path) -> bool {
        full.canonicalize()
            .map(|p| p.starts_with(&self.canonical_root))
            .unwrap_or(false)
    }
}

/// True when the first [`BINARY_SNIFF_BYTES`] bytes contain a NUL.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    sample.contains(&0)
}

/// Lowercased extension of the final path component; empty when absent.
pub fn file_extension(rel_path: &str) -> String {
    Path::new(rel_path)
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}
