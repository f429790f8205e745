//! Core data models that flow through the index pipeline.
//!
//! [`DocumentRecord`] is the indexer's input; [`Manifest`] and
//! [`BranchEntry`] describe its output to the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manifest schema identifier understood by the client.
pub const SCHEMA_VERSION: &str = "docfind-1";

/// One tracked file, as handed to the external indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    pub category: String,
    pub href: String,
    pub path: String,
    pub branch: String,
    pub extension: String,
    pub body: String,
}

impl DocumentRecord {
    /// A record whose body is the path alone; no file content is embedded.
    pub fn path_only(path: &str, branch: &str, title: &str, extension: &str) -> Self {
        Self {
            title: title.to_string(),
            category: extension.to_string(),
            href: path.to_string(),
            path: path.to_string(),
            branch: branch.to_string(),
            extension: extension.to_string(),
            body: path.to_string(),
        }
    }

    /// A record whose body is `path + "\n" + content`.
    pub fn with_content(
        path: &str,
        branch: &str,
        title: &str,
        extension: &str,
        content: &str,
    ) -> Self {
        let mut record = Self::path_only(path, branch, title, extension);
        record.body = format!("{}\n{}", path, content);
        record
    }

    pub fn has_content(&self) -> bool {
        self.body != self.path
    }
}

/// Per-branch entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchEntry {
    pub index_path: String,
    pub hash: String,
    pub file_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// The single JSON document describing every built branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub branches: BTreeMap<String, BranchEntry>,
}
