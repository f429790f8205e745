//! # docfind-build
//!
//! Build-time pipeline that produces a static, per-branch full-text search
//! index for a git repository, served as content-addressed assets to a
//! client-side search feature.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │   env    │──▶│ provision │──▶│ per branch:                  │──▶│ manifest │
//! │ run plan │   │  docfind  │   │ mirror → collect → indexer   │   │  .json   │
//! └──────────┘   └───────────┘   └──────────────────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ENABLED_SEARCH_INDEX=true GITHUB_REPO_OWNER=acme GITHUB_REPO_NAME=site \
//!   docfind-build generate
//! docfind-build verify
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML tool configuration |
//! | [`env`] | Environment-driven run plan |
//! | [`process`] | Subprocess execution |
//! | [`provision`] | Indexer binary download and cache |
//! | [`mirror`] | Shallow per-branch git workspace |
//! | [`collect`] | Tracked-file document collection |
//! | [`indexer`] | External indexer invocation and loader patch |
//! | [`manifest`] | Artifact hashing and manifest output |
//! | [`models`] | Core data types |
//! | [`pipeline`] | Run driver |

pub mod collect;
pub mod config;
pub mod env;
pub mod indexer;
pub mod manifest;
pub mod mirror;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod provision;
