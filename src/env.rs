//! Environment-driven run planning.
//!
//! Reads the generation switches from the process environment and decides
//! whether this invocation should build indexes at all, which branches it
//! covers, and which file extensions get their content embedded.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `ENABLED_SEARCH_INDEX` | master switch (`true`, `1`, `yes`, `on`) |
//! | `SEARCH_INDEX_GENERATION_MODE` | `build`, `action`, or `off` |
//! | `GITHUB_ACTIONS` | `true` marks the CI action context |
//! | `GITHUB_REPO_OWNER` / `GITHUB_REPO_NAME` | remote repository identity |
//! | `GITHUB_REPO_BRANCH` | default branch (`main` when unset) |
//! | `SEARCH_INDEX_BRANCHES` | comma/whitespace separated branch list |
//! | `SEARCH_INDEX_EXTENSIONS` | whitelist override |
//! | `DOCFIND_BIN` | pre-installed indexer binary |
//! | `DOCFIND_REPO_PATH` | already checked-out repository |
//! | `SEARCH_INDEX_GITHUB_TOKEN`, `GITHUB_TOKEN`, `GH_TOKEN` | clone token |

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_BRANCH: &str = "main";

const TOKEN_VARS: [&str; 3] = ["SEARCH_INDEX_GITHUB_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Extensions whose content is embedded when no override is given.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "astro", "bash", "c", "cc", "cfg", "clj", "cmake", "conf", "cpp", "cs", "css", "csv", "dart",
    "ex", "exs", "go", "gradle", "graphql", "h", "hpp", "hs", "html", "ini", "java", "js", "json",
    "jsx", "kt", "less", "lua", "md", "mdx", "mjs", "php", "pl", "proto", "py", "r", "rb", "rs",
    "rst", "scala", "scss", "sh", "sql", "svelte", "swift", "toml", "ts", "tsx", "txt", "vue",
    "xml", "yaml", "yml", "zsh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Build,
    Action,
    Off,
}

impl GenerationMode {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        match raw.map(str::to_ascii_lowercase).as_deref() {
            None | Some("build") => Ok(GenerationMode::Build),
            Some("action") => Ok(GenerationMode::Action),
            Some("off") => Ok(GenerationMode::Off),
            Some(other) => bail!(
                "Unknown SEARCH_INDEX_GENERATION_MODE: '{}'. Must be build, action, or off.",
                other
            ),
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Build => write!(f, "build"),
            GenerationMode::Action => write!(f, "action"),
            GenerationMode::Off => write!(f, "off"),
        }
    }
}

/// Where the current process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    Build,
    Action,
}

impl ExecutionContext {
    pub fn detect(inputs: &RawInputs) -> Self {
        if inputs.ci {
            ExecutionContext::Action
        } else {
            ExecutionContext::Build
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "build" => Ok(ExecutionContext::Build),
            "action" => Ok(ExecutionContext::Action),
            other => bail!("Unknown context: '{}'. Must be build or action.", other),
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Build => write!(f, "build"),
            ExecutionContext::Action => write!(f, "action"),
        }
    }
}

/// Unvalidated configuration as read from the environment.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub enabled: Option<String>,
    pub mode: Option<String>,
    pub ci: bool,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub default_branch: Option<String>,
    pub branches: Option<String>,
    pub extensions: Option<String>,
    pub binary_path: Option<PathBuf>,
    pub repo_path: Option<PathBuf>,
    pub token: Option<String>,
}

impl RawInputs {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build inputs from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            enabled: get("ENABLED_SEARCH_INDEX"),
            mode: get("SEARCH_INDEX_GENERATION_MODE"),
            ci: get("GITHUB_ACTIONS").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            owner: get("GITHUB_REPO_OWNER"),
            name: get("GITHUB_REPO_NAME"),
            default_branch: get("GITHUB_REPO_BRANCH"),
            branches: get("SEARCH_INDEX_BRANCHES"),
            extensions: get("SEARCH_INDEX_EXTENSIONS"),
            binary_path: get("DOCFIND_BIN").map(PathBuf::from),
            repo_path: get("DOCFIND_REPO_PATH").map(PathBuf::from),
            token: TOKEN_VARS.iter().find_map(|&key| get(key)),
        }
    }
}

/// The validated outcome of environment resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub should_run: bool,
    pub skip_reason: Option<String>,
    pub mode: GenerationMode,
    pub context: ExecutionContext,
    pub branches: Vec<String>,
    pub extension_whitelist: BTreeSet<String>,
}

/// Where branch trees come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Remote {
        owner: String,
        name: String,
        token: Option<String>,
    },
    Local(PathBuf),
}

/// Decide whether to run and with which branches and extensions.
pub fn resolve_plan(inputs: &RawInputs, context: ExecutionContext) -> Result<RunPlan> {
    let mode = GenerationMode::parse(inputs.mode.as_deref())?;
    let enabled = inputs.enabled.as_deref().is_some_and(parse_flag);

    let skip_reason = if !enabled {
        Some("ENABLED_SEARCH_INDEX is not set to true".to_string())
    } else {
        match (mode, context) {
            (GenerationMode::Off, _) => Some("generation mode is off".to_string()),
            (GenerationMode::Build, ExecutionContext::Build)
            | (GenerationMode::Action, ExecutionContext::Action) => None,
            (GenerationMode::Build, ExecutionContext::Action) => {
                Some("generation mode is build but running in an action".to_string())
            }
            (GenerationMode::Action, ExecutionContext::Build) => {
                Some("generation mode is action but running in a local build".to_string())
            }
        }
    };

    let default_branch = inputs
        .default_branch
        .clone()
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    let mut branches = inputs
        .branches
        .as_deref()
        .map(split_list)
        .unwrap_or_default();
    if branches.is_empty() {
        branches.push(default_branch);
    }

    let mut extension_whitelist: BTreeSet<String> = inputs
        .extensions
        .as_deref()
        .map(split_list)
        .unwrap_or_default()
        .iter()
        .map(|ext| normalize_extension(ext))
        .filter(|ext| !ext.is_empty())
        .collect();
    if extension_whitelist.is_empty() {
        extension_whitelist = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    }

    Ok(RunPlan {
        should_run: skip_reason.is_none(),
        skip_reason,
        mode,
        context,
        branches,
        extension_whitelist,
    })
}

/// Pick the repository source: an explicit local path wins over a remote clone.
pub fn repo_source(inputs: &RawInputs) -> Result<RepoSource> {
    if let Some(path) = &inputs.repo_path {
        return Ok(RepoSource::Local(path.clone()));
    }
    match (&inputs.owner, &inputs.name) {
        (Some(owner), Some(name)) => Ok(RepoSource::Remote {
            owner: owner.trim().to_string(),
            name: name.trim().to_string(),
            token: inputs.token.clone(),
        }),
        _ => bail!("GITHUB_REPO_OWNER and GITHUB_REPO_NAME must be set when DOCFIND_REPO_PATH is not"),
    }
}

/// Lowercase and strip a leading dot: `.RS` → `rs`.
pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Split on commas and whitespace, dropping empties and repeats.
fn split_list(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn inputs(vars: &[(&str, &str)]) -> RawInputs {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawInputs::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn disabled_never_runs() {
        let raw = inputs(&[("SEARCH_INDEX_GENERATION_MODE", "build")]);
        let plan = resolve_plan(&raw, ExecutionContext::Build).unwrap();
        assert!(!plan.should_run);
        assert!(plan.skip_reason.unwrap().contains("ENABLED_SEARCH_INDEX"));
    }

    #[test]
    fn mode_must_match_context() {
        let raw = inputs(&[
            ("ENABLED_SEARCH_INDEX", "true"),
            ("SEARCH_INDEX_GENERATION_MODE", "action"),
        ]);
        assert!(!resolve_plan(&raw, ExecutionContext::Build).unwrap().should_run);
        assert!(resolve_plan(&raw, ExecutionContext::Action).unwrap().should_run);

        let raw = inputs(&[("ENABLED_SEARCH_INDEX", "1")]);
        assert!(resolve_plan(&raw, ExecutionContext::Build).unwrap().should_run);
        assert!(!resolve_plan(&raw, ExecutionContext::Action).unwrap().should_run);
    }

    #[test]
    fn off_mode_never_runs() {
        let raw = inputs(&[
            ("ENABLED_SEARCH_INDEX", "true"),
            ("SEARCH_INDEX_GENERATION_MODE", "OFF"),
        ]);
        for context in [ExecutionContext::Build, ExecutionContext::Action] {
            assert!(!resolve_plan(&raw, context).unwrap().should_run);
        }
    }

    #[test]
    fn unknown_mode_is_error() {
        let raw = inputs(&[("SEARCH_INDEX_GENERATION_MODE", "sometimes")]);
        assert!(resolve_plan(&raw, ExecutionContext::Build).is_err());
    }

    #[test]
    fn branches_fall_back_to_default_branch() {
        let raw = inputs(&[("GITHUB_REPO_BRANCH", "trunk")]);
        let plan = resolve_plan(&raw, ExecutionContext::Build).unwrap();
        assert_eq!(plan.branches, vec!["trunk"]);

        let plan = resolve_plan(&inputs(&[]), ExecutionContext::Build).unwrap();
        assert_eq!(plan.branches, vec!["main"]);
    }

    #[test]
    fn branch_list_splits_on_commas_and_whitespace() {
        let raw = inputs(&[("SEARCH_INDEX_BRANCHES", "main, dev\nrelease/1.0,,main")]);
        let plan = resolve_plan(&raw, ExecutionContext::Build).unwrap();
        assert_eq!(plan.branches, vec!["main", "dev", "release/1.0"]);
    }

    #[test]
    fn extension_override_replaces_defaults() {
        let raw = inputs(&[("SEARCH_INDEX_EXTENSIONS", ".RS, md")]);
        let plan = resolve_plan(&raw, ExecutionContext::Build).unwrap();
        let expected: BTreeSet<String> = ["rs", "md"].iter().map(|s| s.to_string()).collect();
        assert_eq!(plan.extension_whitelist, expected);
    }

    #[test]
    fn default_whitelist_is_broad() {
        let plan = resolve_plan(&inputs(&[]), ExecutionContext::Build).unwrap();
        assert!(plan.extension_whitelist.len() >= 50);
        assert!(plan.extension_whitelist.contains("rs"));
        assert!(!plan.extension_whitelist.contains("png"));
    }

    #[test]
    fn ci_flag_detects_action_context() {
        assert_eq!(
            ExecutionContext::detect(&inputs(&[("GITHUB_ACTIONS", "true")])),
            ExecutionContext::Action
        );
        assert_eq!(
            ExecutionContext::detect(&inputs(&[])),
            ExecutionContext::Build
        );
    }

    #[test]
    fn first_non_empty_token_wins() {
        let raw = inputs(&[("SEARCH_INDEX_GITHUB_TOKEN", " "), ("GITHUB_TOKEN", "abc"), ("GH_TOKEN", "def")]);
        assert_eq!(raw.token.as_deref(), Some("abc"));
    }

    #[test]
    fn local_repo_path_wins_over_remote() {
        let raw = inputs(&[
            ("DOCFIND_REPO_PATH", "/srv/repo"),
            ("GITHUB_REPO_OWNER", "acme"),
            ("GITHUB_REPO_NAME", "site"),
        ]);
        assert_eq!(
            repo_source(&raw).unwrap(),
            RepoSource::Local(PathBuf::from("/srv/repo"))
        );
    }

    #[test]
    fn remote_requires_identity() {
        assert!(repo_source(&inputs(&[("GITHUB_REPO_OWNER", "acme")])).is_err());
        let raw = inputs(&[("GITHUB_REPO_OWNER", "acme"), ("GITHUB_REPO_NAME", "site")]);
        assert_eq!(
            repo_source(&raw).unwrap(),
            RepoSource::Remote {
                owner: "acme".to_string(),
                name: "site".to_string(),
                token: None
            }
        );
    }
}
