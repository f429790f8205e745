//! External process execution.
//!
//! Every subprocess the pipeline launches (git, tar, the indexer) goes
//! through [`run`], which waits for exit, buffers stdout/stderr, and maps a
//! non-zero exit into [`ProcessError::Failed`] carrying the captured stderr.

use std::path::Path;
use std::process::{Command, ExitStatus, Output};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to execute '{program}': {source}. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl ProcessError {
    /// Replace every occurrence of each of `secrets` in the captured stderr.
    ///
    /// Git echoes remote URLs in some failure messages; callers that embed
    /// credentials in a URL scrub them before the error travels further.
    pub fn redact<S: AsRef<str>>(self, secrets: &[S]) -> Self {
        match self {
            ProcessError::Failed {
                program,
                status,
                stderr,
            } => ProcessError::Failed {
                program,
                status,
                stderr: secrets
                    .iter()
                    .map(AsRef::as_ref)
                    .filter(|s| !s.is_empty())
                    .fold(stderr, |acc, secret| acc.replace(secret, "***")),
            },
            other => other,
        }
    }
}

/// Run a prepared command to completion.
pub fn run(cmd: &mut Command) -> Result<Output, ProcessError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = cmd.output().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ProcessError::Failed {
            program,
            status: output.status,
            stderr,
        });
    }

    Ok(output)
}

/// Run `git <args>` inside `repo_dir` and return trimmed stdout.
///
/// Terminal prompts are disabled so a missing credential fails fast
/// instead of blocking the build.
pub fn git(repo_dir: &Path, args: &[&str]) -> Result<String, ProcessError> {
    let output = run(git_command(repo_dir).args(args))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A `git` command rooted at `repo_dir`, for callers that need raw output.
pub fn git_command(repo_dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(repo_dir).env("GIT_TERMINAL_PROMPT", "0");
    cmd
}
