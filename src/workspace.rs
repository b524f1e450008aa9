use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Stale working copy at {path} could not be removed")]
    StaleWorkingCopy { path: PathBuf },

    #[error("Failed to clone {owner}/{repo}: {output}")]
    Clone {
        owner: String,
        repo: String,
        output: String,
    },

    #[error("Failed to create branch {branch}: {output}")]
    Branch { branch: String, output: String },

    #[error("Failed to commit changes: {output}")]
    Commit { output: String },

    #[error("Failed to push branch {branch}: {output}")]
    Push { branch: String, output: String },

    #[error("Working copy I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A disposable local checkout, exclusively owned by one pipeline run from
/// clone until cleanup.
#[derive(Debug)]
pub struct WorkingCopy {
    pub root: PathBuf,
    pub branch: String,
}

/// Deterministic location for a repository's working copy. A stale copy from
/// a prior failed run lands on the same path and is purged before reuse.
pub fn working_copy_path(temp_root: &Path, owner: &str, repo: &str) -> PathBuf {
    temp_root.join(owner).join(repo)
}

/// Clone the repository into its deterministic path, purging any leftover
/// copy first. On success the returned WorkingCopy owns the path until
/// `cleanup`.
#[instrument(skip(config))]
pub async fn clone_repository(
    owner: &str,
    repo: &str,
    branch: &str,
    config: &Config,
) -> Result<WorkingCopy, WorkspaceError> {
    let root = working_copy_path(&config.temp_root(), owner, repo);

    if root.exists() {
        purge_stale(&root).await?;
    }
    if let Some(parent) = root.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let url = authenticated_remote(owner, repo, &config.github.token);
    let root_arg = root.to_string_lossy();
    let (success, output) = run_git(
        &["clone", &url, &root_arg],
        None,
        &config.github.token,
    )
    .await?;
    if !success {
        return Err(WorkspaceError::Clone {
            owner: owner.to_string(),
            repo: repo.to_string(),
            output,
        });
    }

    info!(path = %root.display(), "cloned repository");
    Ok(WorkingCopy {
        root,
        branch: branch.to_string(),
    })
}

/// Create and check out the working branch.
pub async fn create_branch(copy: &WorkingCopy, token: &str) -> Result<(), WorkspaceError> {
    let (success, output) =
        run_git(&["checkout", "-b", &copy.branch], Some(&copy.root), token).await?;
    if !success {
        return Err(WorkspaceError::Branch {
            branch: copy.branch.clone(),
            output,
        });
    }
    info!(branch = %copy.branch, "created branch");
    Ok(())
}

/// Stage everything and commit with the model-supplied message. Nothing to
/// commit is a failure: it means the patch stage produced no visible change.
pub async fn commit_all(
    copy: &WorkingCopy,
    message: &str,
    token: &str,
) -> Result<(), WorkspaceError> {
    let (staged, output) = run_git(&["add", "."], Some(&copy.root), token).await?;
    if !staged {
        return Err(WorkspaceError::Commit { output });
    }

    let (committed, output) = run_git(&["commit", "-m", message], Some(&copy.root), token).await?;
    if !committed {
        return Err(WorkspaceError::Commit { output });
    }
    info!(commit_message = message, "committed changes");
    Ok(())
}

/// Push the branch to a token-embedded remote URL. The token never reaches
/// the log: all captured git output is redacted first.
pub async fn push_branch(
    copy: &WorkingCopy,
    owner: &str,
    repo: &str,
    token: &str,
) -> Result<(), WorkspaceError> {
    let url = authenticated_remote(owner, repo, token);
    let (success, output) = run_git(&["push", &url, &copy.branch], Some(&copy.root), token).await?;
    if !success {
        return Err(WorkspaceError::Push {
            branch: copy.branch.clone(),
            output,
        });
    }
    info!(branch = %copy.branch, "pushed branch");
    Ok(())
}

/// Delete the working copy. Best-effort: a failure here must never mask
/// whatever the pipeline was already reporting, so it is logged and dropped.
pub async fn cleanup(copy: &WorkingCopy) {
    if !copy.root.exists() {
        return;
    }
    match remove_tree(&copy.root).await {
        Ok(()) => info!(path = %copy.root.display(), "removed working copy"),
        Err(error) => {
            warn!(path = %copy.root.display(), %error, "failed to remove working copy")
        }
    }
}

/// Remove a leftover working copy, polling briefly for the path to vanish:
/// some platforms release directory entries late when files were locked.
async fn purge_stale(path: &Path) -> Result<(), WorkspaceError> {
    debug!(path = %path.display(), "purging stale working copy");
    if let Err(error) = remove_tree(path).await {
        warn!(path = %path.display(), %error, "stale working copy removal failed");
    }

    for _ in 0..10 {
        if !path.exists() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if path.exists() {
        return Err(WorkspaceError::StaleWorkingCopy {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Recursive delete that copes with read-only entries: clear the read-only
/// bit across the tree and retry once, then fail loudly.
async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) => {
            clear_readonly(path);
            tokio::fs::remove_dir_all(path).await
        }
    }
}

fn clear_readonly(path: &Path) {
    for entry in walkdir::WalkDir::new(path).into_iter().flatten() {
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                let _ = std::fs::set_permissions(entry.path(), permissions);
            }
        }
    }
}

/// HTTPS remote with the access token embedded, used for both clone and push
/// so the token lives in exactly one place.
fn authenticated_remote(owner: &str, repo: &str, token: &str) -> String {
    format!("https://{}@github.com/{}/{}.git", token, owner, repo)
}

/// Run git with combined stdout/stderr capture. The returned output has the
/// token masked so it is safe for logs and error messages.
async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    token: &str,
) -> std::io::Result<(bool, String)> {
    let mut command = Command::new("git");
    command.args(args);
    // Unattended service: never let git wait on a credential prompt.
    command.env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.output().await?;
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = redact(combined.trim(), token);

    debug!(command = %args.first().copied().unwrap_or(""), success = output.status.success(), "git finished");
    Ok((output.status.success(), combined))
}

fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "***")
}
