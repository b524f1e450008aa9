use thiserror::Error;

use tracing::{info, instrument};

use crate::config::Config;
use crate::context;
use crate::llm::{self, LlmError};
use crate::patch::{self, PatchError};
use crate::publish::{self, PublishError};
use crate::webhook::IssueEvent;
use crate::workspace::{self, WorkingCopy, WorkspaceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// One full issue-to-pull-request run. Returns the created PR number.
///
/// The working copy is acquired by the clone and released here, on every exit
/// path: the stage sequence runs in `run_stages`, and cleanup follows whether
/// it returned a PR number or bailed at any stage. If the clone itself fails
/// there is nothing on disk and nothing to release.
#[instrument(skip_all, fields(owner = %event.owner, repo = %event.repo, issue = event.issue_number))]
pub async fn run(event: &IssueEvent, config: &Config) -> Result<u64, PipelineError> {
    let copy = workspace::clone_repository(
        &event.owner,
        &event.repo,
        &branch_name(event.issue_number),
        config,
    )
    .await?;

    let result = run_stages(&copy, event, config).await;
    workspace::cleanup(&copy).await;
    result
}

/// Deterministic branch per issue: a rerun of the same issue reuses the name
/// and collides. Known limitation, not silently handled.
fn branch_name(issue_number: u64) -> String {
    format!("fix-for-issue-{}", issue_number)
}

async fn run_stages(
    copy: &WorkingCopy,
    event: &IssueEvent,
    config: &Config,
) -> Result<u64, PipelineError> {
    let token = &config.github.token;

    workspace::create_branch(copy, token).await?;

    let code_context = context::build_context(&copy.root);

    let backend = llm::backend_for(config)?;
    let response =
        llm::request_changes(backend.as_ref(), &code_context, &event.title, &event.body).await?;

    let patched = patch::apply_change_sets(&copy.root, &response.changes).await?;
    info!(files = patched.len(), "change sets applied, committing");

    workspace::commit_all(copy, &response.commit_message, token).await?;
    workspace::push_branch(copy, &event.owner, &event.repo, token).await?;

    let pr_number = publish::create_pull_request(
        &event.owner,
        &event.repo,
        &copy.branch,
        event.issue_number,
        &response.pr_description,
        token,
    )
    .await?;

    info!(pr = pr_number, "pipeline run complete");
    Ok(pr_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_branch_name_is_deterministic() {
        assert_eq!(branch_name(42), "fix-for-issue-42");
        assert_eq!(branch_name(42), branch_name(42));
    }

    /// A clone that cannot succeed must abort the run before any branch or
    /// commit work and must leave nothing behind on the working-copy path.
    #[tokio::test]
    async fn test_clone_failure_aborts_without_working_copy() {
        let temp = tempdir().unwrap();
        let mut config = Config::default();
        config.github.token = "invalid-token".to_string();
        config.github.webhook_secret = "hush".to_string();
        config.llm.model = "test".to_string();
        config.llm.api_key = "key".to_string();
        config.workspace.temp_dir = Some(temp.path().to_path_buf());

        let event = IssueEvent {
            owner: "issue-fixer-test-no-such-owner".to_string(),
            repo: "no-such-repo".to_string(),
            issue_number: 1,
            title: "broken".to_string(),
            body: "does not matter".to_string(),
        };

        let result = run(&event, &config).await;
        assert!(matches!(
            result,
            Err(PipelineError::Workspace(WorkspaceError::Clone { .. }))
        ));

        let expected_path = temp
            .path()
            .join("issue-fixer-test-no-such-owner")
            .join("no-such-repo");
        assert!(!expected_path.exists());
    }
}
