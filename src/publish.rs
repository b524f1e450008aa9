use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "issue-fixer";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Pull request creation rejected ({status}): {message}")]
    Creation { status: u16, message: String },

    #[error("Pull request API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct PullRequestBody<'a> {
    title: String,
    body: String,
    head: &'a str,
    base: &'a str,
}

/// Open a pull request from the pushed branch into the repository's main
/// branch, with a body that closes the originating issue. Returns the new
/// pull-request number.
#[instrument(skip(description, token))]
pub async fn create_pull_request(
    owner: &str,
    repo: &str,
    branch: &str,
    issue_number: u64,
    description: &str,
    token: &str,
) -> Result<u64, PublishError> {
    let url = format!("https://api.github.com/repos/{}/{}/pulls", owner, repo);
    let request = PullRequestBody {
        title: format!("Fix for issue #{}", issue_number),
        body: format!("{}\n\nCloses #{}", description, issue_number),
        head: branch,
        base: "main",
    };

    let client = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
    let response = client
        .post(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/vnd.github.v3+json")
        .bearer_auth(token)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        return Err(PublishError::Creation {
            status: status.as_u16(),
            message,
        });
    }

    let reply: Value = response.json().await?;
    let number = reply["number"]
        .as_u64()
        .ok_or_else(|| PublishError::Creation {
            status: status.as_u16(),
            message: "reply is missing the pull request number".to_string(),
        })?;

    info!(pr = number, "created pull request");
    Ok(number)
}
