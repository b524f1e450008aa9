use serde::Deserialize;

/// Immutable description of the issue that triggered a pipeline run, built
/// from the verified webhook payload and consumed once.
#[derive(Debug, Clone)]
pub struct IssueEvent {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub title: String,
    pub body: String,
}

/// Wire shape of the relevant slice of the source-host issue event.
#[derive(Debug, Deserialize)]
pub struct IssuePayload {
    pub repository: RepositoryPayload,
    pub issue: IssueDetails,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub name: String,
    pub owner: OwnerPayload,
}

#[derive(Debug, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueDetails {
    pub number: u64,
    pub title: String,
    /// The host sends null for an issue opened with no description.
    pub body: Option<String>,
}

impl From<IssuePayload> for IssueEvent {
    fn from(payload: IssuePayload) -> Self {
        Self {
            owner: payload.repository.owner.login,
            repo: payload.repository.name,
            issue_number: payload.issue.number,
            title: payload.issue.title,
            body: payload.issue.body.unwrap_or_default(),
        }
    }
}
