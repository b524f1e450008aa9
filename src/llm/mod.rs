pub mod provider;

pub use provider::{backend_for, CompletionBackend};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::change::ChangeResponse;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Unsupported LLM provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Model reply is not a valid change response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Output-format contract sent ahead of the code context. The parser on our
/// side accepts exactly this shape, so the instructions are strict about it.
const PROMPT_INSTRUCTIONS: &str = r#"You are an AI coding assistant tasked with helping resolve GitHub issues. You will be provided with:
1. The codebase context
2. The issue title and description

Your task is to analyze the issue and respond with a full list of code changes needed to resolve the issue in its entirety. You must respond in the following JSON format:

{
    "changes": [
        {
            "file": "path/to/file",
            "changes": [
                {
                    "type": "replace|insert|delete",
                    "start_line": number (integer),
                    "end_line": number (integer),
                    "content": "new content to insert/replace"
                }
            ]
        }
    ],
    "commit_message": "A clear, concise commit message describing the changes",
    "pr_description": "A detailed description of the changes made and how they resolve the issue"
}

Rules for changes:
1. For 'replace' type: specify start_line and end_line of the text to replace
2. For 'insert' type: specify start_line where to insert (end_line should be same as start_line)
3. For 'delete' type: specify start_line and end_line of the text to delete
4. Line numbers should be 1-indexed and should ONLY contain whole integers (absolutely no words or placeholder values)
5. The 'content' field is only required for 'replace' and 'insert' types
6. Multiple changes can be specified for each file
7. Changes within one file must not touch overlapping line ranges"#;

/// Send the code context and issue to the configured backend and normalize
/// the reply into a validated ChangeResponse. One attempt, no retry: a failed
/// call fails the run.
#[instrument(skip_all, fields(backend = backend.name(), issue_title))]
pub async fn request_changes(
    backend: &dyn CompletionBackend,
    context: &str,
    issue_title: &str,
    issue_body: &str,
) -> Result<ChangeResponse, LlmError> {
    let prompt = build_prompt(context, issue_title, issue_body);
    debug!(prompt_bytes = prompt.len(), "sending change request");

    let raw = backend.complete(&prompt).await?;
    debug!(reply_bytes = raw.len(), "received model reply");

    parse_response(&raw)
}

fn build_prompt(context: &str, issue_title: &str, issue_body: &str) -> String {
    let mut prompt = String::with_capacity(PROMPT_INSTRUCTIONS.len() + context.len() + 512);
    prompt.push_str(PROMPT_INSTRUCTIONS);
    prompt.push_str("\n\nHere is the codebase context:\n\n");
    prompt.push_str(context);
    prompt.push_str("\n\nHere is the issue to resolve:\n\nTitle: ");
    prompt.push_str(issue_title);
    prompt.push_str("\n\nDescription:\n");
    prompt.push_str(issue_body);
    prompt.push_str(
        "\n\nPlease analyze the issue and provide your response in the specified JSON format.\n\n\
         NOTE: Do not include any additional text besides the JSON specified. Do not include notes \
         above or below the JSON specified. Return ONLY the JSON.",
    );
    prompt
}

/// Parse the reply into the change-set contract. The raw text rides along in
/// the error so a bad reply can be diagnosed from the log.
fn parse_response(raw: &str) -> Result<ChangeResponse, LlmError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|error| LlmError::MalformedResponse {
        reason: error.to_string(),
        raw: raw.to_string(),
    })
}

/// Models wrap JSON in Markdown fences despite instructions. Strip a leading
/// ```/```json line and a trailing ``` fence.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
