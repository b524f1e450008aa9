use serde::Deserialize;

/// The validated output of a model call: everything downstream of the LLM
/// consumes this structure, never the raw reply text.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeResponse {
    /// One entry per file the model wants to touch.
    pub changes: Vec<FileChangeSet>,
    /// Commit message, used verbatim.
    pub commit_message: String,
    /// Pull-request description, used verbatim.
    pub pr_description: String,
}

/// All edits targeting a single file, in the order the model emitted them.
#[derive(Debug, Clone, Deserialize)]
pub struct FileChangeSet {
    /// Path relative to the working-copy root.
    pub file: String,
    pub changes: Vec<FileEdit>,
}

/// One atomic line edit over a contiguous, 1-indexed range of the file's
/// original content.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEdit {
    #[serde(rename = "type")]
    pub kind: EditKind,
    /// First affected line, 1-indexed, inclusive.
    pub start_line: usize,
    /// Last affected line, inclusive. Ignored for inserts.
    pub end_line: usize,
    /// Replacement lines for replace/insert; ignored for delete.
    #[serde(default)]
    pub content: String,
}

/// Kinds of line edit the model may request. Anything else deserializes to
/// `Unknown` so the edit engine can reject the whole batch instead of the
/// parser dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Replace,
    Insert,
    Delete,
    #[serde(other)]
    Unknown,
}

impl FileEdit {
    /// Edits normally arrive via deserialization; tests build them directly.
    #[allow(dead_code)]
    pub fn new(kind: EditKind, start_line: usize, end_line: usize, content: &str) -> Self {
        Self {
            kind,
            start_line,
            end_line,
            content: content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_change_response() {
        let raw = r#"{
            "changes": [
                {
                    "file": "src/lib.rs",
                    "changes": [
                        {"type": "replace", "start_line": 5, "end_line": 5, "content": "    let i = 0;"}
                    ]
                }
            ],
            "commit_message": "Fix off-by-one in loop",
            "pr_description": "Initializes the loop counter at zero."
        }"#;
        let response: ChangeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].file, "src/lib.rs");
        assert_eq!(response.changes[0].changes[0].kind, EditKind::Replace);
        assert_eq!(response.commit_message, "Fix off-by-one in loop");
    }

    #[test]
    fn test_delete_edit_without_content() {
        let raw = r#"{"type": "delete", "start_line": 2, "end_line": 4}"#;
        let edit: FileEdit = serde_json::from_str(raw).unwrap();
        assert_eq!(edit.kind, EditKind::Delete);
        assert_eq!(edit.content, "");
    }

    #[test]
    fn test_unknown_edit_kind_survives_parsing() {
        let raw = r#"{"type": "rewrite", "start_line": 1, "end_line": 1, "content": "x"}"#;
        let edit: FileEdit = serde_json::from_str(raw).unwrap();
        assert_eq!(edit.kind, EditKind::Unknown);
    }
}
