use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::change::{EditKind, FileChangeSet};
use crate::edit::{self, EditError};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("File not found in working copy: {path}")]
    MissingFile { path: String },

    #[error("Edit batch rejected for {path}: {source}")]
    Edit {
        path: String,
        #[source]
        source: EditError,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Apply every file change-set to the working copy on disk.
///
/// Any failure aborts the whole batch: a partially-applied change response is
/// never safe to commit, so a bad file reference or a rejected edit batch
/// surfaces as an error instead of a skip. Returns the relative paths that
/// were patched, in application order, for the commit-stage audit log.
#[instrument(skip_all, fields(files = sets.len()))]
pub async fn apply_change_sets(
    root: &Path,
    sets: &[FileChangeSet],
) -> Result<Vec<String>, PatchError> {
    let mut patched = Vec::with_capacity(sets.len());

    for set in sets {
        let target = root.join(&set.file);
        let exists = target.exists();

        let creates_file = set
            .changes
            .first()
            .is_some_and(|edit| edit.kind == EditKind::Insert);
        if !exists && !creates_file {
            return Err(PatchError::MissingFile {
                path: set.file.clone(),
            });
        }

        let lines = if exists {
            let content = tokio::fs::read_to_string(&target)
                .await
                .map_err(|source| PatchError::Io {
                    path: set.file.clone(),
                    source,
                })?;
            edit::split_lines(&content)
        } else {
            Vec::new()
        };

        let new_lines =
            edit::apply_edits(&lines, &set.changes).map_err(|source| PatchError::Edit {
                path: set.file.clone(),
                source,
            })?;

        write_atomic(&target, &new_lines)
            .await
            .map_err(|source| PatchError::Io {
                path: set.file.clone(),
                source,
            })?;

        debug!(file = %set.file, edits = set.changes.len(), lines = new_lines.len(), "applied edit batch");
        patched.push(set.file.clone());
    }

    info!(patched = patched.len(), "all change sets applied");
    Ok(patched)
}

/// Replace the target wholesale: write the full content next to it, then
/// rename over it, so a half-written file is never observable.
async fn write_atomic(target: &Path, lines: &[String]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("patched");
    let tmp = target.with_file_name(format!(".{}.tmp", file_name));

    let mut content = lines.join("\n");
    content.push('\n');

    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, target).await
}
