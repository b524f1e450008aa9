use thiserror::Error;

use crate::change::{EditKind, FileEdit};

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Invalid line range {start}..={end} for a {len}-line file")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("Unknown edit kind for edit #{index}")]
    UnknownKind { index: usize },

    #[error("Overlapping edits: lines {first_start}..={first_end} intersect {second_start}..={second_end}")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
}

/// Apply a batch of line edits to a file's content held in memory.
///
/// Edits reference 1-indexed lines of the *original* file. The whole batch is
/// validated before anything is touched, then edits are applied in descending
/// order of start line: an edit already applied can never shift the numbering
/// an edit further up the queue depends on.
pub fn apply_edits(lines: &[String], edits: &[FileEdit]) -> Result<Vec<String>, EditError> {
    validate(lines.len(), edits)?;

    let mut ordered: Vec<&FileEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start_line.cmp(&a.start_line));

    let mut buffer: Vec<String> = lines.to_vec();
    for edit in ordered {
        let from = edit.start_line - 1;
        match edit.kind {
            EditKind::Replace => {
                let to = edit.end_line.min(buffer.len());
                buffer.splice(from..to, split_content(&edit.content));
            }
            EditKind::Insert => {
                buffer.splice(from..from, split_content(&edit.content));
            }
            EditKind::Delete => {
                let to = edit.end_line.min(buffer.len());
                buffer.splice(from..to, std::iter::empty());
            }
            // Rejected by validate() above.
            EditKind::Unknown => unreachable!("unknown edit kind passed validation"),
        }
    }
    Ok(buffer)
}

/// Split a file's content into lines without discarding anything but the
/// line terminators themselves. Interior `\r` stays with its line, so CRLF
/// content survives a split/join round trip.
pub fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    if content.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Reject the whole batch before any mutation: unknown kinds, impossible
/// ranges, and intersecting ranges (whose result would depend on input order).
fn validate(len: usize, edits: &[FileEdit]) -> Result<(), EditError> {
    for (index, edit) in edits.iter().enumerate() {
        if edit.kind == EditKind::Unknown {
            return Err(EditError::UnknownKind { index });
        }
        let range_error = EditError::InvalidRange {
            start: edit.start_line,
            end: edit.end_line,
            len,
        };
        if edit.start_line < 1 || edit.start_line > len + 1 {
            return Err(range_error);
        }
        if matches!(edit.kind, EditKind::Replace | EditKind::Delete)
            && edit.start_line > edit.end_line
        {
            return Err(range_error);
        }
    }

    let spans: Vec<(usize, usize)> = edits.iter().map(original_span).collect();
    for (i, a) in spans.iter().enumerate() {
        for b in spans.iter().skip(i + 1) {
            if a.0 <= b.1 && b.0 <= a.1 {
                return Err(EditError::Overlap {
                    first_start: a.0,
                    first_end: a.1,
                    second_start: b.0,
                    second_end: b.1,
                });
            }
        }
    }
    Ok(())
}

/// The range of original lines an edit claims. An insert removes nothing but
/// still claims its anchor line: two inserts at the same line would produce an
/// order-dependent result, so they count as intersecting.
fn original_span(edit: &FileEdit) -> (usize, usize) {
    match edit.kind {
        EditKind::Insert => (edit.start_line, edit.start_line),
        _ => (edit.start_line, edit.end_line),
    }
}

fn split_content(content: &str) -> Vec<String> {
    content.split('\n').map(String::from).collect()
}
