use std::path::Path;

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Extensions considered source code and worth showing to the model.
const SOURCE_EXTENSIONS: &[&str] = &[
    "php", "js", "ts", "jsx", "tsx", "vue", "css", "scss", "html", "py", "java", "c", "cpp", "h",
    "hpp", "cs", "go", "rb", "swift", "kt", "rs",
];

/// Top-level directories that hold build output, dependencies, or other
/// content that would drown the model in noise.
const EXCLUDED_DIRS: &[&str] = &[
    "vendor", "node_modules", ".git", "storage", "logs", "tests", "dist", "build", "coverage",
    "cache", "tmp", "temp",
];

/// Per-file ceiling: 5 MiB.
const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Walk the working copy and concatenate every eligible source file into one
/// document for the model: `FILE: <relative path>`, the raw content, and a
/// blank-line separator, in traversal order (no ordering is guaranteed across
/// platforms).
///
/// A file that cannot be read is skipped with a warning: a thinner context
/// degrades the answer but does not invalidate the run.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn build_context(root: &Path) -> String {
    let mut document = String::new();
    let mut included = 0usize;

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Prune excluded trees at the top level of the working copy.
        if entry.depth() == 1 && entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            return !EXCLUDED_DIRS.contains(&name.as_ref());
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        let extension = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SOURCE_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) if metadata.len() > MAX_FILE_SIZE => {
                warn!(file = %relative, bytes = metadata.len(), "skipping large file");
                continue;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(file = %relative, %error, "skipping file with unreadable metadata");
                continue;
            }
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(error) => {
                warn!(file = %relative, %error, "failed to read file, skipping");
                continue;
            }
        };

        document.push_str(&format!("FILE: {}\n\n", relative));
        document.push_str(&content);
        document.push_str("\n\n\n");
        included += 1;
        debug!(file = %relative, "added file to context");
    }

    info!(files = included, bytes = document.len(), "assembled code context");
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_includes_source_files_with_header() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

        let context = build_context(dir.path());
        assert!(context.contains("FILE: main.rs"));
        assert!(context.contains("fn main() {}"));
    }

    #[test]
    fn test_skips_non_source_extensions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "readme\n").unwrap();
        std::fs::write(dir.path().join("data.bin"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();

        let context = build_context(dir.path());
        assert!(!context.contains("notes.md"));
        assert!(!context.contains("data.bin"));
        assert!(context.contains("FILE: app.py"));
    }

    #[test]
    fn test_skips_excluded_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.js"), "y\n").unwrap();

        let context = build_context(dir.path());
        assert!(!context.contains("node_modules"));
        assert!(context.contains("FILE: src/index.js"));
    }

    #[test]
    fn test_nested_directory_named_like_exclusion_is_kept() {
        // Only top-level prefixes are excluded.
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/build")).unwrap();
        std::fs::write(dir.path().join("src/build/gen.rs"), "z\n").unwrap();

        let context = build_context(dir.path());
        assert!(context.contains("FILE: src/build/gen.rs"));
    }

    #[test]
    fn test_skips_oversized_files() {
        let dir = tempdir().unwrap();
        let big = "x".repeat((MAX_FILE_SIZE + 1) as usize);
        std::fs::write(dir.path().join("huge.js"), big).unwrap();
        std::fs::write(dir.path().join("small.js"), "ok\n").unwrap();

        let context = build_context(dir.path());
        assert!(!context.contains("huge.js"));
        assert!(context.contains("FILE: small.js"));
    }

    #[test]
    fn test_empty_repository_yields_empty_context() {
        let dir = tempdir().unwrap();
        assert_eq!(build_context(dir.path()), "");
    }
}
