//! Document discovery under a workflow root.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Normalize user-supplied extensions: trim, drop a leading dot, lowercase.
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Collect documents below `root` whose extension matches, case-insensitively.
///
/// Hidden files and directories are skipped. Paths are returned relative to
/// `root` and sorted.
pub fn discover_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let extensions = normalize_extensions(extensions);
    let mut files = Vec::new();
    collect_files_recursive(root, root, &extensions, &mut files)?;
    files.sort();
    tracing::debug!(root = %root.display(), count = files.len(), "discovered documents");
    Ok(files)
}

fn collect_files_recursive(
    root: &Path,
    dir: &Path,
    extensions: &[String],
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files_recursive(root, &path, extensions, files)?;
        } else if file_type.is_file() && has_extension(&path, extensions) {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            files.push(rel);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, "x\n").expect("write file");
    }

    #[test]
    fn finds_matching_files_recursively_sorted() {
        let root = TempDir::new().expect("temp dir");
        touch(root.path(), "b.md");
        touch(root.path(), "a/z.MARKDOWN");
        touch(root.path(), "a/notes.txt");
        touch(root.path(), "image.png");
        touch(root.path(), ".hidden.md");
        touch(root.path(), ".git/HEAD.md");

        let extensions = vec!["md".to_string(), ".Markdown".to_string(), "txt".to_string()];
        let files = discover_files(root.path(), &extensions).expect("discover");
        assert_eq!(
            files,
            vec![
                PathBuf::from("a/notes.txt"),
                PathBuf::from("a/z.MARKDOWN"),
                PathBuf::from("b.md"),
            ]
        );
    }

    #[test]
    fn empty_directory_yields_no_files() {
        let root = TempDir::new().expect("temp dir");
        let files = discover_files(root.path(), &["md".to_string()]).expect("discover");
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = TempDir::new().expect("temp dir");
        let missing = root.path().join("nope");
        assert!(discover_files(&missing, &["md".to_string()]).is_err());
    }

    #[test]
    fn normalize_drops_dots_blanks_and_duplicates() {
        assert_eq!(
            normalize_extensions(&[" .MD", "md", "", "Txt"]),
            vec!["md".to_string(), "txt".to_string()]
        );
    }
}
