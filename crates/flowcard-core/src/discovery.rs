//! Walks a repo root for parseable source files, honouring `.gitignore`.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::ParseStats;
use crate::parser::{parse_file, ParsedFile, SupportedLanguage};

/// Parses every recognised source file under `repo_root`. Directory
/// traversal errors (permission denied on a subtree, etc.) are folded into
/// the returned stats rather than aborting the walk.
pub fn parse_repo(repo_root: &Path, repo_name: &str) -> (Vec<ParsedFile>, ParseStats) {
    let mut stats = ParseStats::default();
    let mut parsed = Vec::new();

    let walker = WalkBuilder::new(repo_root).hidden(false).git_ignore(true).build();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => {
                stats.unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path: PathBuf = entry.into_path();
        if SupportedLanguage::from_path(&path).is_none() {
            continue;
        }
        if let Some(mut file) = parse_file(&path, repo_name, &mut stats) {
            file.path = path.strip_prefix(repo_root).map(Path::to_path_buf).unwrap_or(path);
            parsed.push(file);
        }
    }

    (parsed, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parsed_file_paths_are_relative_to_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("app/models");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("user.rb"), "class User\nend\n").unwrap();

        let (files, _stats) = parse_repo(dir.path(), "sample");

        assert_eq!(files.len(), 1);
        assert!(!files[0].path.is_absolute());
        assert_eq!(files[0].path, Path::new("app/models/user.rb"));
    }
}
