use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::EngineError;

/// Regular files directly inside `dir`, sorted by path.
///
/// Subdirectories are skipped and never descended into. Symlinks count when
/// they resolve to a regular file.
pub fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !dir.is_dir() {
        return Err(EngineError::InputNotDirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| EngineError::ListInput {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.path().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
