pub mod analyzer;
pub mod error;
pub mod evaluation;
pub mod indexing;
pub mod map_reduce;
pub mod parser;
pub mod postings;
pub mod search;
pub mod significance;
pub mod spimi;
pub mod stats;
pub mod tokens;

pub use analyzer::*;
pub use error::*;
pub use evaluation::*;
pub use indexing::*;
pub use map_reduce::*;
pub use parser::*;
pub use postings::*;
pub use search::*;
pub use significance::*;
pub use spimi::*;
pub use stats::*;
pub use tokens::*;

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Collects the regular files of a collection directory in sorted
/// order; a file path is returned as-is.
pub fn collect_document_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Scratch directory for block and segment files; honours the
/// `CONCORDANCE_TMPDIR` override, falling back to the OS default.
pub fn scratch_dir() -> PathBuf {
    std::env::var_os("CONCORDANCE_TMPDIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_document_files_sorts_and_skips_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b"), "").unwrap();
        fs::write(dir.path().join("a"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c"), "").unwrap();

        let files = collect_document_files(dir.path());
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
