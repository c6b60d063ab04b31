//! File repository backing the list and download commands.
//!
//! One flat directory of files on the server side. Listing is non-recursive
//! and returns regular files only; reads refuse any name that could escape
//! the repository root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Errors from repository lookups
#[derive(Debug)]
pub enum RepoError {
    /// Name contains a path separator or parent-directory component
    InvalidName(String),
    /// No regular file with that name in the repository
    NotFound(String),
    /// Underlying filesystem error
    Io(io::Error),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::InvalidName(name) => write!(f, "Invalid file name: {}", name),
            RepoError::NotFound(name) => write!(f, "File not found: {}", name),
            RepoError::Io(e) => write!(f, "Repository I/O error: {}", e),
        }
    }
}

impl std::error::Error for RepoError {}

impl From<io::Error> for RepoError {
    fn from(e: io::Error) -> Self {
        RepoError::Io(e)
    }
}

/// A directory of files available for download
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileRepository { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the repository directory if it does not exist yet
    pub fn ensure(&self) -> io::Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// Sorted names of the regular files in the repository. Filesystem
    /// errors are logged and reported as an empty repository.
    pub fn list(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Failed to read repository");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// Read the full contents of a named file
    pub fn read(&self, name: &str) -> Result<Vec<u8>, RepoError> {
        if !is_valid_name(name) {
            return Err(RepoError::InvalidName(name.to_string()));
        }

        let path = self.root.join(name);
        if !path.is_file() {
            return Err(RepoError::NotFound(name.to_string()));
        }
        Ok(fs::read(path)?)
    }
}

/// A bare file name: non-empty, no separators, no parent components
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn repo_with_files(files: &[(&str, &[u8])]) -> (tempfile::TempDir, FileRepository) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            let mut f = fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(data).unwrap();
        }
        let repo = FileRepository::new(dir.path());
        (dir, repo)
    }

    #[test]
    fn test_list_sorted_files_only() {
        let (dir, repo) = repo_with_files(&[("b.bin", b"\x00\x01"), ("a.txt", b"hello")]);
        fs::create_dir(dir.path().join("subdir")).unwrap();
        assert_eq!(repo.list(), vec!["a.txt", "b.bin"]);
    }

    #[test]
    fn test_read_roundtrip() {
        let (_dir, repo) = repo_with_files(&[("data.bin", b"\x00\xffhello\n\x01")]);
        let bytes = repo.read("data.bin").unwrap();
        assert_eq!(bytes, b"\x00\xffhello\n\x01");
    }

    #[test]
    fn test_read_missing_file() {
        let (_dir, repo) = repo_with_files(&[]);
        assert!(matches!(repo.read("nope.txt"), Err(RepoError::NotFound(_))));
    }

    #[test]
    fn test_read_rejects_traversal() {
        let (_dir, repo) = repo_with_files(&[]);
        assert!(matches!(
            repo.read("../secret"),
            Err(RepoError::InvalidName(_))
        ));
        assert!(matches!(repo.read(".."), Err(RepoError::InvalidName(_))));
        assert!(matches!(repo.read(""), Err(RepoError::InvalidName(_))));
    }

    #[test]
    fn test_list_empty_repository() {
        let (_dir, repo) = repo_with_files(&[]);
        assert!(repo.list().is_empty());
    }

    #[test]
    fn test_ensure_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path().join("files"));
        assert!(!repo.root().exists());
        repo.ensure().unwrap();
        assert!(repo.root().is_dir());
    }
}
