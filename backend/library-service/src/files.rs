//! Best-effort removal of media files from disk

use std::io;
use std::path::Path;

use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRemoval {
    Removed,
    /// Nothing at the path; counts as success
    Missing,
}

/// Remove the regular file at `path`
///
/// The path must be absolute and must not name a directory. Symlinks are
/// refused rather than followed.
pub async fn remove_media_file(path: &str) -> io::Result<FileRemoval> {
    let path = Path::new(path);
    if !path.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to delete a relative path",
        ));
    }

    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileRemoval::Missing),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }

    match fs::remove_file(path).await {
        Ok(()) => Ok(FileRemoval::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileRemoval::Missing),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removes_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"data").unwrap();

        let outcome = remove_media_file(file.to_str().unwrap()).await.unwrap();
        assert_eq!(outcome, FileRemoval::Removed);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.mkv");

        let outcome = remove_media_file(file.to_str().unwrap()).await.unwrap();
        assert_eq!(outcome, FileRemoval::Missing);
    }

    #[tokio::test]
    async fn test_refuses_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = remove_media_file(dir.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_refuses_relative_path() {
        let err = remove_media_file("movies/movie.mkv").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
