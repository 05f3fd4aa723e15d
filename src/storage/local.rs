use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{AppError, Result};
use crate::storage::{BlobReader, StorageProvider, StoredBlob};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Local file system storage provider
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn get_full_path(&self, name: &str) -> Result<PathBuf> {
        // Storage names are server-generated; anything path-like is a bug upstream
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(AppError::Internal(format!("Invalid blob name: {:?}", name)));
        }
        Ok(self.base_path.join(name))
    }

    async fn copy_into(
        file: &mut fs::File,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_size: u64,
    ) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| {
                AppError::validation(
                    "upload_interrupted",
                    format!("Failed to read uploaded data: {}", e),
                )
            })?;
            if n == 0 {
                break;
            }

            written += n as u64;
            if written > max_size {
                return Err(AppError::validation(
                    "file_too_large",
                    format!("File size cannot exceed {} bytes", max_size),
                ));
            }

            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn put_reader(
        &self,
        name: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_size: u64,
    ) -> Result<StoredBlob> {
        let full_path = self.get_full_path(name)?;

        fs::create_dir_all(&self.base_path).await?;

        // create_new: never clobber an existing blob
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await?;

        match Self::copy_into(&mut file, reader, max_size).await {
            Ok(size) => {
                tracing::debug!("Saved {} bytes to {:?}", size, full_path);
                Ok(StoredBlob {
                    path: full_path.to_string_lossy().into_owned(),
                    size,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(&full_path).await {
                    tracing::warn!("Failed to remove partial blob {:?}: {}", full_path, remove_err);
                }
                Err(e)
            }
        }
    }

    async fn open(&self, path: &str) -> Result<BlobReader> {
        let file = fs::File::open(Path::new(path)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                AppError::BlobMissing("The file has been deleted from storage".to_string())
            } else {
                AppError::Storage(format!("Failed to open {}: {}", path, e))
            }
        })?;

        Ok(Box::new(file))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut data: &[u8] = b"hello blob store";
        let blob = storage.put_reader("a.txt", &mut data, 1024).await.unwrap();
        assert_eq!(blob.size, 16);
        assert!(Path::new(&blob.path).is_file());

        let mut reader = storage.open(&blob.path).await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello blob store");
    }

    #[tokio::test]
    async fn test_put_creates_missing_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("nested").join("uploads"));

        let mut data: &[u8] = b"x";
        let blob = storage.put_reader("b", &mut data, 10).await.unwrap();
        assert!(Path::new(&blob.path).is_file());
    }

    #[tokio::test]
    async fn test_oversized_blob_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let payload = vec![7u8; 300];
        let mut data: &[u8] = &payload;
        let err = storage.put_reader("big.bin", &mut data, 100).await.unwrap_err();
        assert_eq!(err.code(), "file_too_large");
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn test_existing_name_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut first: &[u8] = b"first";
        storage.put_reader("same", &mut first, 100).await.unwrap();
        let mut second: &[u8] = b"second";
        assert!(storage.put_reader("same", &mut second, 100).await.is_err());

        let content = std::fs::read(dir.path().join("same")).unwrap();
        assert_eq!(content, b"first");
    }

    #[tokio::test]
    async fn test_path_like_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut data: &[u8] = b"x";
        assert!(storage.put_reader("../escape", &mut data, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let path = dir.path().join("gone").to_string_lossy().into_owned();

        let err = storage.open(&path).await.err().unwrap();
        assert!(matches!(err, AppError::BlobMissing(_)));
        // Deleting twice is fine
        storage.delete(&path).await.unwrap();
    }
}
