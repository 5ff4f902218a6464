use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::Storage(format!(
                "Could not create upload directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = fs::canonicalize(&root).await.map_err(|e| {
            AppError::Storage(format!(
                "Could not resolve upload directory {}: {}",
                root.display(),
                e
            ))
        })?;

        tracing::info!("Blob store ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn put(&self, name_hint: &str) -> Result<BlobWriter> {
        let stored_name = generate_stored_name(name_hint);
        let path = self.root.join(&stored_name);

        fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::Storage(format!(
                "Could not create upload directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let file = fs::File::create(&path).await.map_err(|e| {
            AppError::Storage(format!("Could not create {}: {}", path.display(), e))
        })?;

        tracing::debug!("Opened blob {} for writing", path.display());
        Ok(BlobWriter {
            stored_name,
            path,
            file,
        })
    }

    pub async fn open_for_read(&self, stored_name: &str) -> Result<fs::File> {
        let path = self
            .blob_path(stored_name)
            .ok_or_else(|| AppError::NotFound(format!("Blob not found: {}", stored_name)))?;

        fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Blob not found: {}", stored_name))
            } else {
                AppError::Storage(format!("Failed to open {}: {}", path.display(), e))
            }
        })
    }

    pub async fn exists(&self, stored_name: &str) -> bool {
        match self.blob_path(stored_name) {
            Some(path) => fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            None => false,
        }
    }

    pub async fn delete(&self, stored_name: &str) -> Result<bool> {
        let Some(path) = self.blob_path(stored_name) else {
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    // Only a single plain path component resolves.
    fn blob_path(&self, stored_name: &str) -> Option<PathBuf> {
        if stored_name.is_empty() || stored_name.contains("..") {
            return None;
        }

        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(stored_name)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct BlobWriter {
    stored_name: String,
    path: PathBuf,
    file: fs::File,
}

impl BlobWriter {
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tokio::io::copy(reader, &mut self.file).await.map_err(|e| {
            AppError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    pub async fn discard(self) {
        let BlobWriter { path, file, .. } = self;
        drop(file);

        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!("Failed to remove discarded blob {}: {}", path.display(), e);
        }
    }

    pub async fn finish(mut self) -> Result<(String, PathBuf)> {
        self.file.flush().await.map_err(|e| {
            AppError::Storage(format!("Failed to flush {}: {}", self.path.display(), e))
        })?;
        self.file.sync_all().await.map_err(|e| {
            AppError::Storage(format!("Failed to sync {}: {}", self.path.display(), e))
        })?;

        Ok((self.stored_name, self.path))
    }
}

fn generate_stored_name(name_hint: &str) -> String {
    let id = Uuid::new_v4();
    match super::validation::extension_of(name_hint) {
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => format!("{}.{}", id, ext),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn create_test_store() -> (LocalBlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(temp_dir.path().join("uploads")).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let (store, _temp_dir) = create_test_store().await;
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_put_read_delete() {
        let (store, _temp_dir) = create_test_store().await;

        let mut writer = store.put("hello.txt").await.unwrap();
        let written = writer.write_from(&mut &b"Hello, World!"[..]).await.unwrap();
        assert_eq!(written, 13);
        let (stored_name, path) = writer.finish().await.unwrap();

        assert!(stored_name.ends_with(".txt"));
        assert_eq!(path.parent().unwrap(), store.root());
        assert!(store.exists(&stored_name).await);

        let mut data = Vec::new();
        store
            .open_for_read(&stored_name)
            .await
            .unwrap()
            .read_to_end(&mut data)
            .await
            .unwrap();
        assert_eq!(data, b"Hello, World!");

        assert!(store.delete(&stored_name).await.unwrap());
        assert!(!store.exists(&stored_name).await);
        assert!(!store.delete(&stored_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let (store, _temp_dir) = create_test_store().await;

        let result = store.open_for_read("missing.txt").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_names_are_rejected() {
        let (store, temp_dir) = create_test_store().await;
        std::fs::write(temp_dir.path().join("outside.txt"), b"secret").unwrap();

        assert!(!store.exists("../outside.txt").await);
        assert!(!store.delete("../outside.txt").await.unwrap());
        assert!(matches!(
            store.open_for_read("../outside.txt").await,
            Err(AppError::NotFound(_))
        ));
        assert!(temp_dir.path().join("outside.txt").exists());
    }

    #[test]
    fn test_generate_stored_name() {
        let name = generate_stored_name("photo.png");
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 36 + 4);

        let bare = generate_stored_name("README");
        assert!(Uuid::parse_str(&bare).is_ok());

        let odd = generate_stored_name("x.t/x");
        assert!(Uuid::parse_str(&odd).is_ok());

        assert_ne!(generate_stored_name("a.txt"), generate_stored_name("a.txt"));
    }
}
