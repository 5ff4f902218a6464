use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::blob::LocalBlobStore;
use super::content_type::resolve_view_content_type;
use super::models::{FileRecord, NewFileRecord};
use super::repository::FileRepositoryTrait;
use super::validation::{sanitize_filename, FileValidator};
use crate::error::{AppError, Result};

// Blob and metadata writes are not transactional: a failed insert leaves an
// orphaned blob, and a failed blob delete still drops the row.
#[derive(Clone)]
pub struct FileManager {
    validator: FileValidator,
    blobs: LocalBlobStore,
    repository: Arc<dyn FileRepositoryTrait>,
}

impl FileManager {
    pub fn new(
        validator: FileValidator,
        blobs: LocalBlobStore,
        repository: Arc<dyn FileRepositoryTrait>,
    ) -> Self {
        Self {
            validator,
            blobs,
            repository,
        }
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    pub fn repository(&self) -> &Arc<dyn FileRepositoryTrait> {
        &self.repository
    }

    pub async fn store_file<R>(
        &self,
        filename: &str,
        content_type: &str,
        size_bytes: u64,
        content: &mut R,
    ) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tracing::debug!(
            filename = %filename,
            content_type = %content_type,
            size_bytes,
            "Processing file upload"
        );

        if !self.validator.is_allowed_type(filename) {
            return Err(AppError::Validation(format!(
                "File type not allowed. Allowed types: {}",
                self.validator.allowed_extensions().join(", ")
            )));
        }

        if !self.validator.is_allowed_size(size_bytes) {
            return Err(AppError::Validation(format!(
                "File size {} exceeds the maximum limit of {} bytes",
                size_bytes,
                self.validator.max_file_size()
            )));
        }

        let original_name = sanitize_filename(filename).ok_or_else(|| {
            AppError::Validation(format!(
                "Filename contains invalid path sequence: {}",
                filename
            ))
        })?;

        let max_file_size = self.validator.max_file_size();
        let mut limited = (&mut *content).take(max_file_size.saturating_add(1));

        let mut writer = self.blobs.put(&original_name).await?;
        let written = writer.write_from(&mut limited).await?;

        if written > max_file_size || written != size_bytes {
            let stored_name = writer.stored_name().to_string();
            writer.discard().await;
            tracing::warn!(
                stored_name = %stored_name,
                declared = size_bytes,
                written,
                "Upload body did not match its declared size"
            );

            return Err(AppError::Validation(if written > max_file_size {
                format!(
                    "File size exceeds the maximum limit of {} bytes",
                    max_file_size
                )
            } else {
                format!(
                    "File size mismatch: declared {} bytes but received {}",
                    size_bytes, written
                )
            }));
        }

        let (stored_name, path) = writer.finish().await?;

        let record = NewFileRecord {
            stored_name,
            original_name,
            storage_path: path.to_string_lossy().to_string(),
            content_type: content_type.to_string(),
            size_bytes,
        };

        let record = self.repository.insert(record).await.map_err(|e| {
            tracing::error!(
                storage_path = %path.display(),
                "Failed to save file metadata, blob left orphaned: {}",
                e
            );
            e
        })?;

        tracing::info!(
            id = record.id,
            stored_name = %record.stored_name,
            "Stored file {}",
            record.original_name
        );
        Ok(record)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.repository.get_all().await
    }

    pub async fn get_file(&self, id: i64) -> Result<FileRecord> {
        self.repository.get_by_id(id).await
    }

    pub async fn open_for_download(&self, id: i64) -> Result<(FileRecord, File)> {
        let record = self.repository.get_by_id(id).await?;

        let file = self
            .blobs
            .open_for_read(&record.stored_name)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    tracing::warn!(
                        id,
                        storage_path = %record.storage_path,
                        "File exists in database but not on filesystem"
                    );
                    AppError::NotFound(format!("File not found {}", record.stored_name))
                }
                other => other,
            })?;

        Ok((record, file))
    }

    pub async fn open_for_view(&self, id: i64) -> Result<(FileRecord, File, String)> {
        let (record, file) = self.open_for_download(id).await?;
        let content_type = resolve_view_content_type(&record.original_name, &record.content_type);
        Ok((record, file, content_type))
    }

    pub async fn delete_file(&self, id: i64) -> Result<()> {
        let record = self.repository.get_by_id(id).await?;

        match self.blobs.delete(&record.stored_name).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                id,
                storage_path = %record.storage_path,
                "File not found on filesystem during deletion"
            ),
            Err(e) => tracing::warn!(
                id,
                storage_path = %record.storage_path,
                "Failed to delete blob, removing metadata anyway: {}",
                e
            ),
        }

        self.repository.delete(&record).await?;

        tracing::info!(id, "Deleted file {}", record.original_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::repository::{FileRepository, MemoryFileRepository};
    use crate::files::validation::FileValidationConfig;
    use tempfile::TempDir;

    async fn create_test_setup() -> (FileManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let blobs = LocalBlobStore::open(temp_dir.path()).await.unwrap();
        let manager = FileManager::new(
            FileValidator::with_default_config(),
            blobs,
            Arc::new(MemoryFileRepository::new()),
        );
        (manager, temp_dir)
    }

    async fn store_bytes(manager: &FileManager, name: &str, content_type: &str, data: &[u8]) -> Result<FileRecord> {
        let mut reader = data;
        manager
            .store_file(name, content_type, data.len() as u64, &mut reader)
            .await
    }

    async fn read_all(mut file: File) -> Vec<u8> {
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_store_and_download_round_trip() {
        let (manager, _temp_dir) = create_test_setup().await;

        let record = store_bytes(&manager, "test.txt", "text/plain", b"Hello, World!")
            .await
            .unwrap();
        assert_eq!(record.original_name, "test.txt");
        assert_eq!(record.size_bytes, 13);
        assert_eq!(record.content_type, "text/plain");
        assert!(record.stored_name.ends_with(".txt"));
        assert_ne!(record.stored_name, "test.txt");

        let fetched = manager.get_file(record.id).await.unwrap();
        assert_eq!(fetched, record);

        let (downloaded, file) = manager.open_for_download(record.id).await.unwrap();
        assert_eq!(downloaded.id, record.id);
        assert_eq!(read_all(file).await, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_original_name_is_sanitized() {
        let (manager, _temp_dir) = create_test_setup().await;

        let record = store_bytes(&manager, "../../secret/notes.txt", "text/plain", b"x")
            .await
            .unwrap();
        assert_eq!(record.original_name, "notes.txt");
    }

    #[tokio::test]
    async fn test_rejects_disallowed_type() {
        let (manager, temp_dir) = create_test_setup().await;

        for name in ["script.exe", "report.csv", "noextension", "archive.zip"] {
            let result = store_bytes(&manager, name, "application/octet-stream", b"data").await;
            match result {
                Err(AppError::Validation(msg)) => assert!(msg.contains("txt, jpg, jpeg, png, json")),
                other => panic!("expected validation error for {}, got {:?}", name, other),
            }
        }

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
        assert!(manager.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_oversized_upload() {
        let (manager, _temp_dir) = create_test_setup().await;

        let declared = 10 * 1024 * 1024 + 1;
        let mut reader: &[u8] = b"small body";
        let result = manager
            .store_file("large.txt", "text/plain", declared, &mut reader)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let data = vec![0u8; 10 * 1024 * 1024 + 1];
        let result = store_bytes(&manager, "large.png", "image/png", &data).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rejects_body_longer_than_declared_size() {
        let (manager, temp_dir) = create_test_setup().await;

        let data = vec![b'a'; 10 * 1024 * 1024 + 1];
        let mut reader: &[u8] = &data;
        let result = manager
            .store_file("big.txt", "text/plain", 1, &mut reader)
            .await;

        match result {
            Err(AppError::Validation(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(manager.list_files().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_body_size_mismatch() {
        let (manager, temp_dir) = create_test_setup().await;

        let mut reader: &[u8] = b"twelve bytes";
        let result = manager
            .store_file("short.txt", "text/plain", 100, &mut reader)
            .await;

        match result {
            Err(AppError::Validation(msg)) => assert!(msg.contains("declared 100 bytes but received 12")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(manager.list_files().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_storage_fault_creates_no_record() {
        let (manager, temp_dir) = create_test_setup().await;

        // Replace the upload root with a plain file so blob creation fails.
        std::fs::remove_dir_all(temp_dir.path()).unwrap();
        std::fs::write(temp_dir.path(), b"not a directory").unwrap();

        let result = store_bytes(&manager, "notes.txt", "text/plain", b"data").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(manager.list_files().await.unwrap().is_empty());

        std::fs::remove_file(temp_dir.path()).unwrap();
        std::fs::create_dir(temp_dir.path()).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_unsafe_filename() {
        let (manager, _temp_dir) = create_test_setup().await;

        let result = store_bytes(&manager, "evil..txt", "text/plain", b"x").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (manager, _temp_dir) = create_test_setup().await;

        let record = store_bytes(&manager, "delete_me.txt", "text/plain", b"Delete this file")
            .await
            .unwrap();
        let blob_path = std::path::PathBuf::from(&record.storage_path);
        assert!(blob_path.exists());

        manager.delete_file(record.id).await.unwrap();

        assert!(!blob_path.exists());
        assert!(matches!(manager.get_file(record.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(manager.delete_file(record.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_blob_already_missing() {
        let (manager, _temp_dir) = create_test_setup().await;

        let record = store_bytes(&manager, "gone.txt", "text/plain", b"bye").await.unwrap();
        std::fs::remove_file(&record.storage_path).unwrap();

        manager.delete_file(record.id).await.unwrap();
        assert!(manager.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found_on_download() {
        let (manager, _temp_dir) = create_test_setup().await;

        let record = store_bytes(&manager, "vanished.txt", "text/plain", b"data").await.unwrap();
        std::fs::remove_file(&record.storage_path).unwrap();

        assert!(matches!(
            manager.open_for_download(record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(manager.open_for_view(record.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_view_content_type_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = LocalBlobStore::open(temp_dir.path()).await.unwrap();
        let mut config = FileValidationConfig::default();
        config.allowed_extensions.push("csv".to_string());
        let manager = FileManager::new(
            FileValidator::new(config),
            blobs,
            Arc::new(MemoryFileRepository::new()),
        );

        let csv = store_bytes(&manager, "report.CSV", "application/vnd.ms-excel", b"a,b\n1,2\n")
            .await
            .unwrap();
        let (_, file, content_type) = manager.open_for_view(csv.id).await.unwrap();
        assert_eq!(content_type, "text/csv;charset=utf-8");
        assert_eq!(read_all(file).await, b"a,b\n1,2\n");

        let png = store_bytes(&manager, "photo.png", "image/png", &[0x89, 0x50, 0x4E, 0x47])
            .await
            .unwrap();
        let (_, _, content_type) = manager.open_for_view(png.id).await.unwrap();
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_with_same_name() {
        let (manager, _temp_dir) = create_test_setup().await;

        let (first, second) = tokio::join!(
            store_bytes(&manager, "same.txt", "text/plain", b"first"),
            store_bytes(&manager, "same.txt", "text/plain", b"second"),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.stored_name, second.stored_name);

        let (_, file) = manager.open_for_download(first.id).await.unwrap();
        assert_eq!(read_all(file).await, b"first");
        let (_, file) = manager.open_for_download(second.id).await.unwrap();
        assert_eq!(read_all(file).await, b"second");
    }

    #[tokio::test]
    async fn test_list_files_returns_every_record() {
        let (manager, _temp_dir) = create_test_setup().await;

        for name in ["a.txt", "b.json", "c.png"] {
            store_bytes(&manager, name, "application/octet-stream", name.as_bytes())
                .await
                .unwrap();
        }

        let files = manager.list_files().await.unwrap();
        assert_eq!(files.len(), 3);
        for record in &files {
            assert_eq!(&manager.get_file(record.id).await.unwrap(), record);
        }
    }

    #[tokio::test]
    async fn test_orphaned_blob_when_metadata_insert_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = LocalBlobStore::open(temp_dir.path().join("uploads")).await.unwrap();

        // No migrations: the files table does not exist, so every insert fails.
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let manager = FileManager::new(
            FileValidator::with_default_config(),
            blobs.clone(),
            Arc::new(FileRepository::new(pool)),
        );

        let result = store_bytes(&manager, "orphan.txt", "text/plain", b"data").await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(std::fs::read_dir(blobs.root()).unwrap().count(), 1);
    }
}
