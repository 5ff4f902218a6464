use droplite_core::{build_state, AppConfig, AppError, AppState, FileManager, FileRecord};
use std::collections::HashSet;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncReadExt;

async fn setup_sqlite_state() -> (AppState, TempDir, NamedTempFile) {
    let temp_dir = TempDir::new().unwrap();
    let temp_file = NamedTempFile::new().unwrap();

    let mut config = AppConfig::default();
    config.storage.upload_dir = temp_dir.path().join("uploads");
    config.storage.allowed_extensions.push("csv".to_string());
    config.database.url = format!("sqlite:{}", temp_file.path().display());

    let state = build_state(&config).await.unwrap();
    (state, temp_dir, temp_file)
}

async fn store(manager: &FileManager, name: &str, content_type: &str, data: &[u8]) -> droplite_core::Result<FileRecord> {
    let mut reader = data;
    manager
        .store_file(name, content_type, data.len() as u64, &mut reader)
        .await
}

#[tokio::test]
async fn test_sqlite_lifecycle() {
    let (state, temp_dir, _db) = setup_sqlite_state().await;
    let manager = &state.file_manager;

    assert!(state.db_manager.is_some());
    state.db_manager.as_ref().unwrap().health_check().await.unwrap();

    let record = store(manager, "folder/report.CSV", "text/csv", b"a,b\n").await.unwrap();
    assert_eq!(record.original_name, "report.CSV");
    assert!(record.stored_name.ends_with(".CSV"));
    assert!(std::path::Path::new(&record.storage_path).starts_with(
        std::fs::canonicalize(temp_dir.path().join("uploads")).unwrap()
    ));

    let (_, mut file, content_type) = manager.open_for_view(record.id).await.unwrap();
    assert_eq!(content_type, "text/csv;charset=utf-8");
    let mut data = Vec::new();
    file.read_to_end(&mut data).await.unwrap();
    assert_eq!(data, b"a,b\n");

    manager.delete_file(record.id).await.unwrap();
    assert!(matches!(manager.get_file(record.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(manager.delete_file(record.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_sqlite_list_after_three_stores() {
    let (state, _temp_dir, _db) = setup_sqlite_state().await;
    let manager = &state.file_manager;

    let mut ids = Vec::new();
    for (name, content_type) in [("a.txt", "text/plain"), ("b.png", "image/png"), ("c.json", "application/json")] {
        ids.push(store(manager, name, content_type, name.as_bytes()).await.unwrap().id);
    }

    let files = manager.list_files().await.unwrap();
    assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), ids);

    for record in &files {
        let fetched = manager.get_file(record.id).await.unwrap();
        assert_eq!(&fetched, record);
    }
}

#[tokio::test]
async fn test_sqlite_concurrent_uploads_same_name() {
    let (state, _temp_dir, _db) = setup_sqlite_state().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = state.file_manager.clone();
        handles.push(tokio::spawn(async move {
            let data = format!("payload {}", i).into_bytes();
            let result = store(&manager, "same.txt", "text/plain", &data).await;
            result.map(|record| (record, data))
        }));
    }

    let mut stored_names = HashSet::new();
    for handle in handles {
        let (record, data) = handle.await.unwrap().unwrap();
        assert!(stored_names.insert(record.stored_name.clone()));

        let (_, mut file) = state.file_manager.open_for_download(record.id).await.unwrap();
        let mut read_back = Vec::new();
        file.read_to_end(&mut read_back).await.unwrap();
        assert_eq!(read_back, data);
    }

    assert_eq!(state.file_manager.list_files().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_sqlite_records_survive_new_state() {
    let temp_dir = TempDir::new().unwrap();
    let temp_file = NamedTempFile::new().unwrap();

    let mut config = AppConfig::default();
    config.storage.upload_dir = temp_dir.path().join("uploads");
    config.database.url = format!("sqlite:{}", temp_file.path().display());

    let first = build_state(&config).await.unwrap();
    let record = store(&first.file_manager, "keep.txt", "text/plain", b"kept").await.unwrap();

    let second = build_state(&config).await.unwrap();
    let fetched = second.file_manager.get_file(record.id).await.unwrap();
    assert_eq!(fetched, record);
}
