use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::models::{FileRecord, NewFileRecord};
use crate::error::{AppError, Result};

#[async_trait]
pub trait FileRepositoryTrait: Send + Sync {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord>;
    async fn get_by_id(&self, id: i64) -> Result<FileRecord>;
    async fn get_all(&self) -> Result<Vec<FileRecord>>;
    async fn delete(&self, record: &FileRecord) -> Result<()>;
    async fn count(&self) -> Result<u64>;
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("File not found with id {}", id))
}

#[derive(Clone)]
pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &SqliteRow) -> Result<FileRecord> {
        let created_at = DateTime::parse_from_rfc3339(&row.try_get::<String, _>("created_at")?)
            .map_err(|e| AppError::Database(format!("Invalid datetime: {}", e)))?
            .with_timezone(&Utc);

        Ok(FileRecord {
            id: row.try_get("id")?,
            stored_name: row.try_get("stored_name")?,
            original_name: row.try_get("original_name")?,
            storage_path: row.try_get("storage_path")?,
            content_type: row.try_get("content_type")?,
            size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
            created_at,
        })
    }
}

#[async_trait]
impl FileRepositoryTrait for FileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO files (stored_name, original_name, storage_path, content_type, size_bytes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.stored_name)
        .bind(&record.original_name)
        .bind(&record.storage_path)
        .bind(&record.content_type)
        .bind(record.size_bytes as i64)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record.into_record(result.last_insert_rowid(), created_at))
    }

    async fn get_by_id(&self, id: i64) -> Result<FileRecord> {
        let row = sqlx::query(
            "SELECT id, stored_name, original_name, storage_path, content_type, size_bytes, created_at FROM files WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(&row),
            None => Err(not_found(id)),
        }
    }

    async fn get_all(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, stored_name, original_name, storage_path, content_type, size_bytes, created_at FROM files ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, record: &FileRecord) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(record.id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            tracing::debug!("Metadata row {} was already gone", record.id);
        }

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM files")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("count")? as u64)
    }
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<i64, FileRecord>,
    next_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryFileRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileRepositoryTrait for MemoryFileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord> {
        let mut state = self.state.write();
        state.next_id += 1;
        let record = record.into_record(state.next_id, Utc::now());
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<FileRecord> {
        self.state
            .read()
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn get_all(&self) -> Result<Vec<FileRecord>> {
        Ok(self.state.read().records.values().cloned().collect())
    }

    async fn delete(&self, record: &FileRecord) -> Result<()> {
        self.state.write().records.remove(&record.id);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.read().records.len() as u64)
    }
}
