use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    #[serde(rename = "filename")]
    pub stored_name: String,
    #[serde(rename = "originalFilename")]
    pub original_name: String,
    #[serde(rename = "path")]
    pub storage_path: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub stored_name: String,
    pub original_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl NewFileRecord {
    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id,
            stored_name: self.stored_name,
            original_name: self.original_name,
            storage_path: self.storage_path,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            created_at,
        }
    }
}
