pub mod blob;
pub mod content_type;
pub mod manager;
pub mod models;
pub mod repository;
pub mod validation;

pub use blob::{BlobWriter, LocalBlobStore};
pub use content_type::{guess_content_type, resolve_view_content_type};
pub use manager::FileManager;
pub use models::{FileRecord, NewFileRecord};
pub use repository::{FileRepository, FileRepositoryTrait, MemoryFileRepository};
pub use validation::{sanitize_filename, FileValidationConfig, FileValidator};
