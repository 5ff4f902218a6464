pub mod settings;

pub use settings::{
    AppConfig, CorsConfig, DatabaseConfig, ServerConfig, StorageConfig,
    DEFAULT_MAX_FILE_SIZE_BYTES, MEMORY_DATABASE_URL,
};
