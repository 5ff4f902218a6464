use crate::config::{StorageConfig, DEFAULT_MAX_FILE_SIZE_BYTES};

#[derive(Debug, Clone)]
pub struct FileValidationConfig {
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for FileValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_extensions: ["txt", "jpg", "jpeg", "png", "json"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl From<&StorageConfig> for FileValidationConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_file_size: config.max_file_size_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    config: FileValidationConfig,
}

impl FileValidator {
    pub fn new(config: FileValidationConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(FileValidationConfig::default())
    }

    pub fn is_allowed_type(&self, filename: &str) -> bool {
        match extension_of(filename) {
            Some(ext) => {
                let ext = ext.to_lowercase();
                self.config.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    pub fn is_allowed_size(&self, size_bytes: u64) -> bool {
        size_bytes <= self.config.max_file_size
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.config.allowed_extensions
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }
}

pub fn extension_of(filename: &str) -> Option<&str> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

pub fn sanitize_filename(filename: &str) -> Option<String> {
    let normalized = filename.replace('\\', "/");
    let name = normalized.rsplit('/').next().unwrap_or("").trim();

    if name.is_empty() || name == "." || name.contains("..") || name.contains('\0') {
        return None;
    }

    Some(name.to_string())
}
