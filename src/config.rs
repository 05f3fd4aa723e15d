use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

/// Deployment environment; controls whether error details reach clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Per-file limit in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum number of files in one upload request
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

// Slack for multipart boundaries, part headers and the title field
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

impl UploadConfig {
    /// Largest request body accepted by the upload route
    pub fn max_request_bytes(&self) -> usize {
        let files = self.max_files.max(1) as u64;
        let total = self
            .max_file_size
            .saturating_mul(files)
            .saturating_add(FORM_OVERHEAD_BYTES);
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/documents.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_upload_dir() -> String {
    "data/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50 MiB
}

fn default_max_files() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Environment: {:?}, database: {}, uploads: {}",
            config.server.environment,
            config.database.path,
            config.storage.upload_dir
        );
        Ok(config)
    }

    /// Load configuration from the first config file found
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = [
            "docshelf.toml",
            "config.toml",
            "data/docshelf.toml",
            "data/config.toml",
        ];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    /// Format: DOCSHELF_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(val) = lookup("DOCSHELF_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("DOCSHELF_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = lookup("DOCSHELF_CONF_SERVER_ENVIRONMENT") {
            match Environment::from_str(&val) {
                Some(environment) => self.server.environment = environment,
                None => tracing::warn!("Ignoring unknown environment {:?}", val),
            }
        }

        // Database overrides
        if let Some(val) = lookup("DOCSHELF_CONF_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Some(val) = lookup("DOCSHELF_CONF_DATABASE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                self.database.max_connections = n;
            }
        }

        // Storage overrides
        if let Some(val) = lookup("DOCSHELF_CONF_STORAGE_UPLOAD_DIR") {
            self.storage.upload_dir = val;
        }

        // Upload limits
        if let Some(val) = lookup("DOCSHELF_CONF_UPLOAD_MAX_FILE_SIZE") {
            if let Ok(n) = val.parse() {
                self.upload.max_file_size = n;
            }
        }
        if let Some(val) = lookup("DOCSHELF_CONF_UPLOAD_MAX_FILES") {
            if let Ok(n) = val.parse() {
                self.upload.max_files = n;
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::create_dir_all(&self.storage.upload_dir)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.upload.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.upload.max_files, 10);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 8080
            environment = "development"

            [upload]
            max_files = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.server.environment.is_development());
        assert_eq!(config.upload.max_files, 3);
        assert_eq!(config.upload.max_file_size, default_max_file_size());
        assert_eq!(config.storage.upload_dir, "data/uploads");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCSHELF_CONF_SERVER_PORT", "9000"),
            ("DOCSHELF_CONF_SERVER_ENVIRONMENT", "dev"),
            ("DOCSHELF_CONF_DATABASE_PATH", "/tmp/docs.db"),
            ("DOCSHELF_CONF_UPLOAD_MAX_FILE_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.database.path, "/tmp/docs.db");
        assert_eq!(config.upload.max_file_size, default_max_file_size());
    }

    #[test]
    fn test_max_request_bytes_covers_all_files() {
        let upload = UploadConfig {
            max_file_size: 100,
            max_files: 4,
        };
        assert_eq!(upload.max_request_bytes(), 400 + FORM_OVERHEAD_BYTES as usize);
    }
}
