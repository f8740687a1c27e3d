use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use farm_api::{HttpServerConfig, DEFAULT_MAX_ATTACHMENT_BYTES};
use serde::{Deserialize, Serialize};

/// Where farm records are kept
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Where chat attachments are kept
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Nats,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Allow any origin, method and header
    #[serde(default)]
    pub cors_enabled: bool,

    // Storage selection
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    #[serde(default = "default_blob_backend")]
    pub blob_backend: BlobBackend,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Apply embedded schema migrations at startup
    #[serde(default = "default_true")]
    pub postgres_run_migrations: bool,

    // NATS configuration
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Object store bucket holding chat attachments
    #[serde(default = "default_nats_object_store_bucket")]
    pub nats_object_store_bucket: String,

    /// Upper bound on one attachment, in bytes
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,

    // JWT configuration
    /// Shared HS256 secret of the identity context
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,

    // Seed data for the in-memory directory (comma-separated)
    /// `animal_id:owner_id` pairs
    #[serde(default)]
    pub memory_animals: String,

    /// Veterinarian user ids
    #[serde(default)]
    pub memory_veterinarians: String,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // Lifecycle
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_blob_backend() -> BlobBackend {
    BlobBackend::Nats
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "farm".to_string()
}

fn default_postgres_username() -> String {
    "farm".to_string()
}

fn default_postgres_password() -> String {
    "farm".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_object_store_bucket() -> String {
    "farm-attachments".to_string()
}

fn default_max_attachment_bytes() -> usize {
    DEFAULT_MAX_ATTACHMENT_BYTES
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_jwt_expiration_hours() -> u64 {
    24
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "farm".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_closer_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FARM"))
            .build()?
            .try_deserialize()
    }

    pub fn http(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            cors_enabled: self.cors_enabled,
        }
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            run_migrations: self.postgres_run_migrations,
        }
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    /// Parsed `memory_animals`; malformed entries are skipped
    pub fn seeded_animals(&self) -> Vec<(String, String)> {
        split_list(&self.memory_animals)
            .filter_map(|entry| {
                let (animal, owner) = entry.split_once(':')?;
                let (animal, owner) = (animal.trim(), owner.trim());
                (!animal.is_empty() && !owner.is_empty())
                    .then(|| (animal.to_string(), owner.to_string()))
            })
            .collect()
    }

    pub fn seeded_veterinarians(&self) -> Vec<String> {
        split_list(&self.memory_veterinarians)
            .map(str::to_string)
            .collect()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touch process-wide environment variables
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "FARM_LOG_LEVEL",
        "FARM_HTTP_PORT",
        "FARM_STORAGE_BACKEND",
        "FARM_BLOB_BACKEND",
        "FARM_MAX_ATTACHMENT_BYTES",
        "FARM_MEMORY_ANIMALS",
        "FARM_MEMORY_VETERINARIANS",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: Test runs with mutex lock to prevent concurrent env access
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.blob_backend, BlobBackend::Nats);
        assert_eq!(config.max_attachment_bytes, 10 * 1024 * 1024);
        assert!(config.postgres_run_migrations);
        assert!(config.seeded_animals().is_empty());
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("FARM_LOG_LEVEL", "debug");
            std::env::set_var("FARM_HTTP_PORT", "9090");
            std::env::set_var("FARM_STORAGE_BACKEND", "memory");
            std::env::set_var("FARM_BLOB_BACKEND", "memory");
            std::env::set_var("FARM_MAX_ATTACHMENT_BYTES", "2048");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.http().port, 9090);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.blob_backend, BlobBackend::Memory);
        assert_eq!(config.max_attachment_bytes, 2048);

        clear_env();
    }

    #[test]
    fn test_memory_seed_parsing() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("FARM_MEMORY_ANIMALS", "10:1, 11:1,bad, :3");
            std::env::set_var("FARM_MEMORY_VETERINARIANS", "5, ,6");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(
            config.seeded_animals(),
            vec![
                ("10".to_string(), "1".to_string()),
                ("11".to_string(), "1".to_string())
            ]
        );
        assert_eq!(config.seeded_veterinarians(), vec!["5", "6"]);

        clear_env();
    }
}
