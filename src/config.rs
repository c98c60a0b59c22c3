//! Configuration management with validation and defaults
//!
//! Loaded from an optional TOML file, then overridden by `MINES_*`
//! environment variables, then validated.

use crate::errors::{CasinoResult, ConfigurationError};
use crate::ledger::{LedgerConfig, MINIMUM_GRANT};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};

/// Prizes are accumulated in f64, which is exact for integers up to 2^53
const MAX_EXACT_BET: u64 = 1 << 53;

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub ledger: LedgerSettings,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

/// HTTP listener settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Round rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub min_bet: u64,
    pub max_bet: u64,
    /// Settle automatically once every safe cell is revealed
    pub auto_cash_out_on_clear: bool,
    /// Concurrent rounds one user may have in play
    pub max_active_rounds_per_user: usize,
    pub history_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 1_000_000,
            auto_cash_out_on_clear: true,
            max_active_rounds_per_user: 1,
            history_limit: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Opening balance for a user the store has never seen
    pub initial_balance: u64,
    pub lock_timeout_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            initial_balance: 100,
            lock_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/mines_data".to_string(),
        }
    }
}

/// One accepted API key, stored as the hex SHA-256 of the key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeyEntry {
    pub user_id: String,
    pub key_sha256: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_keys: Vec<ApiKeyEntry>,
}

impl CasinoConfig {
    /// Ephemeral configuration for tests and local experiments
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            initial_balance: self.ledger.initial_balance,
            minimum_grant: MINIMUM_GRANT,
            lock_timeout: Duration::from_millis(self.ledger.lock_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> CasinoResult<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "0", "Port cannot be zero"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs", "0", "Timeout must be > 0"));
        }
        if self.game.min_bet == 0 {
            return Err(invalid("game.min_bet", "0", "Minimum bet is 1 coin"));
        }
        if self.game.max_bet < self.game.min_bet {
            return Err(invalid(
                "game.max_bet",
                &self.game.max_bet.to_string(),
                "Must not be below game.min_bet",
            ));
        }
        if self.game.max_bet > MAX_EXACT_BET {
            return Err(invalid(
                "game.max_bet",
                &self.game.max_bet.to_string(),
                "Too large for exact prize arithmetic",
            ));
        }
        if self.game.max_active_rounds_per_user == 0 {
            return Err(invalid("game.max_active_rounds_per_user", "0", "Must be > 0"));
        }
        if self.ledger.lock_timeout_ms == 0 {
            return Err(invalid("ledger.lock_timeout_ms", "0", "Must be > 0"));
        }
        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "storage.data_directory is required for the rocksdb backend".to_string(),
            )
            .into());
        }
        for entry in &self.auth.api_keys {
            if entry.user_id.is_empty() {
                return Err(ConfigurationError::ValidationFailed(
                    "auth.api_keys entries need a user_id".to_string(),
                )
                .into());
            }
            let decoded = hex::decode(&entry.key_sha256).unwrap_or_default();
            if decoded.len() != 32 {
                return Err(invalid(
                    "auth.api_keys.key_sha256",
                    &entry.key_sha256,
                    "Expected 64 hex characters",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::CasinoError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> CasinoResult<CasinoConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => CasinoConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> CasinoResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut CasinoConfig) -> CasinoResult<()> {
        if let Ok(host) = env::var("MINES_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("MINES_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "MINES_PORT".to_string(),
                value: port,
                reason: "Invalid port number".to_string(),
            })?;
        }
        if let Ok(data_dir) = env::var("MINES_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(backend) = env::var("MINES_STORAGE") {
            config.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::RocksDb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "MINES_STORAGE".to_string(),
                        value: backend,
                        reason: "Expected 'memory' or 'rocksdb'".to_string(),
                    }
                    .into())
                }
            };
        }
        if let Ok(timeout) = env::var("MINES_LOCK_TIMEOUT_MS") {
            config.ledger.lock_timeout_ms =
                timeout.parse().map_err(|_| ConfigurationError::InvalidValue {
                    field: "MINES_LOCK_TIMEOUT_MS".to_string(),
                    value: timeout,
                    reason: "Invalid timeout value".to_string(),
                })?;
        }
        Ok(())
    }

    /// Write configuration as TOML
    pub fn save(&self, config: &CasinoConfig, path: &str) -> CasinoResult<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CasinoConfig::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.game.min_bet, 1);
        assert!(config.game.auto_cash_out_on_clear);
        assert_eq!(config.ledger_config().minimum_grant, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CasinoConfig::default();
        config.game.min_bet = 0;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.game.max_bet = 0;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.auth.api_keys.push(ApiKeyEntry {
            user_id: "alice".to_string(),
            key_sha256: "abc".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CasinoConfig = toml::from_str(
            r#"
            [game]
            max_bet = 500

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.game.max_bet, 500);
        assert_eq!(config.game.min_bet, 1);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_save_and_load_config() -> CasinoResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = CasinoConfig::in_memory();
        original.game.max_active_rounds_per_user = 3;
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load_from_file(path)?;
        assert_eq!(loaded.game.max_active_rounds_per_user, 3);
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
        Ok(())
    }
}
