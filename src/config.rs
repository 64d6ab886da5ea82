use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Smallest token size accepted, in bytes (128 bits of entropy).
pub const MIN_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub security: SecurityConfig,

    pub mail: MailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/latchkey.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Use the smallest Argon2 parameters instead of the configured costs.
    /// Only meant for test suites; digests stay verifiable either way since
    /// the parameters are embedded in each digest.
    pub min_cost: bool,

    /// Random bytes per remember/activation token (default: 32, minimum: 16)
    pub token_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_cost: false,
            token_bytes: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// Print outgoing mail to stdout.
    Console,
    /// Record recipient and subject in the log, drop the body.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Public base URL used to build activation links
    pub base_url: String,

    pub from: String,

    pub delivery: DeliveryMethod,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            from: "noreply@example.com".to_string(),
            delivery: DeliveryMethod::Console,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Install the Prometheus recorder for account counters
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("latchkey").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".latchkey").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.token_bytes < MIN_TOKEN_BYTES {
            anyhow::bail!(
                "security.token_bytes must be at least {MIN_TOKEN_BYTES} (got {})",
                self.security.token_bytes
            );
        }

        if !self.security.min_cost
            && (self.security.argon2_memory_cost_kib == 0
                || self.security.argon2_time_cost == 0
                || self.security.argon2_parallelism == 0)
        {
            anyhow::bail!("Argon2 costs must be > 0 unless security.min_cost is set");
        }

        if self.mail.base_url.trim().is_empty() {
            anyhow::bail!("mail.base_url cannot be empty");
        }

        Ok(())
    }
}
