use serde::Deserialize;
use std::env;
use std::str::FromStr;

// Top-level container for every setting, read once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub ledger: LedgerConfig,
}

// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => Err(format!("expected 'memory' or 'postgres', got '{}'", other)),
        }
    }
}

// Where seats, stock, tickets and payments live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub pool_size: u32,
}

// Redis is only used to publish seat changes; leave REDIS_URL unset to skip it
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Hold lifecycle and seat map layout
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub hold_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub seats_per_row: u32,
    pub premium_rows: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: 300,
            sweep_interval_seconds: 30,
            seats_per_row: 10,
            premium_rows: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let storage = StorageConfig {
            backend: parse_or(&lookup, "STORAGE", StorageBackend::Memory)?,
            database_url: lookup("DATABASE_URL"),
            pool_size: parse_or(&lookup, "DB_POOL_SIZE", 20)?,
        };
        if storage.backend == StorageBackend::Postgres && storage.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let ledger = LedgerConfig {
            hold_ttl_seconds: parse_or(&lookup, "HOLD_TTL_SECONDS", defaults.hold_ttl_seconds)?,
            sweep_interval_seconds: parse_or(&lookup, "SWEEP_INTERVAL_SECONDS", defaults.sweep_interval_seconds)?,
            seats_per_row: parse_or(&lookup, "SEATS_PER_ROW", defaults.seats_per_row)?,
            premium_rows: parse_or(&lookup, "PREMIUM_ROWS", defaults.premium_rows)?,
        };
        if ledger.seats_per_row == 0 {
            return Err(ConfigError::Invalid {
                name: "SEATS_PER_ROW",
                reason: "must be at least 1".to_string(),
            });
        }
        if ledger.hold_ttl_seconds == 0 || ledger.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "HOLD_TTL_SECONDS/SWEEP_INTERVAL_SECONDS",
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Config {
            app: AppConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8000)?,
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: lookup("RUST_LOG")
                    .unwrap_or_else(|| "cinema_ticketing=debug,tower_http=debug".to_string()),
            },
            storage,
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            },
            ledger,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
