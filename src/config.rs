use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "caixa", about = "Caixa - Banking account ledger API")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "caixa.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// SQLite database path (overrides config file)
    #[arg(short, long)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_atm")]
    pub atm: AtmConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    /// SQLite database path; `:memory:` is accepted.
    #[serde(default = "default_database")]
    pub database: String,
}

/// The note mix this installation dispenses and the deposit floor.
#[derive(Debug, Deserialize, Clone)]
pub struct AtmConfig {
    #[serde(default = "default_denominations")]
    pub denominations: Vec<i64>,

    #[serde(default)]
    pub minimum_deposit: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health and /metrics) require
    /// an API key.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key has a name (for audit logging).
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: default_storage_kind(),
        database: default_database(),
    }
}

fn default_atm() -> AtmConfig {
    AtmConfig {
        denominations: default_denominations(),
        minimum_deposit: 0,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Sqlite
}

fn default_database() -> String {
    "caixa.db".to_string()
}

fn default_denominations() -> Vec<i64> {
    vec![20, 50, 100]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: default_storage(),
            atm: default_atm(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref database) = cli.database {
            config.storage.database = database.clone();
        }

        config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid listen address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, StorageKind::Sqlite);
        assert_eq!(config.atm.denominations, vec![20, 50, 100]);
        assert_eq!(config.atm.minimum_deposit, 0);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn sections_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [storage]
            backend = "memory"

            [atm]
            denominations = [2, 5, 10]
            minimum_deposit = 5

            [auth]
            enabled = true
            api_keys = [{ name = "ops", key = "secret" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert_eq!(config.atm.denominations, vec![2, 5, 10]);
        assert_eq!(config.atm.minimum_deposit, 5);
        assert_eq!(config.auth.api_keys.len(), 1);
    }
}
