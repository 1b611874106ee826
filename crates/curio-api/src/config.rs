// Process configuration loaded from environment variables.

use std::time::Duration;

/// Deployment environment; controls the `Secure` cookie attribute and how
/// much error detail leaks into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub env: Environment,
    pub bind_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Directory uploaded images are stored under (the fixed, trusted root).
    pub upload_dir: String,
    /// Hard ceiling for a single upload request body.
    pub max_upload_bytes: usize,
    /// How long in-flight requests get to drain after a shutdown signal.
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: String::new(),
            db_max_connections: 10,
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except `DATABASE_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))?;

        Ok(Self {
            env: Environment::from_str(&env_or("APP_ENV", "")),
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            database_url,
            db_max_connections: env_parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            upload_dir: env_or("UPLOAD_DIR", &defaults.upload_dir),
            max_upload_bytes: env_parsed("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            shutdown_grace: Duration::from_secs(env_parsed("SHUTDOWN_GRACE_SECS", 10)),
        })
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
