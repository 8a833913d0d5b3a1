use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// JWT secret key used to verify connection credentials
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Seconds between two cursor staleness sweeps
    #[serde(default = "default_cursor_sweep_interval_secs")]
    pub cursor_sweep_interval_secs: u64,

    /// Age in seconds after which an idle remote cursor is evicted
    #[serde(default = "default_cursor_stale_timeout_secs")]
    pub cursor_stale_timeout_secs: u64,

    /// Delay in milliseconds before the rest of a room is told about a new
    /// participant. The joiner's own snapshot is always delivered first.
    #[serde(default = "default_participant_notify_delay_ms")]
    pub participant_notify_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            auth_jwt_secret: None,
            db_url: None,
            cursor_sweep_interval_secs: default_cursor_sweep_interval_secs(),
            cursor_stale_timeout_secs: default_cursor_stale_timeout_secs(),
            participant_notify_delay_ms: default_participant_notify_delay_ms(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "codepair".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_cursor_sweep_interval_secs() -> u64 {
    10
}

fn default_cursor_stale_timeout_secs() -> u64 {
    30
}

fn default_participant_notify_delay_ms() -> u64 {
    500
}
