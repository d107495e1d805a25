use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

/// Custom deserializer that handles port as both number and string
///
/// Accepts:
/// - `port: 5432` (number)
/// - `port: "5432"` (string that parses to number)
/// - `port: ${DB_PORT}` (env var substituted to either)
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid port number: '{}'", s))),
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
}

fn default_initial_delay() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_include_air_quality")]
    pub include_air_quality: bool,
}

fn default_base_url() -> String {
    "https://api.weatherapi.com/v1".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent_fetches() -> usize {
    1 // sequential
}

fn default_include_air_quality() -> bool {
    true
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub cities: Vec<String>,
    #[serde(default)]
    pub flush: FlushPolicy,
    #[serde(default)]
    pub validation: ValidationPolicy,
}

/// When accumulated records are handed to the sink.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Once, after every city has been attempted.
    #[default]
    EndOfPass,
    /// After every accepted city. Records from a failed flush stay pending and
    /// are retried on the next flush, so delivery is at-least-once.
    PerCity,
}

/// What happens to records the validator flags.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Log the problem and load the record anyway.
    #[default]
    Advisory,
    /// Drop the record before it reaches the sink.
    Reject,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Valid port ranges
    /// - Non-empty required fields
    /// - Positive time intervals and timeouts
    /// - Valid URL formats
    /// - A usable city list
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("DB_HOST", &self.database.host),
            ("DB_NAME", &self.database.name),
            ("DB_USER", &self.database.user),
            ("DB_PASSWORD", &self.database.password),
            ("WEATHER_API_KEY", &self.source.api_key),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} environment variable is not set. \
                     Please set it or create a .env file. \
                     See .env.example for required variables.",
                    field_name
                )));
            }
        }

        if self.database.host.is_empty() {
            return Err(AppError::Config(
                "Database host cannot be empty".to_string(),
            ));
        }

        if self.database.name.is_empty() {
            return Err(AppError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }

        if self.database.user.is_empty() {
            return Err(AppError::Config(
                "Database user cannot be empty".to_string(),
            ));
        }

        // u16 max is 65535, so no upper bound check needed
        if self.database.port == 0 {
            return Err(AppError::Config("Database port cannot be 0".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        if self.database.max_connections > 100 {
            return Err(AppError::Config(format!(
                "Database max_connections {} seems too high, maximum recommended is 100",
                self.database.max_connections
            )));
        }

        if self.scheduler.interval_minutes == 0 {
            return Err(AppError::Config(
                "Scheduler interval_minutes must be greater than 0".to_string(),
            ));
        }

        // WeatherAPI free tier refreshes current conditions every 15 minutes
        if self.scheduler.interval_minutes < 15 {
            tracing::warn!(
                "Scheduler interval of {} minutes is shorter than the provider refresh rate, \
                 consider using at least 15 minutes",
                self.scheduler.interval_minutes
            );
        }

        match url::Url::parse(&self.source.base_url) {
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Invalid source base_url '{}': {}",
                    self.source.base_url, e
                )));
            }
            // The API key travels in the query string
            Ok(parsed) if parsed.scheme() != "https" => {
                return Err(AppError::Config(format!(
                    "Source base_url must use HTTPS, got: {}",
                    parsed.scheme()
                )));
            }
            Ok(_) => {}
        }

        if self.source.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "Source api_key cannot be empty".to_string(),
            ));
        }

        if self.source.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "Source request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.source.max_concurrent_fetches == 0 || self.source.max_concurrent_fetches > 32 {
            return Err(AppError::Config(format!(
                "Source max_concurrent_fetches must be between 1 and 32, got {}",
                self.source.max_concurrent_fetches
            )));
        }

        if self.pipeline.cities.is_empty() {
            return Err(AppError::Config(
                "Pipeline cities list cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for city in &self.pipeline.cities {
            if city.trim().is_empty() {
                return Err(AppError::Config(
                    "Pipeline cities cannot contain an empty name".to_string(),
                ));
            }
            if !seen.insert(city.as_str()) {
                tracing::warn!(
                    "City '{}' is listed more than once and will be fetched twice per run",
                    city
                );
            }
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid env var pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
