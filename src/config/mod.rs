//! Configuration management
//!
//! Configuration is loaded from `config.yml` and then overridden by
//! `NEWSDESK_*` environment variables. Missing values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:5000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/newsdesk.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL (optional)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Upper bound on entry lifetime, in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a login session stays valid, in seconds
    #[serde(default = "default_session_lifetime")]
    pub lifetime_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_seconds: default_session_lifetime(),
        }
    }
}

fn default_session_lifetime() -> u64 {
    2 * 24 * 3600
}

/// Longest accepted session lifetime: ten years
pub const MAX_SESSION_LIFETIME_SECONDS: u64 = 10 * 365 * 24 * 3600;

impl SessionConfig {
    /// Session lifetime as a signed duration
    pub fn lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.lifetime_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "session lifetime of {} seconds is out of range",
                    self.lifetime_seconds
                ))
            })
    }
}

/// Image challenge and SMS code settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_code_ttl")]
    pub image_code_ttl_seconds: u64,
    #[serde(default = "default_code_ttl")]
    pub sms_code_ttl_seconds: u64,
    /// Template id passed to the SMS gateway
    #[serde(default = "default_sms_template_id")]
    pub sms_template_id: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            image_code_ttl_seconds: default_code_ttl(),
            sms_code_ttl_seconds: default_code_ttl(),
            sms_template_id: default_sms_template_id(),
        }
    }
}

fn default_code_ttl() -> u64 {
    300
}

fn default_sms_template_id() -> u32 {
    1
}

/// SMS gateway driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmsDriver {
    /// Write codes to the log instead of sending them
    #[default]
    Log,
    /// RongLian (Yuntongxun) template SMS
    Ronglian,
}

/// SMS gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub driver: SmsDriver,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default = "default_sms_base_url")]
    pub base_url: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            driver: SmsDriver::default(),
            account_sid: String::new(),
            auth_token: String::new(),
            app_id: String::new(),
            base_url: default_sms_base_url(),
        }
    }
}

fn default_sms_base_url() -> String {
    "https://app.cloopen.com:8883/2013-12-26".to_string()
}

/// Object storage driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// Files written to a local directory
    #[default]
    Local,
    /// Qiniu cloud object storage
    Qiniu,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub driver: StorageDriver,
    /// Prefix joined with a stored key to form the public URL
    #[serde(default = "default_domain_prefix")]
    pub domain_prefix: String,
    /// Directory used by the local driver
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Maximum upload size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: StorageDriver::default(),
            domain_prefix: default_domain_prefix(),
            path: default_storage_path(),
            max_file_size: default_max_file_size(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: default_bucket(),
            upload_url: default_upload_url(),
        }
    }
}

fn default_domain_prefix() -> String {
    "http://oyucyko3w.bkt.clouddn.com/".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_bucket() -> String {
    "ihome".to_string()
}

fn default_upload_url() -> String {
    "https://upload.qiniup.com".to_string()
}

/// Page sizes for the user listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Collected, authored and other-user news per page
    #[serde(default = "default_news_per_page")]
    pub news_per_page: i64,
    /// Followed users per page
    #[serde(default = "default_followed_per_page")]
    pub followed_per_page: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            news_per_page: default_news_per_page(),
            followed_per_page: default_followed_per_page(),
        }
    }
}

fn default_news_per_page() -> i64 {
    10
}

fn default_followed_per_page() -> i64 {
    4
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration.
    /// Invalid YAML is reported with its line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognized variables:
    /// - NEWSDESK_SERVER_HOST, NEWSDESK_SERVER_PORT, NEWSDESK_SERVER_CORS_ORIGIN
    /// - NEWSDESK_DATABASE_DRIVER, NEWSDESK_DATABASE_URL
    /// - NEWSDESK_CACHE_DRIVER, NEWSDESK_CACHE_REDIS_URL
    /// - NEWSDESK_SMS_DRIVER, NEWSDESK_SMS_ACCOUNT_SID, NEWSDESK_SMS_AUTH_TOKEN, NEWSDESK_SMS_APP_ID
    /// - NEWSDESK_STORAGE_DRIVER, NEWSDESK_STORAGE_ACCESS_KEY, NEWSDESK_STORAGE_SECRET_KEY,
    ///   NEWSDESK_STORAGE_BUCKET, NEWSDESK_STORAGE_DOMAIN_PREFIX
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values no request could work with
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.news_per_page < 1 || self.pagination.followed_per_page < 1 {
            return Err(ConfigError::ValidationError(
                "page sizes must be at least 1".to_string(),
            ));
        }
        if self.verification.image_code_ttl_seconds == 0
            || self.verification.sms_code_ttl_seconds == 0
        {
            return Err(ConfigError::ValidationError(
                "verification code lifetimes must be positive".to_string(),
            ));
        }
        if self.session.lifetime_seconds == 0
            || self.session.lifetime_seconds > MAX_SESSION_LIFETIME_SECONDS
        {
            return Err(ConfigError::ValidationError(format!(
                "session lifetime must be between 1 and {} seconds",
                MAX_SESSION_LIFETIME_SECONDS
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("NEWSDESK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("NEWSDESK_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("NEWSDESK_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("NEWSDESK_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("NEWSDESK_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("NEWSDESK_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("NEWSDESK_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }

        if let Ok(driver) = std::env::var("NEWSDESK_SMS_DRIVER") {
            match driver.to_lowercase().as_str() {
                "log" => self.sms.driver = SmsDriver::Log,
                "ronglian" => self.sms.driver = SmsDriver::Ronglian,
                _ => {}
            }
        }
        if let Ok(sid) = std::env::var("NEWSDESK_SMS_ACCOUNT_SID") {
            self.sms.account_sid = sid;
        }
        if let Ok(token) = std::env::var("NEWSDESK_SMS_AUTH_TOKEN") {
            self.sms.auth_token = token;
        }
        if let Ok(app_id) = std::env::var("NEWSDESK_SMS_APP_ID") {
            self.sms.app_id = app_id;
        }

        if let Ok(driver) = std::env::var("NEWSDESK_STORAGE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "local" => self.storage.driver = StorageDriver::Local,
                "qiniu" => self.storage.driver = StorageDriver::Qiniu,
                _ => {}
            }
        }
        if let Ok(access_key) = std::env::var("NEWSDESK_STORAGE_ACCESS_KEY") {
            self.storage.access_key = access_key;
        }
        if let Ok(secret_key) = std::env::var("NEWSDESK_STORAGE_SECRET_KEY") {
            self.storage.secret_key = secret_key;
        }
        if let Ok(bucket) = std::env::var("NEWSDESK_STORAGE_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(prefix) = std::env::var("NEWSDESK_STORAGE_DOMAIN_PREFIX") {
            self.storage.domain_prefix = prefix;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_port_strategy() -> impl Strategy<Value = u16> {
        1u16..=65535
    }

    fn valid_page_size_strategy() -> impl Strategy<Value = i64> {
        1i64..=100
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: [1, 2, 3]".to_string()),
            Just("database:\n  driver: postgres".to_string()),
            Just("cache:\n  driver: memcached".to_string()),
            Just("sms:\n  driver: twilio".to_string()),
            Just("storage:\n  driver: s3".to_string()),
            Just("pagination:\n  news_per_page: ten".to_string()),
            Just("verification: true".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_roundtrip(port in valid_port_strategy(), news in valid_page_size_strategy(), followed in valid_page_size_strategy()) {
            let mut config = Config::default();
            config.server.port = port;
            config.pagination.news_per_page = news;
            config.pagination.followed_per_page = followed;

            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.pagination.news_per_page, news);
            prop_assert_eq!(parsed.pagination.followed_per_page, followed);
            prop_assert_eq!(parsed.storage.domain_prefix, config.storage.domain_prefix);
        }

        #[test]
        fn malformed_config_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            prop_assert!(Config::load(file.path()).is_err());
        }
    }
}
