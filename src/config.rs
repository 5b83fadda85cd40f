use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CheckerError, Result};

/// Environment variables that take precedence over the config file
pub const ENV_TENANT_ID: &str = "GOPHISH_CHECKER_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "GOPHISH_CHECKER_CLIENT_ID";
pub const ENV_MAILBOX: &str = "GOPHISH_CHECKER_MAILBOX";

/// Outlook category colors: `none` or `preset0` through `preset24`
static CATEGORY_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(none|preset([0-9]|1[0-9]|2[0-4]))$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_secret_file")]
    pub secret_file: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            tenant_id: String::new(),
            client_id: String::new(),
            resource: default_resource(),
            endpoint: default_endpoint(),
            secret_file: default_secret_file(),
        }
    }
}

impl GraphConfig {
    /// Token endpoint for the client-credential grant
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// `.default` scope of the configured resource
    pub fn scope(&self) -> String {
        format!("{}/.default", self.resource.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_marker_header")]
    pub marker_header: String,
    #[serde(default)]
    pub category: CategoryConfig,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            folder: default_folder(),
            marker_header: default_marker_header(),
            category: CategoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default = "default_category_name")]
    pub name: String,
    #[serde(default = "default_category_color")]
    pub color: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            name: default_category_name(),
            color: default_category_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub run_once: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_once: false,
            interval_secs: default_interval_secs(),
        }
    }
}

impl RunConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_name: default_log_file_name(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_resource() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_endpoint() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_secret_file() -> PathBuf {
    PathBuf::from("app_pass")
}

fn default_folder() -> String {
    "Phishing Reports".to_string()
}

fn default_marker_header() -> String {
    "X-Gophish-Link".to_string()
}

fn default_category_name() -> String {
    "Gophish Reported".to_string()
}

fn default_category_color() -> String {
    "preset0".to_string()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_name() -> String {
    "gophish_mailbox_checker.log".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

impl Config {
    /// Load configuration, falling back to defaults when `path` does not exist.
    ///
    /// Runs before logging is set up, so nothing is logged here.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CheckerError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| CheckerError::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CheckerError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CheckerError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| CheckerError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Overlay identity settings from the environment
    pub fn apply_env_overrides(&mut self) {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(tenant_id) = read(ENV_TENANT_ID) {
            self.graph.tenant_id = tenant_id;
        }
        if let Some(client_id) = read(ENV_CLIENT_ID) {
            self.graph.client_id = client_id;
        }
        if let Some(address) = read(ENV_MAILBOX) {
            self.mailbox.address = address;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.graph.authority) {
            return Err(CheckerError::Config(format!(
                "graph.authority must be an http(s) URL, got '{}'",
                self.graph.authority
            )));
        }
        if !is_http_url(&self.graph.endpoint) {
            return Err(CheckerError::Config(format!(
                "graph.endpoint must be an http(s) URL, got '{}'",
                self.graph.endpoint
            )));
        }
        if self.graph.resource.trim().is_empty() {
            return Err(CheckerError::Config(
                "graph.resource cannot be empty".to_string(),
            ));
        }

        if self.mailbox.folder.trim().is_empty() {
            return Err(CheckerError::Config(
                "mailbox.folder cannot be empty".to_string(),
            ));
        }
        if self.mailbox.marker_header.trim().is_empty() {
            return Err(CheckerError::Config(
                "mailbox.marker_header cannot be empty".to_string(),
            ));
        }
        if self.mailbox.category.name.trim().is_empty() {
            return Err(CheckerError::Config(
                "mailbox.category.name cannot be empty".to_string(),
            ));
        }
        if !CATEGORY_COLOR.is_match(&self.mailbox.category.color) {
            return Err(CheckerError::Config(format!(
                "Invalid mailbox.category.color: '{}'. Must be 'none' or 'preset0' through 'preset24'",
                self.mailbox.category.color
            )));
        }

        if self.run.interval_secs == 0 {
            return Err(CheckerError::Config(
                "run.interval_secs must be at least 1".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(CheckerError::Config(format!(
                    "Invalid logging.level: '{}'. Must be 'trace', 'debug', 'info', 'warn', or 'error'",
                    other
                )));
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(CheckerError::Config(format!(
                    "Invalid logging.format: '{}'. Must be 'text' or 'json'",
                    other
                )));
            }
        }

        if self.logging.file_name.trim().is_empty() {
            return Err(CheckerError::Config(
                "logging.file_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Identity settings are only needed once we talk to the tenant
    pub fn require_identity(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("graph.tenant_id", self.graph.tenant_id.as_str()),
            ("graph.client_id", self.graph.client_id.as_str()),
            ("mailbox.address", self.mailbox.address.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CheckerError::Config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn clear_env() {
        std::env::remove_var(ENV_TENANT_ID);
        std::env::remove_var(ENV_CLIENT_ID);
        std::env::remove_var(ENV_MAILBOX);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.graph.authority, "https://login.microsoftonline.com");
        assert_eq!(config.graph.endpoint, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.graph.secret_file, PathBuf::from("app_pass"));
        assert!(config.graph.tenant_id.is_empty());

        assert_eq!(config.mailbox.folder, "Phishing Reports");
        assert_eq!(config.mailbox.marker_header, "X-Gophish-Link");
        assert_eq!(config.mailbox.category.name, "Gophish Reported");
        assert_eq!(config.mailbox.category.color, "preset0");

        assert!(!config.run.run_once);
        assert_eq!(config.run.interval(), Duration::from_secs(300));

        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.logging.file_path(),
            PathBuf::from("logs").join("gophish_mailbox_checker.log")
        );
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_token_url_and_scope() {
        let mut config = Config::default();
        config.graph.tenant_id = "contoso-tenant".to_string();
        config.graph.authority = "https://login.microsoftonline.com/".to_string();

        assert_eq!(
            config.graph.token_url(),
            "https://login.microsoftonline.com/contoso-tenant/oauth2/v2.0/token"
        );
        assert_eq!(config.graph.scope(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_config_validation_interval_zero() {
        let mut config = Config::default();
        config.run.interval_secs = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_config_validation_category_colors() {
        let mut config = Config::default();

        for color in ["none", "preset0", "preset9", "preset17", "preset24"] {
            config.mailbox.category.color = color.to_string();
            assert!(config.validate().is_ok(), "{} should be valid", color);
        }

        for color in ["preset25", "red", "Preset1", ""] {
            config.mailbox.category.color = color.to_string();
            let result = config.validate();
            assert!(result.is_err(), "{} should be invalid", color);
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("Invalid mailbox.category.color"));
        }
    }

    #[test]
    fn test_config_validation_empty_marker_header() {
        let mut config = Config::default();
        config.mailbox.marker_header = "  ".to_string();
        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("marker_header cannot be empty"));
    }

    #[test]
    fn test_config_validation_empty_folder() {
        let mut config = Config::default();
        config.mailbox.folder = String::new();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("mailbox.folder cannot be empty"));
    }

    #[test]
    fn test_config_validation_invalid_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid logging.level"));

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid logging.format"));
    }

    #[test]
    fn test_config_validation_endpoint_not_url() {
        let mut config = Config::default();
        config.graph.endpoint = "graph.microsoft.com".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("graph.endpoint"));
    }

    #[test]
    fn test_require_identity_lists_missing_fields() {
        let mut config = Config::default();
        let message = config.require_identity().unwrap_err().to_string();
        assert!(message.contains("graph.tenant_id"));
        assert!(message.contains("graph.client_id"));
        assert!(message.contains("mailbox.address"));

        config.graph.tenant_id = "tenant".to_string();
        config.graph.client_id = "client".to_string();
        config.mailbox.address = "phish@contoso.com".to_string();
        assert!(config.require_identity().is_ok());
    }

    #[tokio::test]
    #[serial]
    async fn test_config_load_save_roundtrip() {
        clear_env();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.mailbox.address = "phish@contoso.com".to_string();
        config.run.interval_secs = 60;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.mailbox.address, "phish@contoso.com");
        assert_eq!(loaded.run.interval_secs, 60);
        assert_eq!(loaded.mailbox.category.name, config.mailbox.category.name);
    }

    #[tokio::test]
    #[serial]
    async fn test_config_load_nonexistent_returns_default() {
        clear_env();
        let path = Path::new("/tmp/nonexistent-gophish-checker-config-12345.toml");

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.run.interval_secs, 300);
        assert_eq!(config.mailbox.folder, "Phishing Reports");
    }

    struct EventCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for EventCounter {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_config_load_emits_no_events_before_logging_is_set_up() {
        clear_env();
        let events = Arc::new(AtomicUsize::new(0));
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(EventCounter(Arc::clone(&events))),
        );

        Config::load(Path::new("/tmp/nonexistent-gophish-checker-config-67890.toml"))
            .await
            .unwrap();

        let temp_file = NamedTempFile::new().unwrap();
        Config::default().save(temp_file.path()).await.unwrap();
        let saved_events = events.load(Ordering::SeqCst);
        Config::load(temp_file.path()).await.unwrap();

        assert_eq!(saved_events, 1);
        assert_eq!(events.load(Ordering::SeqCst), saved_events);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    #[serial]
    async fn test_config_partial_with_defaults() {
        clear_env();
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[mailbox]
address = "phish@contoso.com"
folder = "Gophish"

[mailbox.category]
name = "Reported"

[run]
run_once = true
"#;
        tokio::fs::write(temp_file.path(), partial_config)
            .await
            .unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.mailbox.folder, "Gophish");
        assert_eq!(config.mailbox.category.name, "Reported");
        assert!(config.run.run_once);

        assert_eq!(config.mailbox.category.color, "preset0");
        assert_eq!(config.mailbox.marker_header, "X-Gophish-Link");
        assert_eq!(config.run.interval_secs, 300);
    }

    #[tokio::test]
    #[serial]
    async fn test_env_overrides_take_precedence() {
        clear_env();
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            temp_file.path(),
            "[graph]\ntenant_id = \"file-tenant\"\nclient_id = \"file-client\"\n",
        )
        .await
        .unwrap();

        std::env::set_var(ENV_TENANT_ID, "env-tenant");
        std::env::set_var(ENV_MAILBOX, "env@contoso.com");

        let config = Config::load(temp_file.path()).await.unwrap();
        assert_eq!(config.graph.tenant_id, "env-tenant");
        assert_eq!(config.graph.client_id, "file-client");
        assert_eq!(config.mailbox.address, "env@contoso.com");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_config_create_example() {
        clear_env();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.run.interval_secs, 300);
    }
}
