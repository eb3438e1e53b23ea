use crate::cli::{Cli, OutputFormat};
use crate::context::PipelineSettings;
use crate::converter::SourceFormat;
use crate::http_client::HttpClientConfig;
use clap::ValueEnum;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every environment variable the tool reads
const ENV_PREFIX: &str = "SAMPLE_MIGRATION_";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub systems: SystemsConfig,
    pub fetch: FetchConfig,
    pub merge: MergeConfig,
    pub comparison: ComparisonConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,
    /// Ignore-list file; the bundled list is used when absent
    pub ignore_list: Option<PathBuf>,
    /// Compare only this accession
    pub test_accession: Option<String>,
}

/// The two systems under comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemsConfig {
    pub old: SystemConfig,
    pub new: SystemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    /// Base URL; `/samples`, `/groups` and `/groupsamples` hang off it
    #[serde(default)]
    pub url: String,
    pub format: SourceFormat,
}

/// Inventory crawl configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: usize,
    /// Concurrent page requests against an XML system
    pub xml_page_concurrency: usize,
    /// Concurrent page requests against a JSON system
    pub json_page_concurrency: usize,
    pub queue_capacity: usize,
    /// Pause between attempts to push into a full queue
    pub backpressure_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    /// Idle receive timeout before the done flags are rechecked
    pub idle_poll_ms: u64,
}

/// Record comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Compare records; disabled means inventory-only
    pub enabled: bool,
    /// Defaults to four per CPU
    pub max_in_flight: Option<usize>,
    pub group_page_size: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed requests
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
    /// Fatal errors only
    pub quiet: bool,
}

impl Default for SystemsConfig {
    fn default() -> Self {
        Self {
            old: SystemConfig {
                url: String::new(),
                format: SourceFormat::Xml,
            },
            new: SystemConfig {
                url: String::new(),
                format: SourceFormat::Json,
            },
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            xml_page_concurrency: 4,
            json_page_concurrency: 8,
            queue_capacity: 1024,
            backpressure_delay_ms: 10,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { idle_poll_ms: 100 }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_in_flight: None,
            group_page_size: 1000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Effective comparison bound
    pub fn max_in_flight(&self) -> usize {
        self.comparison
            .max_in_flight
            .unwrap_or_else(|| num_cpus::get() * 4)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            page_size: self.fetch.page_size,
            xml_page_concurrency: self.fetch.xml_page_concurrency,
            json_page_concurrency: self.fetch.json_page_concurrency,
            queue_capacity: self.fetch.queue_capacity,
            backpressure_delay: Duration::from_millis(self.fetch.backpressure_delay_ms),
            idle_poll: Duration::from_millis(self.merge.idle_poll_ms),
            max_in_flight: self.max_in_flight(),
            group_page_size: self.comparison.group_page_size,
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: self.network.timeout_seconds,
            retry_attempts: self.network.retry_attempts,
            retry_delay_ms: self.network.retry_delay_ms,
            // Every in-flight comparison holds one connection per system
            max_idle_per_host: self.max_in_flight(),
            ..Default::default()
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.network.timeout_seconds)
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Find configuration file in the working directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "sample-migration.toml",
            "sample-migration.json",
            ".sample-migration.toml",
            ".sample-migration.json",
        ];

        let mut candidates: Vec<PathBuf> = config_names.iter().map(PathBuf::from).collect();
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("sample-migration");
            candidates.extend(config_names.iter().map(|name| app_config_dir.join(name)));
        }

        for path in candidates {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(url) = env.get(&env_key("OLD_URL")) {
            config.systems.old.url = url;
        }
        if let Some(url) = env.get(&env_key("NEW_URL")) {
            config.systems.new.url = url;
        }
        if let Some(format) = env_value::<FormatArg>(env, "OLD_FORMAT")? {
            config.systems.old.format = format.0;
        }
        if let Some(format) = env_value::<FormatArg>(env, "NEW_FORMAT")? {
            config.systems.new.format = format.0;
        }

        if let Some(page_size) = env_value(env, "PAGE_SIZE")? {
            config.fetch.page_size = page_size;
        }
        if let Some(capacity) = env_value(env, "QUEUE_CAPACITY")? {
            config.fetch.queue_capacity = capacity;
        }
        if let Some(max_in_flight) = env_value(env, "MAX_IN_FLIGHT")? {
            config.comparison.max_in_flight = Some(max_in_flight);
        }
        if let Some(inventory_only) = env_value::<bool>(env, "INVENTORY_ONLY")? {
            config.comparison.enabled = !inventory_only;
        }

        if let Some(timeout) = env_value(env, "TIMEOUT")? {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = env_value(env, "RETRY_ATTEMPTS")? {
            config.network.retry_attempts = retry_attempts;
        }

        if let Some(verbose) = env_value(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = env_value(env, "QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get(&env_key("FORMAT")) {
            config.output.format = <OutputFormat as ValueEnum>::from_str(&format, true).map_err(|_| {
                ConfigError::Environment(format!("Invalid {} value: {}", env_key("FORMAT"), format))
            })?;
        }

        if let Some(path) = env.get(&env_key("IGNORE_LIST")) {
            config.ignore_list = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(url) = &cli.old_url {
            config.systems.old.url = url.clone();
        }
        if let Some(url) = &cli.new_url {
            config.systems.new.url = url.clone();
        }
        if let Some(format) = cli.old_format {
            config.systems.old.format = format;
        }
        if let Some(format) = cli.new_format {
            config.systems.new.format = format;
        }

        if let Some(page_size) = cli.page_size {
            config.fetch.page_size = page_size;
        }
        if let Some(capacity) = cli.queue_capacity {
            config.fetch.queue_capacity = capacity;
        }
        if cli.max_in_flight.is_some() {
            config.comparison.max_in_flight = cli.max_in_flight;
        }
        if cli.inventory_only {
            config.comparison.enabled = false;
        }
        if cli.test_accession.is_some() {
            config.test_accession = cli.test_accession.clone();
        }
        if cli.ignore_list.is_some() {
            config.ignore_list = cli.ignore_list.clone();
        }

        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = cli.retry_attempts {
            config.network.retry_attempts = retry_attempts;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        // Flags only ever switch a mode on
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Merge two configurations (second takes precedence for set values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if !override_config.systems.old.url.is_empty() {
            base.systems.old.url = override_config.systems.old.url;
        }
        if !override_config.systems.new.url.is_empty() {
            base.systems.new.url = override_config.systems.new.url;
        }
        base.systems.old.format = override_config.systems.old.format;
        base.systems.new.format = override_config.systems.new.format;

        base.fetch = override_config.fetch;
        base.merge = override_config.merge;

        base.comparison.enabled = override_config.comparison.enabled;
        base.comparison.group_page_size = override_config.comparison.group_page_size;
        if override_config.comparison.max_in_flight.is_some() {
            base.comparison.max_in_flight = override_config.comparison.max_in_flight;
        }

        base.network = override_config.network;
        base.output = override_config.output;

        if override_config.ignore_list.is_some() {
            base.ignore_list = override_config.ignore_list;
        }
        if override_config.test_accession.is_some() {
            base.test_accession = override_config.test_accession;
        }

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        for (side, system) in [("old", &config.systems.old), ("new", &config.systems.new)] {
            if system.url.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "The {} system URL must be specified",
                    side
                )));
            }
            if let Err(e) = Url::parse(&system.url) {
                return Err(ConfigError::Validation(format!(
                    "Invalid {} system URL {}: {}",
                    side, system.url, e
                )));
            }
        }

        let sizes = [
            ("Page size", config.fetch.page_size),
            ("XML page concurrency", config.fetch.xml_page_concurrency),
            ("JSON page concurrency", config.fetch.json_page_concurrency),
            ("Queue capacity", config.fetch.queue_capacity),
            ("Group page size", config.comparison.group_page_size),
            ("Max in flight", config.max_in_flight()),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if config.merge.idle_poll_ms == 0 {
            return Err(ConfigError::Validation(
                "Idle poll interval must be greater than 0".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if let Some(accession) = &config.test_accession
            && accession.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "Test accession must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_key(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

/// Read and parse `SAMPLE_MIGRATION_<name>`, if set
fn env_value<T: FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = env_key(name);
    env.get(&key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, raw)))
        })
        .transpose()
}

/// Case-insensitive `xml`/`json` for environment values
struct FormatArg(SourceFormat);

impl FromStr for FormatArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <SourceFormat as ValueEnum>::from_str(s, true).map(FormatArg)
    }
}
