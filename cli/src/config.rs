use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::fmt;
use std::time::Duration;

use epochsweep_api::prelude::*;
use epochsweep_client::{NodeRole, RpcConfig};
use epochsweep_network::executor::ExecutorConfig;
use epochsweep_network::retry::RetryPolicy;

const CONFIG_FILE_NAME: &str = ".epochsweep.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweepConfig {
    pub chain: ChainConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub subnet: SubnetConfig,
    #[serde(default)]
    pub validator: ValidatorSection,
    #[serde(default)]
    pub miner: MinerSection,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    /// Tried in order; the client fails over to the next one on transport errors.
    pub endpoints: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Name of the environment variable holding the RPC bearer token.
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub hotkey: String,
    #[serde(default)]
    pub coldkey: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubnetConfig {
    pub netuid: u16,
}

impl Default for SubnetConfig {
    fn default() -> Self {
        Self { netuid: DEFAULT_NETUID }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ValidatorSection {
    /// Explicit weight target; the subnet owner's uid when unset.
    pub target_uid: Option<u16>,
    pub set_weights_interval: u64,
    pub target_refresh_seconds: u64,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            target_uid: None,
            set_weights_interval: DEFAULT_SET_WEIGHTS_INTERVAL,
            target_refresh_seconds: DEFAULT_TARGET_REFRESH_SECONDS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MinerSection {
    pub aggregator_hotkey: Option<String>,
    pub destination_coldkey: Option<String>,
    pub skip_initial_transfer: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub poll_interval_seconds: u64,
    pub durability: Durability,
    pub retry_bound: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub confirmation_timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            durability: Durability::Inclusion,
            retry_bound: DEFAULT_RETRY_BOUND,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            confirmation_timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECONDS,
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            durability: self.durability,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_seconds),
            retry: RetryPolicy::new(self.retry_bound, self.backoff_base_ms, self.backoff_cap_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// Receives warnings and errors instead of the main webhook.
    pub error_webhook_url: Option<String>,
    /// Period of the activity summary; 0 turns it off.
    pub summary_interval_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            error_webhook_url: None,
            summary_interval_seconds: DEFAULT_SUMMARY_INTERVAL_SECONDS,
        }
    }
}

impl NotifyConfig {
    pub fn summary_interval(&self) -> Option<Duration> {
        match self.summary_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Defaults to 8876 for the validator and 8877 for the miner.
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// env_logger filter applying this level to the workspace crates.
    pub fn filter(&self) -> String {
        let level = self.as_str();
        format!("epochsweep_network={level},epochsweep_client={level},epochsweep={level}")
    }
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

impl SweepConfig {

    pub fn load_with_path(config_path: &Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => {
                let expanded_path = expand_path(path);
                if !expanded_path.exists() {
                    return Err(ConfigError::CustomConfigFileNotFound(
                        expanded_path.display().to_string()
                    ));
                }
                Self::load_from_path(expanded_path)
            },
            None => {
                let default_path = get_default_config_path()?;
                Self::load_from_path(default_path)
            }
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound);
        }

        let contents = fs::read_to_string(path)
            .map_err(ConfigError::FileReadError)?;
        let config: SweepConfig = toml::from_str(&contents)
            .map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that hold for every command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.endpoints.is_empty() {
            return Err(ConfigError::MissingField("chain.endpoints".to_string()));
        }
        for endpoint in &self.chain.endpoints {
            self.validate_url(endpoint, "Chain endpoint", &["http://", "https://"])?;
        }

        if let Some(ref url) = self.notify.webhook_url {
            self.validate_url(url, "Notification webhook", &["https://", "http://"])?;
        }
        if let Some(ref url) = self.notify.error_webhook_url {
            self.validate_url(url, "Error notification webhook", &["https://", "http://"])?;
        }

        let positive = [
            ("validator.set_weights_interval", self.validator.set_weights_interval),
            ("validator.target_refresh_seconds", self.validator.target_refresh_seconds),
            ("execution.poll_interval_seconds", self.execution.poll_interval_seconds),
            ("execution.retry_bound", self.execution.retry_bound as u64),
            ("execution.confirmation_timeout_seconds", self.execution.confirmation_timeout_seconds),
            ("chain.request_timeout_seconds", self.chain.request_timeout_seconds),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be at least 1", field)));
            }
        }

        Ok(())
    }

    /// Identity checks for a process that is about to start acting.
    pub fn validate_for(&self, role: NodeRole) -> Result<(), ConfigError> {
        self.validate()?;

        validate_address(&self.identity.hotkey, "identity.hotkey")?;

        if role == NodeRole::Miner {
            validate_address(&self.identity.coldkey, "identity.coldkey")?;

            let aggregator = self.miner.aggregator_hotkey.as_deref().unwrap_or_default();
            validate_address(aggregator, "miner.aggregator_hotkey")?;

            let destination = self.miner.destination_coldkey.as_deref().unwrap_or_default();
            validate_address(destination, "miner.destination_coldkey")?;

            if aggregator == self.identity.hotkey {
                return Err(ConfigError::InvalidValue(
                    "miner.aggregator_hotkey must differ from identity.hotkey".to_string()
                ));
            }
        }

        Ok(())
    }

    fn validate_url(&self, url: &str, field_name: &str, valid_schemes: &[&str]) -> Result<(), ConfigError> {
        if url.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(
                format!("{} cannot be empty", field_name)
            ));
        }

        let has_valid_scheme = valid_schemes.iter().any(|scheme| url.starts_with(scheme));

        if !has_valid_scheme {
            return Err(ConfigError::InvalidUrl(
                format!("{} must start with one of {:?}, found: '{}'", field_name, valid_schemes, url)
            ));
        }

        if url.contains(' ') {
            return Err(ConfigError::InvalidUrl(
                format!("{} cannot contain spaces, found: '{}'", field_name, url)
            ));
        }

        Ok(())
    }

    pub fn rpc_config(&self) -> RpcConfig {
        let auth_token = self.chain.auth_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty());

        RpcConfig {
            endpoints: self.chain.endpoints.clone(),
            request_timeout: Duration::from_secs(self.chain.request_timeout_seconds),
            extrinsic_timeout: Duration::from_secs(self.execution.confirmation_timeout_seconds),
            auth_token,
        }
    }

    pub fn create_default() -> Result<Self, ConfigError> {
        Self::create_default_at(get_default_config_path()?)
    }

    pub fn create_default_at<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::DefaultConfigCreationFailed(format!("Serialization failed: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::DefaultConfigCreationFailed(format!("Write failed: {}", e)))?;

        Ok(config)
    }
}

/// SS58 addresses are base58 strings of a fixed length.
fn validate_address(address: &str, field_name: &str) -> Result<(), ConfigError> {
    if address.trim().is_empty() {
        return Err(ConfigError::MissingField(field_name.to_string()));
    }

    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    let well_formed = address.len() == SS58_ADDRESS_LEN
        && address.chars().all(|c| BASE58.contains(c));

    if !well_formed {
        return Err(ConfigError::InvalidAddress(format!(
            "{} is not an SS58 address: '{}'", field_name, address
        )));
    }
    Ok(())
}

pub fn get_default_config_path() -> Result<PathBuf, ConfigError> {
    let home_dir = dirs::home_dir()
        .ok_or(ConfigError::HomeDirectoryNotFound)?;
    Ok(home_dir.join(CONFIG_FILE_NAME))
}

pub fn expand_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path_str = path.as_ref().to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.as_ref())
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                endpoints: vec!["https://entrypoint-finney.opentensor.ai:443".to_string()],
                request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
                auth_token_env: None,
            },
            identity: IdentityConfig::default(),
            subnet: SubnetConfig::default(),
            validator: ValidatorSection::default(),
            miner: MinerSection::default(),
            execution: ExecutionConfig::default(),
            notify: NotifyConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig {
                log_level: Some(LogLevel::Info),
            },
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ConfigFileNotFound,
    CustomConfigFileNotFound(String),
    InvalidUrl(String),
    MissingField(String),
    InvalidAddress(String),
    InvalidValue(String),
    HomeDirectoryNotFound,
    FileReadError(std::io::Error),
    ParseError(toml::de::Error),
    DefaultConfigCreationFailed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConfigFileNotFound => write!(f, "Configuration file not found"),
            ConfigError::CustomConfigFileNotFound(path) => write!(f, "Configuration file not found at path: {}", path),
            ConfigError::InvalidUrl(msg) => write!(f, "Invalid URL configuration: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing required setting: {}", field),
            ConfigError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            ConfigError::HomeDirectoryNotFound => write!(f, "Home directory not found"),
            ConfigError::FileReadError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config file: {}", e),
            ConfigError::DefaultConfigCreationFailed(msg) => write!(f, "Failed to create default config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const HOTKEY: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const COLDKEY: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const AGGREGATOR: &str = "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y";
    const DESTINATION: &str = "5DAAnrj7VHTznn2AWBemMuyBwZWs6FNFjdyVXUeYum3PTXFy";

    fn miner_config() -> SweepConfig {
        let mut config = SweepConfig::default();
        config.identity = IdentityConfig {
            hotkey: HOTKEY.to_string(),
            coldkey: COLDKEY.to_string(),
        };
        config.miner.aggregator_hotkey = Some(AGGREGATOR.to_string());
        config.miner.destination_coldkey = Some(DESTINATION.to_string());
        config
    }

    #[test]
    fn test_toml_parsing_works_properly() {
        let toml_content = r#"
[chain]
endpoints = ["https://lite.chain.example:443", "http://127.0.0.1:9944"]
request_timeout_seconds = 15
auth_token_env = "EPOCHSWEEP_RPC_TOKEN"

[identity]
hotkey = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
coldkey = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty"

[subnet]
netuid = 12

[validator]
target_uid = 69
set_weights_interval = 360

[miner]
aggregator_hotkey = "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y"
destination_coldkey = "5DAAnrj7VHTznn2AWBemMuyBwZWs6FNFjdyVXUeYum3PTXFy"
skip_initial_transfer = true

[execution]
poll_interval_seconds = 12
durability = "finalization"
retry_bound = 5

[notify]
webhook_url = "https://hooks.slack.com/services/T000/B000/XXXX"
summary_interval_seconds = 0

[metrics]
enabled = true
port = 9100

[logging]
log_level = "debug"
"#;

        let config: SweepConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.chain.endpoints.len(), 2);
        assert_eq!(config.chain.request_timeout_seconds, 15);
        assert_eq!(config.subnet.netuid, 12);
        assert_eq!(config.validator.target_uid, Some(69));
        assert_eq!(config.validator.set_weights_interval, 360);
        assert_eq!(config.validator.target_refresh_seconds, DEFAULT_TARGET_REFRESH_SECONDS);
        assert!(config.miner.skip_initial_transfer);
        assert_eq!(config.execution.durability, Durability::Finalization);
        assert_eq!(config.execution.retry_bound, 5);
        assert_eq!(config.execution.backoff_base_ms, DEFAULT_BACKOFF_BASE_MS);
        assert_eq!(config.metrics.port, Some(9100));
        assert_eq!(config.notify.summary_interval(), None);
        assert_eq!(config.logging.log_level, Some(LogLevel::Debug));
        assert!(config.validate_for(NodeRole::Miner).is_ok());
    }

    #[test]
    fn minimal_file_takes_defaults() {
        let toml_content = r#"
[chain]
endpoints = ["https://lite.chain.example:443"]

[identity]
hotkey = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
"#;
        let config: SweepConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.subnet.netuid, DEFAULT_NETUID);
        assert_eq!(config.validator.target_uid, None);
        assert_eq!(config.execution.durability, Durability::Inclusion);
        assert_eq!(config.execution.retry_bound, DEFAULT_RETRY_BOUND);
        assert!(!config.metrics.enabled);
        assert_eq!(config.notify.summary_interval(), Some(Duration::from_secs(DEFAULT_SUMMARY_INTERVAL_SECONDS)));
        assert!(config.validate_for(NodeRole::Validator).is_ok());
        assert!(matches!(
            config.validate_for(NodeRole::Miner),
            Err(ConfigError::MissingField(field)) if field == "identity.coldkey"
        ));
    }

    #[test]
    fn rejects_bad_endpoints() {
        let mut config = miner_config();
        config.chain.endpoints = vec!["wss://lite.chain.example".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));

        config.chain.endpoints = vec!["https://lite chain".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));

        config.chain.endpoints.clear();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn rejects_zero_values() {
        let mut config = miner_config();
        config.execution.retry_bound = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = miner_config();
        config.validator.set_weights_interval = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn rejects_malformed_addresses() {
        let mut config = miner_config();
        config.miner.destination_coldkey = Some("5short".to_string());
        assert!(matches!(
            config.validate_for(NodeRole::Miner),
            Err(ConfigError::InvalidAddress(_))
        ));

        let mut config = miner_config();
        config.identity.hotkey = HOTKEY.replace('G', "0");
        assert!(matches!(
            config.validate_for(NodeRole::Validator),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn refuses_self_sweep() {
        let mut config = miner_config();
        config.miner.aggregator_hotkey = Some(HOTKEY.to_string());
        assert!(matches!(
            config.validate_for(NodeRole::Miner),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn load_from_path_reads_and_validates() {
        let dir = TempDir::new("epochsweep").unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            SweepConfig::load_from_path(&path),
            Err(ConfigError::ConfigFileNotFound)
        ));

        fs::write(&path, "[chain]\nendpoints = [\"ftp://nope\"]\n[identity]\n").unwrap();
        assert!(matches!(
            SweepConfig::load_from_path(&path),
            Err(ConfigError::InvalidUrl(_))
        ));

        fs::write(&path, "[chain\n").unwrap();
        assert!(matches!(
            SweepConfig::load_from_path(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_custom_path_is_reported() {
        let dir = TempDir::new("epochsweep").unwrap();
        let path = Some(dir.path().join("missing.toml"));
        assert!(matches!(
            SweepConfig::load_with_path(&path),
            Err(ConfigError::CustomConfigFileNotFound(_))
        ));
    }

    #[test]
    fn default_config_round_trips_through_disk() {
        let dir = TempDir::new("epochsweep").unwrap();
        let path = dir.path().join("default.toml");

        let created = SweepConfig::create_default_at(&path).unwrap();
        let loaded = SweepConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.chain.endpoints, created.chain.endpoints);
        assert_eq!(loaded.execution.durability, Durability::Inclusion);
        assert_eq!(loaded.logging.log_level, Some(LogLevel::Info));

        // identity is left for the operator to fill in
        assert!(matches!(
            loaded.validate_for(NodeRole::Validator),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn executor_config_follows_execution_section() {
        let mut config = miner_config();
        config.execution.durability = Durability::Finalization;
        config.execution.retry_bound = 4;
        config.execution.confirmation_timeout_seconds = 60;

        let executor = config.execution.executor_config();
        assert_eq!(executor.durability, Durability::Finalization);
        assert_eq!(executor.retry.max_attempts, 4);
        assert_eq!(executor.confirmation_timeout, Duration::from_secs(60));
    }
}
