use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// 6-field cron expression (with seconds), evaluated in UTC.
    #[serde(default = "default_cron")]
    pub cron: String,
    #[serde(default)]
    pub run_on_startup: bool,
    /// Fixed local offset used for gating and row keys.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_active_from_hour")]
    pub active_from_hour: u32,
    #[serde(default = "default_active_until_hour")]
    pub active_until_hour: u32,
}

fn default_cron() -> String {
    "0 */15 * * * *".into()
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_active_from_hour() -> u32 {
    6
}

fn default_active_until_hour() -> u32 {
    24
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            run_on_startup: false,
            utc_offset_hours: default_utc_offset_hours(),
            active_from_hour: default_active_from_hour(),
            active_until_hour: default_active_until_hour(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultProvider {
    /// Azure Key Vault, authenticated with the host's managed identity.
    #[default]
    Azure,
    /// Secrets read from environment variables of the same name (local runs).
    Env,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub provider: VaultProvider,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the vault URL; wins over `url` when set.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,
    #[serde(default = "default_connection_string_secret")]
    pub connection_string_secret: String,
}

fn default_url_env() -> String {
    "KeyVaultUrl".into()
}

fn default_api_key_secret() -> String {
    "LtaAccountKey".into()
}

fn default_connection_string_secret() -> String {
    "CosmosDbTableConnectionString".into()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            provider: VaultProvider::default(),
            url: None,
            url_env: default_url_env(),
            api_key_secret: default_api_key_secret(),
            connection_string_secret: default_connection_string_secret(),
        }
    }
}

impl VaultConfig {
    /// Vault location: the `url_env` variable if set and non-empty, else `url`.
    pub fn resolve_url(&self) -> Option<String> {
        std::env::var(&self.url_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.url.clone().filter(|v| !v.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for each outbound request (feeds and vault).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_transport_base_url")]
    pub transport_base_url: String,
    #[serde(default = "default_bus_stop_code")]
    pub bus_stop_code: String,
}

fn default_weather_url() -> String {
    "https://api.data.gov.sg/v1/environment/rainfall".into()
}

fn default_transport_base_url() -> String {
    "http://datamall2.mytransport.sg/ltaodataservice".into()
}

fn default_bus_stop_code() -> String {
    "08057".into()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            weather_url: default_weather_url(),
            transport_base_url: default_transport_base_url(),
            bus_stop_code: default_bus_stop_code(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Create the table on first write instead of failing table resolution.
    #[serde(default)]
    pub create_table: bool,
}

fn default_table() -> String {
    "ltaData".into()
}

fn default_partition_key() -> String {
    "partitionkey".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            partition_key: default_partition_key(),
            create_table: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        cron::Schedule::from_str(&self.schedule.cron).map_err(|e| {
            anyhow::anyhow!(
                "schedule.cron is not a valid cron expression ({}): {}",
                self.schedule.cron,
                e
            )
        })?;
        anyhow::ensure!(
            (-12..=14).contains(&self.schedule.utc_offset_hours),
            "schedule.utc_offset_hours must be between -12 and 14, got {}",
            self.schedule.utc_offset_hours
        );
        anyhow::ensure!(
            self.schedule.active_until_hour <= 24,
            "schedule.active_until_hour must be <= 24, got {}",
            self.schedule.active_until_hour
        );
        anyhow::ensure!(
            self.schedule.active_from_hour < self.schedule.active_until_hour,
            "schedule.active_from_hour ({}) must be < schedule.active_until_hour ({})",
            self.schedule.active_from_hour,
            self.schedule.active_until_hour
        );
        anyhow::ensure!(
            !self.vault.api_key_secret.is_empty(),
            "vault.api_key_secret must be non-empty"
        );
        anyhow::ensure!(
            !self.vault.connection_string_secret.is_empty(),
            "vault.connection_string_secret must be non-empty"
        );
        anyhow::ensure!(
            self.http.timeout_secs > 0,
            "http.timeout_secs must be > 0, got {}",
            self.http.timeout_secs
        );
        anyhow::ensure!(
            !self.sources.weather_url.is_empty(),
            "sources.weather_url must be non-empty"
        );
        anyhow::ensure!(
            !self.sources.transport_base_url.is_empty(),
            "sources.transport_base_url must be non-empty"
        );
        anyhow::ensure!(
            !self.sources.bus_stop_code.is_empty(),
            "sources.bus_stop_code must be non-empty"
        );
        anyhow::ensure!(
            is_valid_table_name(&self.storage.table),
            "storage.table must be 3-63 alphanumeric characters starting with a letter, got {:?}",
            self.storage.table
        );
        anyhow::ensure!(
            !self.storage.partition_key.is_empty(),
            "storage.partition_key must be non-empty"
        );
        Ok(())
    }
}

fn is_valid_table_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
}
