use crate::connection::{MeterAddress, SupervisorConfig};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
#[cfg(feature = "api")]
use utoipa::ToSchema;

pub const CONFIG_ENV: &str = "D2M_CONFIG";
const CONFIG_PATHS: [&str; 2] = ["config/dsmr2mqtt.yaml", "dsmr2mqtt.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] io::Error),
    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("no config found, tried {0}")]
    NotFound(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn httpd_enabled_default() -> bool { return true }
fn httpd_port_default() -> u16 { return 8240 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct HttpdConfig {
    #[serde(default="httpd_enabled_default")]
    pub enabled: bool,
    #[serde(default="httpd_port_default")]
    pub port: u16
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "dsmr2mqtt".to_string() }
fn mqtt_base_topic_default() -> String { return "dsmr2mqtt".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
}

fn meter_port_default() -> u16 { return 23 }
fn meter_enabled_default() -> bool { return true }
fn meter_retry_delay_default() -> u64 { return 5 }
fn meter_connect_timeout_default() -> u64 { return 10 }
fn meter_idle_timeout_default() -> u64 { return 60 }
fn meter_max_telegram_len_default() -> usize { return 16 * 1024 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "api", derive(ToSchema))]
pub struct MeterConfig {
    pub name: String,
    pub host: String,
    #[serde(default="meter_port_default")]
    pub port: u16,
    #[serde(default="meter_enabled_default")]
    pub enabled: bool,
    #[serde(default="meter_retry_delay_default")]
    pub retry_delay: u64,       // Seconds between reconnects
    #[serde(default="meter_connect_timeout_default")]
    pub connect_timeout: u64,   // Seconds
    #[serde(default="meter_idle_timeout_default")]
    pub idle_timeout: u64,      // Seconds without data before reconnecting
    #[serde(default="meter_max_telegram_len_default")]
    pub max_telegram_len: usize,
}

impl MeterConfig {
    pub fn address(&self) -> MeterAddress {
        MeterAddress::new(self.host.clone(), self.port)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            name: self.name.clone(),
            retry_delay: Duration::from_secs(self.retry_delay),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            max_telegram_len: self.max_telegram_len,
        }
    }
}

fn dsmr_baseline_file_default() -> String { return "baselines.yaml".to_string() }
fn dsmr_meters_default() -> Vec<MeterConfig> { return Vec::new() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DsmrConfig {
    #[serde(default="dsmr_baseline_file_default")]
    pub baseline_file: String,
    #[serde(default="dsmr_meters_default")]
    pub meters: Vec<MeterConfig>,
}

fn httpd_default() -> HttpdConfig { return HttpdConfig { enabled: httpd_enabled_default(), port: httpd_port_default() } }
fn dsmr_default() -> DsmrConfig { return DsmrConfig { baseline_file: dsmr_baseline_file_default(), meters: dsmr_meters_default() } }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default="httpd_default")]
    pub httpd: HttpdConfig,
    pub mqtt: MqttConfig,
    #[serde(default="dsmr_default")]
    pub dsmr: DsmrConfig,
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for meter in &self.dsmr.meters {
            if meter.name.trim().is_empty() {
                return Err(ConfigError::Invalid("meter without name".to_string()));
            }
            if !names.insert(meter.name.as_str()) {
                return Err(ConfigError::Invalid(format!("meter name {} is used twice", meter.name)));
            }
            if meter.max_telegram_len == 0 {
                return Err(ConfigError::Invalid(format!("meter {} has max_telegram_len 0", meter.name)));
            }
        }
        Ok(())
    }

    pub fn meter(&self, name: &str) -> Option<&MeterConfig> {
        self.dsmr.meters.iter().find(|m| m.name == name)
    }
}

/// The running configuration plus where it came from.
pub struct ConfigHolder {
    pub config: Config,
    pub dirty: bool,
    pub path: PathBuf,
}

pub type SharedConfig = Arc<RwLock<ConfigHolder>>;

impl ConfigHolder {
    /// Load from `$D2M_CONFIG`, `config/dsmr2mqtt.yaml` or `dsmr2mqtt.yaml`,
    /// first match wins.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(path);
        }

        /* Check for the two paths of the config file */
        for path in CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Err(ConfigError::NotFound(CONFIG_PATHS.join(", ")))
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        debug!("Reading config from {path:?}");

        let contents = fs::read_to_string(&path)?;
        let config = Config::from_yaml(&contents)?;
        info!("Config loaded from {path:?} with {} meters", config.dsmr.meters.len());

        Ok(ConfigHolder {
            config,
            dirty: false,
            path,
        })
    }

    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    pub fn is_dirty(&self) -> bool {
        return self.dirty;
    }

    /// Remember a new address for a meter, written on the next [`save`](Self::save).
    pub fn update_meter_address(&mut self, name: &str, address: &MeterAddress) -> bool {
        let Some(meter) = self.config.dsmr.meters.iter_mut().find(|m| m.name == name) else {
            return false;
        };

        meter.host = address.host.clone();
        meter.port = address.port;
        self.dirty = true;
        true
    }

    pub fn save(&mut self) -> Result<(), ConfigError> {
        /* No need to write config if it's not dirty */
        if !self.dirty {
            debug!("Who ever called me, the config is not dirty");
            return Ok(());
        }

        let backup_path = self.path.with_file_name("backup.yaml");
        if let Err(e) = fs::copy(&self.path, &backup_path) {
            error!("Backing up config failed, not replacing it");
            return Err(e.into());
        }

        let yaml = serde_yml::to_string(&self.config)?;
        fs::write(&self.path, yaml.as_bytes())?;
        info!("New Config written");
        self.dirty = false;
        Ok(())
    }
}
