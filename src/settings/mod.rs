//! Baseline readings, the first gas and energy totals seen for a meter.
//!
//! They survive restarts so usage can be reported relative to the moment
//! monitoring began.

use crate::metering_dsmr::structs::Snapshot;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(default)]
    pub gas: Option<f64>,
    #[serde(default)]
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BaselineUsage {
    pub gas_since_baseline: Option<f64>,
    pub energy_since_baseline: Option<f64>,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings file: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid YAML: {0}")]
    Parse(#[source] serde_yml::Error),
    #[error("unable to serialize settings: {0}")]
    Serialize(#[source] serde_yml::Error),
    #[error("settings store is poisoned")]
    Poisoned,
}

/// Where baselines are read from and committed to.
pub trait BaselineStore: Send + Sync {
    fn load(&self, meter: &str) -> Result<Baseline, SettingsError>;
    fn store(&self, meter: &str, baseline: &Baseline) -> Result<(), SettingsError>;
}

/// All meters in one YAML map, keyed by meter name
pub struct YamlBaselineStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl YamlBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        YamlBaselineStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, Baseline>, SettingsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No baseline file at {:?} yet", self.path);
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_yml::from_str(&contents).map_err(SettingsError::Parse)
    }
}

impl BaselineStore for YamlBaselineStore {
    fn load(&self, meter: &str) -> Result<Baseline, SettingsError> {
        let _lock = self.lock.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(self.read_all()?.get(meter).copied().unwrap_or_default())
    }

    fn store(&self, meter: &str, baseline: &Baseline) -> Result<(), SettingsError> {
        let _lock = self.lock.lock().map_err(|_| SettingsError::Poisoned)?;

        let mut all = self.read_all()?;
        all.insert(meter.to_string(), *baseline);
        let yaml = serde_yml::to_string(&all).map_err(SettingsError::Serialize)?;

        if self.path.exists() {
            let backup = self.path.with_extension("bak");
            if let Err(e) = fs::copy(&self.path, &backup) {
                error!("Backing up baselines failed, not replacing them: {e}");
                return Err(e.into());
            }
        }

        fs::write(&self.path, yaml.as_bytes())?;
        info!("Baseline for {meter} written to {:?}", self.path);
        Ok(())
    }
}

/// Keeps baselines in memory only
#[derive(Default)]
pub struct MemoryBaselineStore {
    values: Mutex<HashMap<String, Baseline>>,
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self, meter: &str) -> Result<Baseline, SettingsError> {
        let values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(values.get(meter).copied().unwrap_or_default())
    }

    fn store(&self, meter: &str, baseline: &Baseline) -> Result<(), SettingsError> {
        let mut values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        values.insert(meter.to_string(), *baseline);
        Ok(())
    }
}

/// Reads the baseline of one meter once and establishes missing values from
/// the first snapshot that carries them. Store access runs on the blocking
/// pool.
pub struct BaselineTracker {
    meter: String,
    store: Arc<dyn BaselineStore>,
    baseline: Baseline,
}

impl BaselineTracker {
    pub async fn load(meter: &str, store: Arc<dyn BaselineStore>) -> Self {
        let reader = store.clone();
        let name = meter.to_string();
        let loaded = tokio::task::spawn_blocking(move || reader.load(&name)).await;

        let baseline = match loaded {
            Ok(Ok(baseline)) => baseline,
            Ok(Err(e)) => {
                error!("[{meter}] Unable to read baseline, starting without: {e}");
                Baseline::default()
            }
            Err(e) => {
                error!("[{meter}] Baseline reader failed, starting without: {e}");
                Baseline::default()
            }
        };

        BaselineTracker {
            meter: meter.to_string(),
            store,
            baseline,
        }
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub async fn observe(&mut self, snapshot: &Snapshot) -> BaselineUsage {
        let gas = snapshot.gas.reading;
        let energy = snapshot.electricity.received.total();

        let mut changed = false;
        if self.baseline.gas.is_none() && gas.is_some() {
            self.baseline.gas = gas;
            changed = true;
        }
        if self.baseline.energy.is_none() && energy.is_some() {
            self.baseline.energy = energy;
            changed = true;
        }

        if changed {
            info!("[{}] Baseline established: {:?}", self.meter, self.baseline);
            let store = self.store.clone();
            let (meter, baseline) = (self.meter.clone(), self.baseline);
            match tokio::task::spawn_blocking(move || store.store(&meter, &baseline)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("[{}] Unable to commit baseline: {e}", self.meter),
                Err(e) => error!("[{}] Baseline writer failed: {e}", self.meter),
            }
        }

        BaselineUsage {
            gas_since_baseline: gas.zip(self.baseline.gas).map(|(now, base)| now - base),
            energy_since_baseline: energy.zip(self.baseline.energy).map(|(now, base)| now - base),
        }
    }
}
