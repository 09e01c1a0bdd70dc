use crate::connection::{ConnectionState, MeterAddress, SupervisorEvent, SupervisorHandle};
use crate::metering_dsmr::structs::Snapshot;
use crate::models::DeviceProtocol;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
#[cfg(feature = "api")]
use utoipa::ToSchema;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("meter {0} is not known")]
    UnknownMeter(String),
    #[error("supervisor of meter {0} is not running")]
    SupervisorGone(String),
}

/// What the outside world may know about one meter
#[derive(Debug, Clone, Serialize, PartialEq)]
#[cfg_attr(feature = "api", derive(ToSchema))]
pub struct MeterStatus {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub state: ConnectionState,
    pub protocol: DeviceProtocol,
    pub telegrams: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub last_error: Option<String>,
    #[cfg_attr(feature = "api", schema(value_type = Option<String>))]
    pub last_telegram: Option<DateTime<Utc>>,
}

struct MeterEntry {
    status: MeterStatus,
    snapshot: Option<Snapshot>,
    handle: SupervisorHandle,
}

/// Status of every configured meter, shared between the DSMR manager and the API.
#[derive(Clone, Default)]
pub struct MeterRegistry {
    meters: Arc<RwLock<BTreeMap<String, MeterEntry>>>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str, address: &MeterAddress, handle: SupervisorHandle) {
        let status = MeterStatus {
            name: name.to_string(),
            host: address.host.clone(),
            port: address.port,
            state: ConnectionState::Disconnected,
            protocol: DeviceProtocol::Unknown,
            telegrams: 0,
            decode_errors: 0,
            transport_errors: 0,
            last_error: None,
            last_telegram: None,
        };

        self.meters.write().await.insert(name.to_string(), MeterEntry {
            status,
            snapshot: None,
            handle,
        });
    }

    pub async fn count(&self) -> usize {
        self.meters.read().await.len()
    }

    pub async fn list(&self) -> Vec<MeterStatus> {
        self.meters.read().await.values().map(|m| m.status.clone()).collect()
    }

    pub async fn status(&self, name: &str) -> Result<MeterStatus, RegistryError> {
        self.with_entry(name, |m| m.status.clone()).await
    }

    /// Latest decoded snapshot, `None` before the first telegram
    pub async fn snapshot(&self, name: &str) -> Result<Option<Snapshot>, RegistryError> {
        self.with_entry(name, |m| m.snapshot.clone()).await
    }

    /// Fold a supervisor event into the status of `name`.
    pub async fn record(&self, name: &str, event: &SupervisorEvent) {
        let mut meters = self.meters.write().await;
        let Some(entry) = meters.get_mut(name) else {
            return;
        };

        match event {
            SupervisorEvent::Snapshot(snapshot) => {
                entry.status.telegrams += 1;
                entry.status.last_telegram = Some(Utc::now());
                if let Some(version) = &snapshot.version {
                    entry.status.protocol = DeviceProtocol::from_version(version);
                }
                entry.snapshot = Some(snapshot.clone());
            }
            SupervisorEvent::DecodeError { reason, .. } => {
                entry.status.decode_errors += 1;
                entry.status.last_error = Some(reason.clone());
            }
            SupervisorEvent::TransportError(reason) => {
                entry.status.transport_errors += 1;
                entry.status.last_error = Some(reason.clone());
            }
            SupervisorEvent::ConnectionState(state) => entry.status.state = *state,
        }
    }

    pub async fn start(&self, name: &str) -> Result<(), RegistryError> {
        let (handle, address) = self
            .with_entry(name, |m| (m.handle.clone(), MeterAddress::new(m.status.host.clone(), m.status.port)))
            .await?;
        accepted(name, handle.start(address))
    }

    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let handle = self.with_entry(name, |m| m.handle.clone()).await?;
        accepted(name, handle.stop())
    }

    pub async fn reconfigure(&self, name: &str, address: MeterAddress) -> Result<(), RegistryError> {
        let mut meters = self.meters.write().await;
        let entry = meters
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownMeter(name.to_string()))?;

        entry.status.host = address.host.clone();
        entry.status.port = address.port;
        accepted(name, entry.handle.reconfigure(address))
    }

    async fn with_entry<T>(&self, name: &str, f: impl FnOnce(&MeterEntry) -> T) -> Result<T, RegistryError> {
        self.meters
            .read()
            .await
            .get(name)
            .map(f)
            .ok_or_else(|| RegistryError::UnknownMeter(name.to_string()))
    }
}

fn accepted(name: &str, accepted: bool) -> Result<(), RegistryError> {
    if accepted {
        Ok(())
    } else {
        Err(RegistryError::SupervisorGone(name.to_string()))
    }
}
