use crate::config::MeterConfig;
use crate::connection::{Connector, Supervisor, SupervisorEvent, TcpConnector};
use crate::models::DeviceProtocol;
use crate::mqtt::{publish_meter_count, state_topic, PublishData, Transmission};
use crate::registry::MeterRegistry;
use crate::settings::{BaselineStore, BaselineTracker, BaselineUsage};
use crate::MeteringData;
use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

pub mod obis_mapping;
pub mod structs;
pub mod telegram;
pub mod utils;

#[cfg(test)]
pub(crate) mod samples;

use structs::Snapshot;

#[derive(Error, Debug, PartialEq)]
pub enum DsmrParseError {
    #[error("line is not of the form <code>(<value>)")]
    LineMalformed,
    #[error("malformed {0}")]
    FieldMalformed(String),
    #[error("telegram undecodable: {0}")]
    TelegramUndecodable(String),
}

/// Runs one supervisor per configured meter and turns its events into
/// MQTT transmissions.
pub struct DsmrManager {
    sender: Sender<Transmission>,
    registry: MeterRegistry,
    store: Arc<dyn BaselineStore>,
    meters: Vec<MeterConfig>,
}

impl DsmrManager {
    pub fn new(sender: Sender<Transmission>, registry: MeterRegistry, store: Arc<dyn BaselineStore>, meters: Vec<MeterConfig>) -> Self {
        Self { sender, registry, store, meters }
    }

    pub async fn start_thread(&mut self) {
        self.run_with(TcpConnector).await;
    }

    pub async fn run_with<C: Connector + Clone>(&self, connector: C) {
        info!("Starting DSMR thread");

        let mut threads: Vec<JoinHandle<()>> = Vec::new();
        for meter in self.meters.iter() {
            let (handle, events, _supervisor) = Supervisor::spawn(meter.supervisor_config(), connector.clone());
            self.registry.register(&meter.name, &meter.address(), handle.clone()).await;

            if meter.enabled {
                handle.start(meter.address());
            } else {
                info!("[{}] Meter is disabled, not connecting", meter.name);
            }

            let tracker = BaselineTracker::load(&meter.name, self.store.clone()).await;
            threads.push(tokio::spawn(forward_events(
                meter.name.clone(),
                events,
                tracker,
                self.registry.clone(),
                self.sender.clone(),
            )));
        }

        publish_meter_count(&self.sender, self.meters.len()).await;

        if threads.is_empty() {
            warn!("No DSMR meters configured, nothing to do");
            std::future::pending::<()>().await;
        }

        info!("DSMR activated with {} meters", threads.len());
        for thread in threads {
            let _ = thread.await;
        }
    }
}

async fn forward_events(
    name: String,
    mut events: Receiver<SupervisorEvent>,
    mut tracker: BaselineTracker,
    registry: MeterRegistry,
    sender: Sender<Transmission>,
) {
    while let Some(event) = events.recv().await {
        registry.record(&name, &event).await;

        match event {
            SupervisorEvent::Snapshot(snapshot) => {
                let usage = tracker.observe(&snapshot).await;
                match snapshot_to_metering(&name, &snapshot, &usage) {
                    Ok(data) => {
                        let _ = sender.send(Transmission::Metering(data)).await;
                    }
                    Err(e) => error!("[{name}] Unable to convert snapshot: {e}"),
                }
            }
            SupervisorEvent::ConnectionState(state) => {
                let publish = PublishData {
                    topic: state_topic(&name),
                    payload: state.to_string(),
                    qos: 1,
                    retain: true,
                };
                let _ = sender.send(Transmission::Publish(publish)).await;
            }
            SupervisorEvent::DecodeError { reason, raw } => {
                debug!("[{name}] Dropped telegram ({reason}): {raw:?}");
            }
            SupervisorEvent::TransportError(_) => {}
        }
    }

    info!("[{name}] Event stream ended");
}

/// Serialize a snapshot plus the usage since baseline into metering data.
pub fn snapshot_to_metering(name: &str, snapshot: &Snapshot, usage: &BaselineUsage) -> Result<MeteringData, serde_json::Error> {
    let mut mr = MeteringData::new(name);
    mr.protocol = snapshot
        .version
        .as_deref()
        .map(DeviceProtocol::from_version)
        .unwrap_or(DeviceProtocol::Unknown);

    if let Some(timestamp) = snapshot.timestamp {
        mr.metered_time = u64::try_from(timestamp.timestamp()).unwrap_or(mr.metered_time);
    }

    if let serde_json::Value::Object(values) = serde_json::to_value(snapshot)? {
        mr.metered_values = values;
    }
    mr.metered_values.insert("baseline".to_string(), serde_json::to_value(usage)?);

    Ok(mr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::settings::{Baseline, MemoryBaselineStore};
    use chrono::{TimeZone, Utc};
    use samples::{DSMR_22, DSMR_42};
    use std::time::Duration;
    use tokio::{io::AsyncWriteExt, net::TcpListener, time::timeout};

    #[test]
    fn test_snapshot_to_metering() {
        let snapshot = telegram::decode(DSMR_42).unwrap();
        let usage = BaselineUsage {
            gas_since_baseline: Some(1.25),
            energy_since_baseline: None,
        };

        let data = snapshot_to_metering("house", &snapshot, &usage).unwrap();

        assert_eq!(data.meter_name, "house");
        assert_eq!(data.protocol, DeviceProtocol::Dsmr4);
        assert_eq!(data.metered_time, Utc.with_ymd_and_hms(2016, 11, 13, 20, 57, 57).unwrap().timestamp() as u64);
        assert_eq!(data.metered_values["electricity"]["received"]["tariff1"]["value"], 1581.123);
        assert_eq!(data.metered_values["electricity"]["net_power"]["unit"], "W");
        assert_eq!(data.metered_values["gas"]["reading"], 981.443);
        assert_eq!(data.metered_values["baseline"]["gas_since_baseline"], 1.25);
        assert!(data.metered_values["baseline"]["energy_since_baseline"].is_null());
        assert_eq!(
            data.metered_values["electricity"]["long_power_failure_log"]["entries"][0]["start_of_failure"],
            "2010-12-08T15:20:15Z"
        );
    }

    #[test]
    fn test_legacy_snapshot_to_metering() {
        let snapshot = telegram::decode(DSMR_22).unwrap();
        let data = snapshot_to_metering("old", &snapshot, &BaselineUsage::default()).unwrap();
        assert_eq!(data.protocol, DeviceProtocol::Dsmr22);
        assert_eq!(data.metered_values["version"], "22");
    }

    #[tokio::test]
    async fn test_manager_publishes_telegrams() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(DSMR_42.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = Config::from_yaml(&format!(
            "mqtt:\n  host: broker\ndsmr:\n  meters:\n    - name: house\n      host: 127.0.0.1\n      port: {port}\n"
        ))
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        let registry = MeterRegistry::new();
        let store = Arc::new(MemoryBaselineStore::default());
        let manager = DsmrManager::new(tx, registry.clone(), store.clone(), config.dsmr.meters.clone());
        tokio::spawn(async move { manager.run_with(TcpConnector).await });

        let mut states = Vec::new();
        let data = timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await.unwrap() {
                    Transmission::Metering(data) => break data,
                    Transmission::Publish(p) if p.topic == "meters/house/state" => states.push(p.payload),
                    Transmission::Publish(_) => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(data.meter_name, "house");
        assert_eq!(states, vec!["connecting".to_string(), "connected".to_string()]);

        let status = registry.status("house").await.unwrap();
        assert_eq!(status.telegrams, 1);
        assert_eq!(
            store.load("house").unwrap(),
            Baseline {
                gas: Some(981.443),
                energy: Some(1581.123 + 1435.706),
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_meter_stays_disconnected() {
        let config = Config::from_yaml(
            "mqtt:\n  host: broker\ndsmr:\n  meters:\n    - name: garage\n      host: 127.0.0.1\n      enabled: false\n",
        )
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        let registry = MeterRegistry::new();
        let manager = DsmrManager::new(tx, registry.clone(), Arc::new(MemoryBaselineStore::default()), config.dsmr.meters.clone());
        tokio::spawn(async move { manager.run_with(TcpConnector).await });

        match timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap() {
            Transmission::Publish(p) => assert_eq!(p.topic, "mgt/meters/count"),
            Transmission::Metering(_) => panic!("disabled meter must not deliver data"),
        }
        assert_eq!(registry.count().await, 1);
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    }
}
