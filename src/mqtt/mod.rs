use lazy_static::lazy_static;
use tokio::sync::RwLock;
use crate::config::MqttConfig;
use crate::models::DeviceProtocol;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{Receiver, Sender};
use serde::{Serialize, Deserialize};
use serde_json;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::{Duration, Instant};
use uuid::Uuid;


#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MqttConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Clone)]
pub struct MqttHealthStatus {
    pub status: MqttConnectionStatus,
    pub last_connected: Option<Instant>,
    pub last_message_sent: Option<Instant>,
    pub connection_attempts: u64,
}

#[derive(Clone)]
pub struct AppStatus {
    pub start_time: Instant,
    pub mqtt_health: MqttHealthStatus,
}

impl MqttHealthStatus {
    pub fn new() -> Self {
        Self {
            status: MqttConnectionStatus::Disconnected,
            last_connected: None,
            last_message_sent: None,
            connection_attempts: 0,
        }
    }
}

impl AppStatus {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_health: MqttHealthStatus::new(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TransmissionValueType {
    Now,
}

/// One decoded telegram on its way to the broker
#[derive(Debug, Serialize, Deserialize)]
pub struct MeteringData {
    pub id: String,
    pub meter_name: String,
    pub protocol: DeviceProtocol,
    pub transmission_time: u64,
    pub transmission_type: TransmissionValueType,
    pub metered_time: u64,
    pub metered_values: serde_json::Map<String, serde_json::Value>
}

impl MeteringData {
    pub fn new(meter_name: &str) -> Self {
        let now = crate::get_unix_ts();
        return MeteringData {
            id: Uuid::new_v4().to_string(),
            meter_name: meter_name.to_string(),
            protocol: DeviceProtocol::Unknown,
            transmission_time: now,
            transmission_type: TransmissionValueType::Now,
            metered_time: now,
            metered_values: serde_json::Map::new()
        };
    }
}

/// Raw publish, `topic` is relative to the base topic
pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

pub enum Transmission {
    Metering(MeteringData),
    Publish(PublishData)
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    client: AsyncClient,
    base_topic: String,
}

lazy_static! {
    pub static ref APP_STATUS: RwLock<AppStatus> = RwLock::new(AppStatus::new());
}

pub fn meter_topic(meter_name: &str) -> String {
    format!("meters/{meter_name}")
}

pub fn state_topic(meter_name: &str) -> String {
    format!("meters/{meter_name}/state")
}

fn full_topic(base: &str, topic: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), topic)
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> (Self, Sender<Transmission>) {
        let (mtx,mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection starting up");
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // The event loop has to be polled for anything to go out
        tokio::spawn( async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        let mut app_status = APP_STATUS.write().await;
                        app_status.mqtt_health.status = MqttConnectionStatus::Connected;
                        app_status.mqtt_health.last_connected = Some(Instant::now());
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        {
                            let mut app_status = APP_STATUS.write().await;
                            app_status.mqtt_health.status = MqttConnectionStatus::Error(e.to_string());
                            app_status.mqtt_health.connection_attempts += 1;
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        return (MqttManager {
            client: client,
            rx: mrx,
            base_topic: config.base_topic.clone(),
        }, mtx);
    }

    pub async fn start_thread(&mut self) {
        // Handle all the incomming metering stuff
        while let Some(transmission) = self.rx.recv().await {
            match transmission {
                Transmission::Metering(data) => self.publish_metering(data).await,
                Transmission::Publish(publish_data) => {
                    match self.client.publish(
                        full_topic(&self.base_topic, &publish_data.topic),
                        qos_from_u8(publish_data.qos),
                        publish_data.retain,
                        publish_data.payload
                    ).await {
                        Err(e) => { error!("Error publishing: {}", e); },
                        Ok(_) => { debug!("Published successfully"); }
                    }
                },
            };
        }

        info!("All senders gone, MQTT thread exits");
    }

    async fn publish_metering(&self, data: MeteringData) {
        debug!("Metering data received: {}", data.id);

        let raw = match serde_json::to_string(&data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Unable to serialize metering data {}: {e}", data.id);
                return;
            }
        };

        match self.client.publish(full_topic(&self.base_topic, "raw"), QoS::AtLeastOnce, false, raw).await {
            Err(e) => { error!("Error sending: {}", e); },
            Ok(_) => {
                debug!("Send successfully");
                APP_STATUS.write().await.mqtt_health.last_message_sent = Some(Instant::now());
            }
        }

        if let Ok(values) = serde_json::to_string(&data.metered_values) {
            let _ = self.client.publish(full_topic(&self.base_topic, &meter_topic(&data.meter_name)),
                                        QoS::AtLeastOnce,
                                        false,
                                        values).await;
        }
    }
}

pub async fn get_app_status() -> AppStatus {
    APP_STATUS.read().await.clone()
}

pub async fn publish_uptime(mqtt_sender: &Sender<Transmission>) {
    let app_status = get_app_status().await;

    let uptime_publish = PublishData {
        topic: "mgt/uptime".to_string(),
        payload: app_status.uptime_seconds().to_string(),
        qos: 1,
        retain: true,
    };
    let _ = mqtt_sender.send(Transmission::Publish(uptime_publish)).await;
}

pub async fn publish_meter_count(mqtt_sender: &Sender<Transmission>, count: usize) {
    let count_publish = PublishData {
        topic: "mgt/meters/count".to_string(),
        payload: count.to_string(),
        qos: 1,
        retain: true,
    };
    let _ = mqtt_sender.send(Transmission::Publish(count_publish)).await;
}
