//! Reads DSMR P1 telegrams from TCP exposed smart meter ports and forwards
//! them to MQTT.
//!
//! Every meter gets its own connection supervisor that keeps the transport
//! alive, frames and decodes telegrams and reports them as events.

pub mod models;
#[cfg(feature = "api")]
pub mod api;
pub mod mqtt;
pub mod config;
pub mod connection;
pub mod metering_dsmr;
pub mod obis_utils;
pub mod registry;
pub mod settings;

// Re-export common types for easier access
pub use mqtt::MeteringData;
#[cfg(feature = "api")]
pub use api::ApiManager;
pub use config::{ConfigHolder, SharedConfig};
pub use connection::{ConnectionState, MeterAddress, Supervisor, SupervisorEvent, SupervisorHandle};
pub use metering_dsmr::{telegram::decode, DsmrManager};
pub use registry::MeterRegistry;

pub fn get_unix_ts() -> u64 {
    return std::time::SystemTime::now().duration_since(std::time::SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
}
