use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "api")]
use utoipa::ToSchema;

/// DSMR revision a meter speaks, derived from the version line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "api", derive(ToSchema))]
pub enum DeviceProtocol {
    Unknown,
    Dsmr22,
    Dsmr4,
    Dsmr5,
}

impl DeviceProtocol {
    pub fn from_version(version: &str) -> Self {
        // 22 is the marker for telegrams without version line, 42 and 50 are
        // DSMR 4.2 and 5.0, eMUCS meters report a five digit version like 50217
        match version.trim() {
            "22" => DeviceProtocol::Dsmr22,
            v if v.len() == 2 && v.starts_with('4') => DeviceProtocol::Dsmr4,
            v if v.starts_with('5') && (v.len() == 2 || v.len() == 5) => DeviceProtocol::Dsmr5,
            _ => DeviceProtocol::Unknown,
        }
    }
}

impl fmt::Display for DeviceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceProtocol::Unknown => "Unknown",
            DeviceProtocol::Dsmr22 => "DSMR 2.2",
            DeviceProtocol::Dsmr4 => "DSMR 4",
            DeviceProtocol::Dsmr5 => "DSMR 5",
        };
        f.write_str(name)
    }
}
