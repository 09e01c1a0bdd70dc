use chrono::{DateTime, TimeDelta, Utc};
use serde::{ser::SerializeStruct, Serialize, Serializer};

/// A numeric measurement with its unit. `None` means the telegram did not
/// carry the value, which is different from a reading of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reading {
    pub value: Option<f64>,
    pub unit: Option<String>,
}

impl Reading {
    pub fn new(value: f64, unit: Option<String>) -> Self {
        Reading {
            value: Some(value),
            unit,
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerPhase<T> {
    pub l1: T,
    pub l2: T,
    pub l3: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyRegisters {
    pub tariff1: Reading,
    pub tariff2: Reading,
    /// Instantaneous power in this direction
    pub actual: Reading,
}

impl EnergyRegisters {
    /// Sum of both tariff totals, only if both are present.
    pub fn total(&self) -> Option<f64> {
        Some(self.tariff1.value? + self.tariff2.value?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Instantaneous {
    pub current: PerPhase<Reading>,
    pub voltage: PerPhase<Reading>,
    pub power_positive: PerPhase<Reading>,
    pub power_negative: PerPhase<Reading>,
}

/// One entry of the long power failure event log.
///
/// The start of the failure is never stored, it is derived from the end
/// timestamp and the duration.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFailureLogEntry {
    pub end_of_failure: DateTime<Utc>,
    pub duration: u64,
    pub unit: String,
}

impl PowerFailureLogEntry {
    pub fn start_of_failure(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.duration)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|duration| self.end_of_failure.checked_sub_signed(duration))
    }
}

impl Serialize for PowerFailureLogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entry = serializer.serialize_struct("PowerFailureLogEntry", 4)?;
        entry.serialize_field("start_of_failure", &self.start_of_failure())?;
        entry.serialize_field("end_of_failure", &self.end_of_failure)?;
        entry.serialize_field("duration", &self.duration)?;
        entry.serialize_field("unit", &self.unit)?;
        entry.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerFailureLog {
    pub count: u32,
    pub entries: Vec<PowerFailureLogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaximumDemand {
    pub timestamp: Option<DateTime<Utc>>,
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyDemand {
    pub month: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyDemandHistory {
    pub count: u32,
    pub months: Vec<MonthlyDemand>,
}

/// Capacity tariff fields (DSMR 5 eMUCS meters)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemandData {
    pub positive_current: Reading,
    pub negative_current: Reading,
    pub positive_maximum: Option<MaximumDemand>,
    pub negative_maximum: Option<MaximumDemand>,
    pub maximum_last_months: Option<MonthlyDemandHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElectricityData {
    pub received: EnergyRegisters,
    pub delivered: EnergyRegisters,
    /// Received minus delivered instantaneous power in W
    pub net_power: Reading,
    pub tariff_indicator: Option<u64>,
    pub threshold: Reading,
    pub fuse_threshold: Reading,
    pub switch_position: Option<String>,
    pub power_failures: Option<u64>,
    pub long_power_failures: Option<u64>,
    pub long_power_failure_log: Option<PowerFailureLog>,
    pub voltage_sags: PerPhase<Option<u64>>,
    pub voltage_swells: PerPhase<Option<u64>>,
    pub instantaneous: Instantaneous,
    pub demand: DemandData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GasData {
    pub device_type: Option<String>,
    pub equipment_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub reading: Option<f64>,
    pub unit: Option<String>,
    pub valve_position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextMessage {
    pub codes: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterIdentification {
    /// Header line without the leading `/`
    pub meter_type: String,
    pub manufacturer: Option<String>,
}

/// Everything decoded from one telegram.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub identification: MeterIdentification,
    /// Always set after decoding, either from the telegram or the legacy marker
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub equipment_id: Option<String>,
    pub text_message: TextMessage,
    pub electricity: ElectricityData,
    pub gas: GasData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_failure_is_derived() {
        let entry = PowerFailureLogEntry {
            end_of_failure: Utc.with_ymd_and_hms(2010, 12, 8, 15, 24, 15).unwrap(),
            duration: 240,
            unit: "s".to_string(),
        };

        assert_eq!(
            entry.start_of_failure(),
            Some(Utc.with_ymd_and_hms(2010, 12, 8, 15, 20, 15).unwrap())
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["start_of_failure"], "2010-12-08T15:20:15Z");
        assert_eq!(json["duration"], 240);
    }

    #[test]
    fn test_start_of_failure_overflow() {
        let entry = PowerFailureLogEntry {
            end_of_failure: Utc.with_ymd_and_hms(2010, 12, 8, 15, 24, 15).unwrap(),
            duration: u64::MAX,
            unit: "s".to_string(),
        };
        assert_eq!(entry.start_of_failure(), None);
    }

    #[test]
    fn test_energy_total_needs_both_tariffs() {
        let mut registers = EnergyRegisters::default();
        registers.tariff1 = Reading::new(1.5, Some("kWh".to_string()));
        assert_eq!(registers.total(), None);

        registers.tariff2 = Reading::new(2.5, Some("kWh".to_string()));
        assert_eq!(registers.total(), Some(4.0));
    }
}
