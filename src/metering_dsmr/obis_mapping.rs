use super::{
    structs::{MaximumDemand, Reading, Snapshot},
    utils::{hex_to_text, parse_counter, parse_hourly_reading, parse_monthly_demand, parse_number, parse_power_failure_log, parse_timestamp},
    DsmrParseError,
};
use crate::obis_utils::ObisData;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// How the value of one OBIS line lands in the snapshot.
#[derive(Clone, Copy)]
pub enum FieldHandler {
    /// Number with optional `*unit`
    Reading(fn(&mut Snapshot) -> &mut Reading),
    Counter(fn(&mut Snapshot) -> &mut Option<u64>),
    Text(fn(&mut Snapshot) -> &mut Option<String>),
    HexText(fn(&mut Snapshot) -> &mut Option<String>),
    Timestamp(fn(&mut Snapshot) -> &mut Option<DateTime<Utc>>),
    PowerFailureLog,
    GasReading,
    /// DSMR 2.2 gas header, the reading itself follows on its own line
    LegacyGasHeader,
    MaximumDemand(fn(&mut Snapshot) -> &mut Option<MaximumDemand>),
    MonthlyDemand,
}

pub static OBIS_TABLE: &[(&str, FieldHandler)] = &[
    // Header data
    ("1-3:0.2.8", FieldHandler::Text(|s| &mut s.version)),
    ("0-0:96.1.4", FieldHandler::Text(|s| &mut s.version)),
    ("0-0:1.0.0", FieldHandler::Timestamp(|s| &mut s.timestamp)),
    ("0-0:96.1.1", FieldHandler::Text(|s| &mut s.equipment_id)),
    ("0-0:96.13.1", FieldHandler::Text(|s| &mut s.text_message.codes)),
    ("0-0:96.13.0", FieldHandler::HexText(|s| &mut s.text_message.message)),

    // Energy totals and actual power
    ("1-0:1.8.1", FieldHandler::Reading(|s| &mut s.electricity.received.tariff1)),
    ("1-0:1.8.2", FieldHandler::Reading(|s| &mut s.electricity.received.tariff2)),
    ("1-0:2.8.1", FieldHandler::Reading(|s| &mut s.electricity.delivered.tariff1)),
    ("1-0:2.8.2", FieldHandler::Reading(|s| &mut s.electricity.delivered.tariff2)),
    ("1-0:1.7.0", FieldHandler::Reading(|s| &mut s.electricity.received.actual)),
    ("1-0:2.7.0", FieldHandler::Reading(|s| &mut s.electricity.delivered.actual)),
    ("0-0:96.14.0", FieldHandler::Counter(|s| &mut s.electricity.tariff_indicator)),

    // Limits and breaker
    ("0-0:17.0.0", FieldHandler::Reading(|s| &mut s.electricity.threshold)),
    ("1-0:31.4.0", FieldHandler::Reading(|s| &mut s.electricity.fuse_threshold)),
    ("0-0:96.3.10", FieldHandler::Text(|s| &mut s.electricity.switch_position)),

    // Power quality
    ("0-0:96.7.21", FieldHandler::Counter(|s| &mut s.electricity.power_failures)),
    ("0-0:96.7.9", FieldHandler::Counter(|s| &mut s.electricity.long_power_failures)),
    ("1-0:99.97.0", FieldHandler::PowerFailureLog),
    ("1-0:32.32.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_sags.l1)),
    ("1-0:52.32.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_sags.l2)),
    ("1-0:72.32.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_sags.l3)),
    ("1-0:32.36.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_swells.l1)),
    ("1-0:52.36.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_swells.l2)),
    ("1-0:72.36.0", FieldHandler::Counter(|s| &mut s.electricity.voltage_swells.l3)),

    // Instantaneous values per phase
    ("1-0:31.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.current.l1)),
    ("1-0:51.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.current.l2)),
    ("1-0:71.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.current.l3)),
    ("1-0:32.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.voltage.l1)),
    ("1-0:52.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.voltage.l2)),
    ("1-0:72.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.voltage.l3)),
    ("1-0:21.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_positive.l1)),
    ("1-0:41.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_positive.l2)),
    ("1-0:61.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_positive.l3)),
    ("1-0:22.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_negative.l1)),
    ("1-0:42.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_negative.l2)),
    ("1-0:62.7.0", FieldHandler::Reading(|s| &mut s.electricity.instantaneous.power_negative.l3)),

    // Capacity tariff (eMUCS)
    ("1-0:1.4.0", FieldHandler::Reading(|s| &mut s.electricity.demand.positive_current)),
    ("1-0:2.4.0", FieldHandler::Reading(|s| &mut s.electricity.demand.negative_current)),
    ("1-0:1.6.0", FieldHandler::MaximumDemand(|s| &mut s.electricity.demand.positive_maximum)),
    ("1-0:2.6.0", FieldHandler::MaximumDemand(|s| &mut s.electricity.demand.negative_maximum)),
    ("0-0:98.1.0", FieldHandler::MonthlyDemand),

    // Gas on M-Bus channel 1
    ("0-1:24.1.0", FieldHandler::Text(|s| &mut s.gas.device_type)),
    ("0-1:96.1.0", FieldHandler::Text(|s| &mut s.gas.equipment_id)),
    ("0-1:24.2.1", FieldHandler::GasReading),
    ("0-1:24.2.3", FieldHandler::GasReading),
    ("0-1:24.4.0", FieldHandler::Text(|s| &mut s.gas.valve_position)),
    ("0-1:24.3.0", FieldHandler::LegacyGasHeader),
];

lazy_static! {
    static ref OBIS_DISPATCH: HashMap<&'static str, FieldHandler> = OBIS_TABLE.iter().copied().collect();
}

pub fn get_field_handler(code: &str) -> Option<FieldHandler> {
    OBIS_DISPATCH.get(code).copied()
}

impl FieldHandler {
    /// Store the line's value in the snapshot. On error the field is left
    /// untouched.
    pub fn apply(self, snapshot: &mut Snapshot, line: &ObisData) -> Result<(), DsmrParseError> {
        match self {
            FieldHandler::Reading(field) => {
                *field(snapshot) = Reading::new(parse_number(&line.value)?, line.unit.clone());
            }
            FieldHandler::Counter(field) => {
                *field(snapshot) = Some(parse_counter(&line.value)?);
            }
            FieldHandler::Text(field) => {
                *field(snapshot) = Some(line.raw.clone());
            }
            FieldHandler::HexText(field) => {
                *field(snapshot) = Some(hex_to_text(&line.raw)?);
            }
            FieldHandler::Timestamp(field) => {
                *field(snapshot) = Some(parse_timestamp(&line.raw)?);
            }
            FieldHandler::PowerFailureLog => {
                snapshot.electricity.long_power_failure_log = Some(parse_power_failure_log(&line.raw));
            }
            FieldHandler::GasReading => {
                let hourly = parse_hourly_reading(&line.raw);
                snapshot.gas.timestamp = hourly.timestamp;
                snapshot.gas.reading = hourly.value;
                snapshot.gas.unit = hourly.unit;
            }
            FieldHandler::LegacyGasHeader => {
                // (090212160000)(00)(60)(1)(0-1:24.2.1)(m3)
                let groups: Vec<&str> = line.raw.split(")(").collect();
                snapshot.gas.timestamp = Some(parse_timestamp(groups[0])?);
                if groups.len() > 1 {
                    snapshot.gas.unit = groups.last().map(|unit| unit.to_string());
                }
            }
            FieldHandler::MaximumDemand(field) => {
                let hourly = parse_hourly_reading(&line.raw);
                *field(snapshot) = Some(MaximumDemand {
                    timestamp: hourly.timestamp,
                    reading: Reading {
                        value: hourly.value,
                        unit: hourly.unit,
                    },
                });
            }
            FieldHandler::MonthlyDemand => {
                snapshot.electricity.demand.maximum_last_months = Some(parse_monthly_demand(&line.raw));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obis_utils::{parse_obis_line, validate_obis_code};
    use std::collections::HashSet;

    fn apply_line(snapshot: &mut Snapshot, line: &str) -> Result<(), DsmrParseError> {
        let data = parse_obis_line(line).unwrap();
        get_field_handler(&data.code).unwrap().apply(snapshot, &data)
    }

    #[test]
    fn test_table_codes_are_valid_and_unique() {
        let mut seen = HashSet::new();
        for (code, _) in OBIS_TABLE {
            assert!(validate_obis_code(code), "invalid code {code}");
            assert!(seen.insert(*code), "duplicate code {code}");
        }
        assert_eq!(OBIS_DISPATCH.len(), OBIS_TABLE.len());
    }

    #[test]
    fn test_unknown_code_has_no_handler() {
        assert!(get_field_handler("1-0:14.7.0").is_none());
        assert!(get_field_handler("").is_none());
    }

    #[test]
    fn test_apply_reading() {
        let mut snapshot = Snapshot::default();
        apply_line(&mut snapshot, "1-0:2.8.2(000123.456*kWh)").unwrap();
        assert_eq!(snapshot.electricity.delivered.tariff2, Reading::new(123.456, Some("kWh".to_string())));
    }

    #[test]
    fn test_apply_malformed_leaves_field_unset() {
        let mut snapshot = Snapshot::default();
        assert!(apply_line(&mut snapshot, "1-0:1.8.1(garbage*kWh)").is_err());
        assert!(apply_line(&mut snapshot, "0-0:96.7.21(abc)").is_err());
        assert!(apply_line(&mut snapshot, "0-0:1.0.0(1012)").is_err());
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn test_apply_gas_reading() {
        let mut snapshot = Snapshot::default();
        apply_line(&mut snapshot, "0-1:24.2.1(101209110000W)(12785.123*m3)").unwrap();
        assert_eq!(snapshot.gas.reading, Some(12785.123));
        assert_eq!(snapshot.gas.unit, Some("m3".to_string()));
        assert!(snapshot.gas.timestamp.is_some());
    }

    #[test]
    fn test_apply_legacy_gas_header() {
        let mut snapshot = Snapshot::default();
        apply_line(&mut snapshot, "0-1:24.3.0(090212160000)(00)(60)(1)(0-1:24.2.1)(m3)").unwrap();
        assert_eq!(snapshot.gas.unit, Some("m3".to_string()));
        assert_eq!(snapshot.gas.timestamp, Some(parse_timestamp("090212160000").unwrap()));
        assert_eq!(snapshot.gas.reading, None);
    }

    #[test]
    fn test_apply_maximum_demand() {
        let mut snapshot = Snapshot::default();
        apply_line(&mut snapshot, "1-0:1.6.0(200509134558S)(02.589*kW)").unwrap();
        let maximum = snapshot.electricity.demand.positive_maximum.unwrap();
        assert_eq!(maximum.reading, Reading::new(2.589, Some("kW".to_string())));
        assert!(maximum.timestamp.is_some());
    }
}
