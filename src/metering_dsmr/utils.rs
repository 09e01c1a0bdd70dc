use super::{structs::{MeterIdentification, MonthlyDemand, MonthlyDemandHistory, PowerFailureLog, PowerFailureLogEntry}, DsmrParseError};
use crate::obis_utils::validate_obis_code;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};

/// Separates the failure count from the entries in `1-0:99.97.0`
const POWER_FAILURE_LOG_DELIMITER: &str = ")(0-0:96.7.19)(";
const GROUP_DELIMITER: &str = ")(";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyReading {
    pub timestamp: Option<DateTime<Utc>>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

pub fn parse_identification_line(line: &str) -> Result<MeterIdentification, DsmrParseError> {
    // Example formats:
    // /ISk5\2MT382-1000
    // /KFM5KAIFA-METER
    // /FLU5\253769484_A

    let content = line
        .strip_prefix('/')
        .ok_or_else(|| DsmrParseError::TelegramUndecodable("missing identification line".to_string()))?;

    let manufacturer = content
        .get(..3)
        .filter(|m| m.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_string);

    debug!("Parsed identification - Manufacturer: {:?}, Type: {}", manufacturer, content);

    Ok(MeterIdentification {
        meter_type: content.to_string(),
        manufacturer,
    })
}

/// `YYMMDDhhmmss` followed by the DST flag (`W`/`S`), which is ignored.
/// The meter's clock is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DsmrParseError> {
    let malformed = || DsmrParseError::FieldMalformed(format!("timestamp '{value}'"));

    let digits = value.get(..12).ok_or_else(malformed)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let field = |start: usize| -> u32 {
        digits[start..start + 2].parse().unwrap_or_default()
    };

    NaiveDate::from_ymd_opt(2000 + field(0) as i32, field(2), field(4))
        .and_then(|date| date.and_hms_opt(field(6), field(8), field(10)))
        .map(|naive| naive.and_utc())
        .ok_or_else(malformed)
}

/// Every two hex digits become one (Latin-1) character.
pub fn hex_to_text(value: &str) -> Result<String, DsmrParseError> {
    let bytes = hex::decode(value)
        .map_err(|e| DsmrParseError::FieldMalformed(format!("hex text '{value}': {e}")))?;

    Ok(bytes.into_iter().map(char::from).collect())
}

pub fn parse_number(value: &str) -> Result<f64, DsmrParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DsmrParseError::FieldMalformed(format!("number '{value}'")))
}

pub fn parse_counter(value: &str) -> Result<u64, DsmrParseError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| DsmrParseError::FieldMalformed(format!("counter '{value}'")))
}

fn leading_digits(value: &str) -> &str {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    &value[..end]
}

/// `<value>*<unit>` into its parts
fn split_unit(value: &str) -> (&str, Option<String>) {
    match value.split_once('*') {
        Some((value, unit)) => (value, Some(unit.to_string())),
        None => (value, None),
    }
}

/// Decode `<count>)(0-0:96.7.19)(<ts1>)(<dur1>*<unit1>)(<ts2>)(<dur2>*<unit2>)...`
///
/// A log whose entries can not be read keeps its count but has no entries.
pub fn parse_power_failure_log(raw: &str) -> PowerFailureLog {
    let (count_part, entries_part) = match raw.split_once(POWER_FAILURE_LOG_DELIMITER) {
        Some((count, entries)) => (count, Some(entries)),
        None => (raw, None),
    };

    let mut log = PowerFailureLog {
        count: leading_digits(count_part).parse().unwrap_or(0),
        entries: Vec::new(),
    };

    let Some(entries_part) = entries_part else {
        return log;
    };

    match parse_power_failure_entries(entries_part) {
        Ok(entries) => log.entries = entries,
        Err(e) => warn!("Power failure log entries dropped: {e}"),
    }

    log
}

fn parse_power_failure_entries(entries: &str) -> Result<Vec<PowerFailureLogEntry>, DsmrParseError> {
    let groups: Vec<&str> = entries.split(GROUP_DELIMITER).collect();
    if groups.len() % 2 != 0 {
        return Err(DsmrParseError::FieldMalformed(format!("power failure log '{entries}'")));
    }

    groups
        .chunks(2)
        .map(|pair| {
            let end_of_failure = parse_timestamp(pair[0])?;
            let (duration, unit) = split_unit(pair[1]);
            let duration = parse_counter(duration)?;

            Ok(PowerFailureLogEntry {
                end_of_failure,
                duration,
                unit: unit.unwrap_or_default(),
            })
        })
        .collect()
}

/// Decode `<timestamp>)(<value>*<unit>`, each missing part stays `None`.
pub fn parse_hourly_reading(raw: &str) -> HourlyReading {
    let Some((timestamp, reading)) = raw.split_once(GROUP_DELIMITER) else {
        return HourlyReading::default();
    };

    let (value, unit) = split_unit(reading);

    HourlyReading {
        timestamp: parse_timestamp(timestamp).ok(),
        value: parse_number(value).ok(),
        unit,
    }
}

/// Decode the maximum demand history of `0-0:98.1.0`:
/// `<count>)(<code>)(<code>)(<month>)(<ts>)(<value>*<unit>)...`
pub fn parse_monthly_demand(raw: &str) -> MonthlyDemandHistory {
    let mut groups = raw.split(GROUP_DELIMITER);

    let mut history = MonthlyDemandHistory {
        count: groups.next().map(leading_digits).and_then(|c| c.parse().ok()).unwrap_or(0),
        months: Vec::new(),
    };

    let values: Vec<&str> = groups.skip_while(|g| validate_obis_code(g)).collect();
    if values.len() % 3 != 0 {
        warn!("Monthly demand history has an incomplete entry: {raw}");
        return history;
    }

    let months: Result<Vec<MonthlyDemand>, DsmrParseError> = values
        .chunks(3)
        .map(|entry| {
            let (value, unit) = split_unit(entry[2]);
            Ok(MonthlyDemand {
                month: parse_timestamp(entry[0])?,
                timestamp: parse_timestamp(entry[1])?,
                value: parse_number(value)?,
                unit,
            })
        })
        .collect();

    match months {
        Ok(months) => history.months = months,
        Err(e) => warn!("Monthly demand history dropped: {e}"),
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_identification_line() {
        let id = parse_identification_line("/ISk5\\2MT382-1000").unwrap();
        assert_eq!(id.meter_type, "ISk5\\2MT382-1000");
        assert_eq!(id.manufacturer, Some("ISk".to_string()));

        let id = parse_identification_line("/5X").unwrap();
        assert_eq!(id.manufacturer, None);

        assert!(matches!(
            parse_identification_line("1-0:1.8.1(000123.456*kWh)"),
            Err(DsmrParseError::TelegramUndecodable(_))
        ));
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("231231235959").unwrap();
        assert_eq!(ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), "2023-12-31T23:59:59.000Z");

        let ts = parse_timestamp("101209113020W").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2010, 12, 9, 11, 30, 20).unwrap());
    }

    #[test]
    fn test_parse_timestamp_malformed() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2312312359").is_err());
        assert!(parse_timestamp("23123123595X").is_err());
        assert!(parse_timestamp("231331235959W").is_err());
    }

    #[test]
    fn test_hex_to_text() {
        assert_eq!(hex_to_text("48656C6C6F").unwrap(), "Hello");
        assert_eq!(hex_to_text("").unwrap(), "");
        assert!(hex_to_text("48656").is_err());
        assert!(hex_to_text("4X").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("000123.456").unwrap(), 123.456);
        assert_eq!(parse_number("-01.5").unwrap(), -1.5);
        assert!(parse_number("").is_err());
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("abc").is_err());
    }

    #[test]
    fn test_parse_power_failure_log() {
        let log = parse_power_failure_log(
            "2)(0-0:96.7.19)(101208152415W)(0000000240*s)(101208151004W)(0000000301*s",
        );

        assert_eq!(log.count, 2);
        assert_eq!(log.entries.len(), 2);

        let first = &log.entries[0];
        assert_eq!(first.end_of_failure, Utc.with_ymd_and_hms(2010, 12, 8, 15, 24, 15).unwrap());
        assert_eq!(first.duration, 240);
        assert_eq!(first.unit, "s");
        assert_eq!(first.start_of_failure(), Some(Utc.with_ymd_and_hms(2010, 12, 8, 15, 20, 15).unwrap()));

        let second = &log.entries[1];
        assert_eq!(second.duration, 301);
        assert_eq!(second.start_of_failure(), Some(Utc.with_ymd_and_hms(2010, 12, 8, 15, 5, 3).unwrap()));
    }

    #[test]
    fn test_parse_power_failure_log_without_entries() {
        let log = parse_power_failure_log("0)(0-0:96.7.19");
        assert_eq!(log.count, 0);
        assert!(log.entries.is_empty());
    }

    #[test]
    fn test_parse_power_failure_log_malformed_entries() {
        let log = parse_power_failure_log("2)(0-0:96.7.19)(1012081524)(0000000240*s");
        assert_eq!(log.count, 2);
        assert!(log.entries.is_empty());

        let log = parse_power_failure_log("1)(0-0:96.7.19)(101208152415W");
        assert_eq!(log.count, 1);
        assert!(log.entries.is_empty());
    }

    #[test]
    fn test_parse_hourly_reading() {
        let reading = parse_hourly_reading("101209110000W)(12785.123*m3");
        assert_eq!(reading.timestamp, Some(Utc.with_ymd_and_hms(2010, 12, 9, 11, 0, 0).unwrap()));
        assert_eq!(reading.value, Some(12785.123));
        assert_eq!(reading.unit, Some("m3".to_string()));

        let reading = parse_hourly_reading("101209110000W)(12785.123");
        assert_eq!(reading.value, Some(12785.123));
        assert_eq!(reading.unit, None);

        assert_eq!(parse_hourly_reading("12785.123*m3"), HourlyReading::default());
    }

    #[test]
    fn test_parse_monthly_demand() {
        let history = parse_monthly_demand(
            "2)(1-0:1.6.0)(1-0:1.6.0)(230101000000W)(221206183000W)(02.789*kW)(230201000000W)(230127174500W)(03.456*kW",
        );

        assert_eq!(history.count, 2);
        assert_eq!(history.months.len(), 2);
        assert_eq!(history.months[0].month, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(history.months[0].timestamp, Utc.with_ymd_and_hms(2022, 12, 6, 18, 30, 0).unwrap());
        assert_eq!(history.months[1].value, 3.456);
        assert_eq!(history.months[1].unit, Some("kW".to_string()));
    }

    #[test]
    fn test_parse_monthly_demand_incomplete() {
        let history = parse_monthly_demand("1)(1-0:1.6.0)(1-0:1.6.0)(230101000000W)(221206183000W");
        assert_eq!(history.count, 1);
        assert!(history.months.is_empty());
    }
}
