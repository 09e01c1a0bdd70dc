use super::{
    obis_mapping::get_field_handler,
    structs::{Reading, Snapshot},
    utils::{parse_identification_line, parse_number},
    DsmrParseError,
};
use crate::obis_utils::{parse_obis_line, validate_obis_code};
use chrono::{DateTime, Timelike, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

/// Version reported for telegrams without a version line (DSMR 2.2)
pub const LEGACY_VERSION: &str = "22";

lazy_static! {
    // DSMR 2.2 puts the gas reading on a line of its own: (00124.477)
    static ref LEGACY_GAS_LINE: Regex = Regex::new(r"^\((\d{5}\.\d{3})\)$").expect("legacy gas pattern");
}

/// Decode one complete telegram, header line up to the `!` line.
pub fn decode(telegram: &str) -> Result<Snapshot, DsmrParseError> {
    decode_at(telegram, Utc::now())
}

/// Same as [`decode`], `now` stamps legacy telegrams that carry no
/// timestamp line.
pub fn decode_at(telegram: &str, now: DateTime<Utc>) -> Result<Snapshot, DsmrParseError> {
    let mut lines = telegram
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();

    if lines.peek().is_none() {
        return Err(DsmrParseError::TelegramUndecodable("telegram is empty".to_string()));
    }

    // Anything before the header is the tail of the previous frame
    let header = lines
        .by_ref()
        .find(|line| line.starts_with('/'))
        .ok_or_else(|| DsmrParseError::TelegramUndecodable("missing identification line".to_string()))?;

    let mut snapshot = Snapshot {
        identification: parse_identification_line(header)?,
        ..Default::default()
    };

    for line in lines {
        if line.starts_with('!') {
            debug!("End of telegram found");
            break;
        }

        let Some(data) = parse_obis_line(line) else {
            debug!("Skipping line, {}: {line}", DsmrParseError::LineMalformed);
            continue;
        };

        match get_field_handler(&data.code) {
            Some(handler) => {
                if let Err(e) = handler.apply(&mut snapshot, &data) {
                    warn!("Field {} left unset: {e}", data.code);
                }
            }
            None if data.code.is_empty() => decode_legacy_gas(&mut snapshot, line),
            None if validate_obis_code(&data.code) => debug!("Ignoring unhandled OBIS code {}", data.code),
            None => debug!("Ignoring line with malformed OBIS code: {line}"),
        }
    }

    snapshot.electricity.net_power = net_power(&snapshot);

    // Without a version line the timestamp always comes from the clock
    if snapshot.version.is_none() {
        snapshot.version = Some(LEGACY_VERSION.to_string());
        snapshot.timestamp = Some(now.with_nanosecond(0).unwrap_or(now));
    }

    Ok(snapshot)
}

fn decode_legacy_gas(snapshot: &mut Snapshot, line: &str) {
    let Some(captures) = LEGACY_GAS_LINE.captures(line) else {
        debug!("Ignoring line without OBIS code: {line}");
        return;
    };

    match parse_number(&captures[1]) {
        Ok(reading) => snapshot.gas.reading = Some(reading),
        Err(e) => warn!("Legacy gas reading left unset: {e}"),
    }
}

/// Received minus delivered actual power. kW readings are reported in W.
/// Unset as soon as one side is missing.
fn net_power(snapshot: &Snapshot) -> Reading {
    let received = &snapshot.electricity.received.actual;
    let delivered = &snapshot.electricity.delivered.actual;

    if !received.is_set() || !delivered.is_set() {
        return Reading::default();
    }
    let (r, d) = (received.value.unwrap_or_default(), delivered.value.unwrap_or_default());

    match received.unit.as_deref() {
        Some("kW") => Reading::new(((r - d) * 1000.0).round(), Some("W".to_string())),
        unit => Reading::new(r - d, unit.map(str::to_string)),
    }
}
