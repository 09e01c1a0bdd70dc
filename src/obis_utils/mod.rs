/// One decoded telegram line: `<code>(<value>[*<unit>])`, possibly with more
/// `)(`-joined groups for compound fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ObisData {
    pub code: String,
    /// Payload before the first `*`, or the whole payload if there is none
    pub value: String,
    pub unit: Option<String>,
    /// Everything between the first `(` and the final `)`, untouched
    pub raw: String,
}

/// Split a trimmed protocol line into code, value and unit.
///
/// Returns `None` for lines without an opening parenthesis or without a
/// closing one after it; those lines are not data lines and get skipped.
pub fn parse_obis_line(line: &str) -> Option<ObisData> {
    // Example formats:
    // 1-0:1.8.1(000123.456*kWh)
    // 0-0:1.0.0(101209113020W)
    // 1-0:99.97.0(2)(0-0:96.7.19)(101208152415W)(0000000240*s)
    // (00124.477)

    let line = line.trim();

    let paren_start = line.find('(')?;
    let paren_end = line.rfind(')')?;

    if paren_end < paren_start {
        return None;
    }

    let code = normalize_obis_code(&line[..paren_start]);
    let raw = &line[paren_start + 1..paren_end];

    let (value, unit) = match raw.split_once('*') {
        Some((value, unit)) => (value.to_string(), Some(unit.to_string())),
        None => (raw.to_string(), None),
    };

    Some(ObisData {
        code,
        value,
        unit,
        raw: raw.to_string(),
    })
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E*F
    // A: Medium (0=abstract, 1=electricity, 6=heat, 7=gas, 8=water)
    // B: Channel (0-15)
    // C: Physical value (1-255)
    // D: Processing method (0-255)
    // E: Tariff/Time (0-255)
    // F: Storage (optional, 0-255)

    let parts: Vec<&str> = code.split(':').collect();
    if parts.len() != 2 {
        return false;
    }

    let ab_parts: Vec<&str> = parts[0].split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    let cde_part = parts[1];
    let cde_parts: Vec<&str> = if cde_part.contains('*') {
        cde_part.split('*').next().unwrap_or("").split('.').collect()
    } else {
        cde_part.split('.').collect()
    };

    if cde_parts.len() != 3 {
        return false;
    }

    ab_parts
        .iter()
        .chain(cde_parts.iter())
        .all(|part| part.parse::<u8>().is_ok())
}

pub fn normalize_obis_code(code: &str) -> String {
    code.trim().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obis_line_with_unit() {
        let data = parse_obis_line("1-0:1.8.1(000123.456*kWh)").unwrap();
        assert_eq!(data.code, "1-0:1.8.1");
        assert_eq!(data.value, "000123.456");
        assert_eq!(data.unit, Some("kWh".to_string()));
        assert_eq!(data.raw, "000123.456*kWh");
    }

    #[test]
    fn test_parse_obis_line_without_unit() {
        let data = parse_obis_line("0-0:96.14.0(0002)").unwrap();
        assert_eq!(data.code, "0-0:96.14.0");
        assert_eq!(data.value, "0002");
        assert_eq!(data.unit, None);
    }

    #[test]
    fn test_parse_obis_line_empty_value() {
        let data = parse_obis_line("0-0:96.13.0()").unwrap();
        assert_eq!(data.code, "0-0:96.13.0");
        assert_eq!(data.value, "");
        assert_eq!(data.unit, None);
    }

    #[test]
    fn test_parse_compound_line_keeps_raw_payload() {
        let data = parse_obis_line("0-1:24.2.1(101209110000W)(12785.123*m3)").unwrap();
        assert_eq!(data.code, "0-1:24.2.1");
        assert_eq!(data.raw, "101209110000W)(12785.123*m3");
        assert_eq!(data.value, "101209110000W)(12785.123");
        assert_eq!(data.unit, Some("m3".to_string()));
    }

    #[test]
    fn test_parse_line_without_code() {
        let data = parse_obis_line("(00124.477)").unwrap();
        assert_eq!(data.code, "");
        assert_eq!(data.value, "00124.477");
    }

    #[test]
    fn test_parse_non_data_lines() {
        assert_eq!(parse_obis_line("/ISk5\\2MT382-1000"), None);
        assert_eq!(parse_obis_line("!522B"), None);
        assert_eq!(parse_obis_line("1-0:1.8.1(000123.456"), None);
        assert_eq!(parse_obis_line("1-0:1.8.1)("), None);
    }

    #[test]
    fn test_validate_obis_code() {
        assert!(validate_obis_code("1-0:1.8.1"));
        assert!(validate_obis_code("0-0:1.0.0"));
        assert!(validate_obis_code("1-0:99.97.0"));
        assert!(!validate_obis_code("invalid"));
        assert!(!validate_obis_code("1:2.3.4"));
        assert!(!validate_obis_code("1-0:1.8"));
    }

    #[test]
    fn test_normalize_obis_code() {
        assert_eq!(normalize_obis_code("  1-0:1.8.1  "), "1-0:1.8.1");
        assert_eq!(normalize_obis_code("1-0: 1.8.1"), "1-0:1.8.1");
    }
}
