//! Location events and tolerant sensor-line parsing.
//!
//! The receiver firmware has shipped three different line formats over its
//! lifetime, and deployed units are never all on the same version. Parsing
//! therefore tries each format in order and the first one that yields a
//! usable fix wins.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Signal strength reported when the line carries no RSSI field, in dBm.
///
/// A conservative mid-range value: weak enough not to overstate link
/// quality, strong enough not to trip low-signal alerts.
pub const DEFAULT_RSSI: i16 = -75;

/// Status tag used when the line carries no status field.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// A single geolocation event captured from the sensor link.
///
/// Invariant: `lat` and `lng` are finite and neither is zero. The 0,0
/// point is the receiver's "no fix" sentinel and is rejected at parse
/// time, so an event that exists always describes a real position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationEvent {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Status tag transmitted by the beacon (e.g. `CHECK_IN`).
    pub status: String,
    /// The cleaned wire line this event was parsed from.
    pub raw: String,
    /// Timestamp when the event was captured (if known).
    ///
    /// Set by the ingest path at capture time via
    /// [`with_captured_at`](Self::with_captured_at).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub captured_at: Option<time::OffsetDateTime>,
}

impl LocationEvent {
    /// Parse a `LocationEvent` from one line of sensor-link text.
    ///
    /// Non-printable bytes are stripped first, then three extraction
    /// strategies are tried in order:
    ///
    /// 1. Key-value tokens: `Lat:13.756500,Lng:121.058300,Status:CHECK_IN,RSSI:-65`
    /// 2. Wrapped delivery report: `RECEIVED: 'Lat:...,Lng:...' | RSSI: -65`
    /// 3. Bare comma-separated triple: `13.756500,121.058300,CHECK_IN`
    ///
    /// The first strategy that yields two finite, non-zero coordinates
    /// wins. RSSI defaults to [`DEFAULT_RSSI`] and status to
    /// [`UNKNOWN_STATUS`] when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NoFix`] if coordinates were extracted but read
    /// as the 0,0 no-fix sentinel, [`ParseError::NonFiniteCoordinate`] for
    /// NaN/infinite values, and [`ParseError::Unparseable`] when no format
    /// matched. All variants carry the cleaned line.
    ///
    /// # Examples
    ///
    /// ```
    /// use waymark_types::LocationEvent;
    ///
    /// let event = LocationEvent::parse("Lat:13.756500,Lng:121.058300,Status:CHECK_IN").unwrap();
    /// assert_eq!(event.status, "CHECK_IN");
    /// assert!(LocationEvent::parse("Lat:0,Lng:0").is_err());
    /// ```
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn parse(raw: &str) -> ParseResult<Self> {
        let line = clean_line(raw);

        let mut saw_no_fix = false;
        let mut saw_non_finite = false;

        for extract in [extract_key_value, extract_delivery_report, extract_csv_triple] {
            let Some(fix) = extract(&line) else {
                continue;
            };
            if !fix.lat.is_finite() || !fix.lng.is_finite() {
                saw_non_finite = true;
                continue;
            }
            if fix.lat == 0.0 || fix.lng == 0.0 {
                saw_no_fix = true;
                continue;
            }
            return Ok(LocationEvent {
                lat: fix.lat,
                lng: fix.lng,
                rssi: fix.rssi.unwrap_or(DEFAULT_RSSI),
                status: fix.status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
                raw: line,
                captured_at: None,
            });
        }

        if saw_no_fix {
            Err(ParseError::NoFix(line))
        } else if saw_non_finite {
            Err(ParseError::NonFiniteCoordinate(line))
        } else {
            Err(ParseError::Unparseable(line))
        }
    }

    /// Set the captured timestamp.
    ///
    /// Capture time is wall-clock at ingest; the wire formats carry no
    /// usable timestamp of their own.
    #[must_use]
    pub fn with_captured_at(mut self, now: time::OffsetDateTime) -> Self {
        self.captured_at = Some(now);
        self
    }
}

impl fmt::Display for LocationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}, {:.6} ({}, {} dBm)",
            self.lat, self.lng, self.status, self.rssi
        )
    }
}

/// Raw extraction result before fix validation.
struct RawFix {
    lat: f64,
    lng: f64,
    rssi: Option<i16>,
    status: Option<String>,
}

/// Strip non-printable bytes and surrounding whitespace.
fn clean_line(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect()
}

/// Value of a `Key:` field, up to the next comma.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let value = rest[..rest.find(',').unwrap_or(rest.len())].trim();
    (!value.is_empty()).then_some(value)
}

/// Leading `[-+0-9.]` run of a field, mirroring the firmware's loose
/// number formatting (trailing junk after a number is tolerated).
fn numeric_prefix(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '-' || c == '+' || c == '.'))
        .unwrap_or(s.len());
    &s[..end]
}

fn parse_coord(s: &str) -> Option<f64> {
    numeric_prefix(s).parse().ok()
}

fn parse_rssi(s: &str) -> Option<i16> {
    numeric_prefix(s).parse().ok()
}

/// Strategy 1: direct key-value tokens.
fn extract_key_value(line: &str) -> Option<RawFix> {
    // Wrapped delivery reports also contain Lat:/Lng: tokens, but their
    // outer RSSI field must win; leave them to strategy 2.
    if line.contains("RECEIVED:") {
        return None;
    }

    let lat = parse_coord(field(line, "Lat:")?)?;
    let lng = parse_coord(field(line, "Lng:")?)?;

    Some(RawFix {
        lat,
        lng,
        rssi: field(line, "RSSI:").and_then(parse_rssi),
        status: field(line, "Status:").map(str::to_string),
    })
}

/// Strategy 2: wrapped delivery report with an outer signal-strength field.
///
/// `RECEIVED: 'Lat:...,Lng:...,Status:...' | RSSI: -65`
fn extract_delivery_report(line: &str) -> Option<RawFix> {
    let rest = &line[line.find("RECEIVED:")? + "RECEIVED:".len()..];

    let open = rest.find('\'')?;
    let close = rest[open + 1..].find('\'')? + open + 1;
    let payload = &rest[open + 1..close];

    let mut fix = extract_key_value(payload)?;
    // The outer RSSI is measured at the receiver and wins over anything
    // the payload might claim.
    if let Some(rssi) = field(&rest[close + 1..], "RSSI:").and_then(parse_rssi) {
        fix.rssi = Some(rssi);
    }
    Some(fix)
}

/// Strategy 3: bare `lat,lng[,status]` triple.
fn extract_csv_triple(line: &str) -> Option<RawFix> {
    let mut parts = line.split(',');
    let lat = parse_coord(parts.next()?.trim())?;
    let lng = parse_coord(parts.next()?.trim())?;
    let status = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(RawFix {
        lat,
        lng,
        rssi: None,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value_format() {
        let event =
            LocationEvent::parse("Lat:13.756500,Lng:121.058300,Time:12:34:56,Status:CHECK_IN")
                .unwrap();

        assert!((event.lat - 13.7565).abs() < 1e-9);
        assert!((event.lng - 121.0583).abs() < 1e-9);
        assert_eq!(event.status, "CHECK_IN");
        assert_eq!(event.rssi, DEFAULT_RSSI);
    }

    #[test]
    fn test_parse_key_value_with_rssi() {
        let event = LocationEvent::parse("Lat:13.7565,Lng:121.0583,Status:SOS,RSSI:-62").unwrap();
        assert_eq!(event.rssi, -62);
        assert_eq!(event.status, "SOS");
    }

    #[test]
    fn test_parse_delivery_report_format() {
        let line = "RECEIVED: 'Lat:13.756500,Lng:121.058300,Time:12:34:56,Status:CHECK_IN' | RSSI: -65";
        let event = LocationEvent::parse(line).unwrap();

        assert!((event.lat - 13.7565).abs() < 1e-9);
        assert_eq!(event.rssi, -65);
        assert_eq!(event.status, "CHECK_IN");
    }

    #[test]
    fn test_parse_csv_triple_format() {
        let event = LocationEvent::parse("13.756500,121.058300,CHECK_IN").unwrap();
        assert!((event.lat - 13.7565).abs() < 1e-9);
        assert_eq!(event.status, "CHECK_IN");
        assert_eq!(event.rssi, DEFAULT_RSSI);
    }

    #[test]
    fn test_parse_csv_pair_defaults_status() {
        let event = LocationEvent::parse("13.7565,121.0583").unwrap();
        assert_eq!(event.status, UNKNOWN_STATUS);
    }

    #[test]
    fn test_parse_strips_non_printable_bytes() {
        let event = LocationEvent::parse("\x02Lat:13.7565,\x1bLng:121.0583\r").unwrap();
        assert!((event.lat - 13.7565).abs() < 1e-9);
        assert_eq!(event.raw, "Lat:13.7565,Lng:121.0583");
    }

    #[test]
    fn test_parse_is_idempotent_on_clean_input() {
        let line = "Lat:13.756500,Lng:121.058300,Status:CHECK_IN";
        let first = LocationEvent::parse(line).unwrap();
        let second = LocationEvent::parse(&first.raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_rejects_zero_zero_fix() {
        let err = LocationEvent::parse("Lat:0.000000,Lng:0.000000,Status:CHECK_IN").unwrap_err();
        assert!(matches!(err, ParseError::NoFix(_)));
    }

    #[test]
    fn test_parse_rejects_single_zero_coordinate() {
        assert!(LocationEvent::parse("Lat:0,Lng:121.0583").is_err());
        assert!(LocationEvent::parse("13.7565,0").is_err());
    }

    #[test]
    fn test_parse_failure_carries_cleaned_line() {
        let err = LocationEvent::parse("  garbage packet\x07  ").unwrap_err();
        assert_eq!(err.line(), "garbage packet");
        assert!(matches!(err, ParseError::Unparseable(_)));
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(LocationEvent::parse("").is_err());
        assert!(LocationEvent::parse("   \r\n").is_err());
    }

    #[test]
    fn test_parse_negative_coordinates() {
        let event = LocationEvent::parse("Lat:-33.865143,Lng:-70.673676,Status:CHECK_IN").unwrap();
        assert!(event.lat < 0.0);
        assert!(event.lng < 0.0);
    }

    #[test]
    fn test_parse_tolerates_trailing_junk_after_number() {
        let event = LocationEvent::parse("Lat:13.7565degN,Lng:121.0583degE").unwrap();
        assert!((event.lat - 13.7565).abs() < 1e-9);
    }

    #[test]
    fn test_delivery_report_outer_rssi_wins() {
        let line = "RECEIVED: 'Lat:13.7565,Lng:121.0583,RSSI:-99' | RSSI: -41";
        let event = LocationEvent::parse(line).unwrap();
        assert_eq!(event.rssi, -41);
    }

    #[test]
    fn test_delivery_report_without_payload_falls_through() {
        // No coordinates anywhere: strategy 2 and 3 both fail.
        assert!(LocationEvent::parse("RECEIVED: 'hello' | RSSI: -65").is_err());
    }

    #[test]
    fn test_with_captured_at() {
        let now = time::OffsetDateTime::now_utc();
        let event = LocationEvent::parse("13.7565,121.0583").unwrap().with_captured_at(now);
        assert_eq!(event.captured_at, Some(now));
    }

    #[test]
    fn test_display() {
        let event = LocationEvent::parse("Lat:13.7565,Lng:121.0583,Status:CHECK_IN").unwrap();
        let text = format!("{}", event);
        assert!(text.contains("13.756500"));
        assert!(text.contains("CHECK_IN"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialization_roundtrip() {
        let event = LocationEvent::parse("Lat:13.7565,Lng:121.0583,Status:CHECK_IN,RSSI:-60")
            .unwrap()
            .with_captured_at(time::OffsetDateTime::UNIX_EPOCH);

        let json = serde_json::to_string(&event).unwrap();
        let back: LocationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
