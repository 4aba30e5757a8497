//! Date parsing for `date` schemas.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// How timestamps given as numbers are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampUnit {
    /// Milliseconds since the epoch.
    Javascript,
    /// Seconds since the epoch.
    Unix,
}

impl TimestampUnit {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "javascript" => Some(Self::Javascript),
            "unix" => Some(Self::Unix),
            _ => None,
        }
    }
}

/// A moment-style format (`YYYY-MM-DD`) with its chrono equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pub source: String,
    chrono: String,
    has_time: bool,
}

impl DateFormat {
    /// Translate moment tokens (`YYYY YY MM M DD D HH H mm m ss s SSS`).
    pub fn parse(source: &str) -> Result<Self, String> {
        let chars: Vec<char> = source.chars().collect();
        let mut chrono = String::new();
        let mut has_time = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }

            if !c.is_ascii_alphabetic() {
                for _ in 0..run {
                    if c == '%' {
                        chrono.push_str("%%");
                    } else {
                        chrono.push(c);
                    }
                }
                i += run;
                continue;
            }

            let token = match (c, run) {
                ('Y', 4) => "%Y",
                ('Y', 2) => "%y",
                ('M', 1 | 2) => "%m",
                ('D', 1 | 2) => "%d",
                ('H', 1 | 2) => "%H",
                ('m', 1 | 2) => "%M",
                ('s', 1 | 2) => "%S",
                ('S', 3) => "%3f",
                _ => {
                    let token: String = chars[i..i + run].iter().collect();
                    return Err(format!("unsupported date token '{}'", token));
                }
            };

            has_time |= matches!(c, 'H' | 'm' | 's' | 'S');
            chrono.push_str(token);
            i += run;
        }

        Ok(Self {
            source: source.to_string(),
            chrono,
            has_time,
        })
    }

    pub(crate) fn read(&self, text: &str) -> Option<DateTime<Utc>> {
        if self.has_time {
            NaiveDateTime::parse_from_str(text, &self.chrono)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        } else {
            NaiveDate::parse_from_str(text, &self.chrono)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Parse an ISO 8601 string: full RFC 3339, naive date-time, or date.
pub(crate) fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Interpret a number as a timestamp in the given unit.
pub(crate) fn from_timestamp(n: f64, unit: TimestampUnit) -> Option<DateTime<Utc>> {
    let millis = match unit {
        TimestampUnit::Javascript => n,
        TimestampUnit::Unix => n * 1000.0,
    };
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

/// Read a JSON value as a timestamp number, accepting numeric strings.
pub(crate) fn timestamp_number(value: &Value, convert: bool) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if convert => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Render the way a JSON-serialized JavaScript `Date` looks.
pub(crate) fn render(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
