use chrono::{DateTime, Utc};

// Character positions of the digits in an `HH:MM:SS` clock field.
const CLOCK_DIGITS: [usize; 6] = [0, 1, 3, 4, 6, 7];

/// Seconds since local midnight as reported by the board's own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockCode(u32);

impl ClockCode {
    /// Decodes `HH:MM:SS`. Separators are not checked, only the six digit positions.
    pub fn parse(field: &str) -> Option<ClockCode> {
        let bytes = field.as_bytes();
        let mut d = [0u32; 6];
        for (slot, &pos) in CLOCK_DIGITS.iter().enumerate() {
            let b = *bytes.get(pos)?;
            if !b.is_ascii_digit() {
                return None;
            }
            d[slot] = u32::from(b - b'0');
        }
        Some(ClockCode(
            (d[0] * 10 + d[1]) * 3600 + (d[2] * 10 + d[3]) * 60 + d[4] * 10 + d[5],
        ))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn is_midnight(self) -> bool {
        self.0 == 0
    }
}

/// Comma separated fields of one line, terminator already removed.
pub struct RawRecord<'a> {
    fields: Vec<&'a str>,
}

impl<'a> RawRecord<'a> {
    /// The board appends one terminator character after the last field.
    pub fn from_line(line: &'a str) -> RawRecord<'a> {
        let line = line.trim();
        let body = match line.char_indices().last() {
            Some((idx, _)) => &line[..idx],
            None => line,
        };
        RawRecord {
            fields: body.split(',').collect(),
        }
    }

    pub fn clock(&self) -> Option<ClockCode> {
        self.fields.first().and_then(|f| ClockCode::parse(f))
    }

    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.fields.get(index).copied()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub clock: ClockCode,
    pub temperature: f64,
    pub pressure: f64,
    pub altitude: f64,
    pub humidity: f64,
    pub aqi: i64,
    pub tvoc: i64,
    pub eco2: i64,
    // ingestion time, not the board clock
    pub timestamp_ns: i64,
}

impl Sample {
    pub fn received_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_nanos(self.timestamp_ns)
    }
}
