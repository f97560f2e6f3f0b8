use std::str::FromStr;

use chrono::Utc;
use log::debug;

use crate::structs::{ClockCode, RawRecord, Sample};

/// What a single line did to the extractor.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// The clock field was not `HH:MM:SS`; state untouched.
    Discarded,
    /// Same clock as the last accepted record.
    Unchanged,
    /// First clock after start-up. Only remembered, never emitted.
    Primed(ClockCode),
    /// Clock advanced to midnight. Remembered, not emitted.
    Suppressed(ClockCode),
    Emitted(Sample),
}

/// Deduplicates the board's output by its embedded clock.
///
/// The board repeats a line until its clock ticks over, so a record is only
/// accepted when its clock differs from the previously accepted one. The very
/// first clock seen after start-up is treated as a baseline and dropped.
#[derive(Debug, Default)]
pub struct SampleExtractor {
    last_accepted: Option<ClockCode>,
}

impl SampleExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds of the last accepted clock, 0 before anything was accepted.
    pub fn last_accepted_clock(&self) -> u32 {
        self.last_accepted.map_or(0, ClockCode::seconds)
    }

    pub fn feed(&mut self, line: &str) -> Step {
        let record = RawRecord::from_line(line);
        let Some(clock) = record.clock() else {
            if !line.is_empty() {
                debug!("ignoring line without clock: {:?}", line);
            }
            return Step::Discarded;
        };

        let previous = self.last_accepted.replace(clock);
        match previous {
            Some(prev) if prev == clock => Step::Unchanged,
            None => {
                debug!("clock baseline {}s", clock.seconds());
                Step::Primed(clock)
            }
            Some(_) if clock.is_midnight() => Step::Suppressed(clock),
            Some(_) => {
                if record.field_count() < 8 {
                    debug!("short record ({} fields) at {}s", record.field_count(), clock.seconds());
                }
                Step::Emitted(decode_sample(&record, clock))
            }
        }
    }
}

fn decode_sample(record: &RawRecord<'_>, clock: ClockCode) -> Sample {
    Sample {
        clock,
        temperature: float_or_zero(record.field(1)),
        pressure: float_or_zero(record.field(2)),
        altitude: float_or_zero(record.field(3)),
        humidity: float_or_zero(record.field(4)),
        aqi: parse_or(record.field(5), 0),
        tvoc: parse_or(record.field(6), 0),
        eco2: parse_or(record.field(7), 0),
        timestamp_ns: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
    }
}

/// Parses a column, falling back on anything unparseable or missing.
fn parse_or<T: FromStr>(field: Option<&str>, fallback: T) -> T {
    field
        .and_then(|f| f.trim().parse().ok())
        .unwrap_or(fallback)
}

// NaN and infinities are refused by the time-series store.
fn float_or_zero(field: Option<&str>) -> f64 {
    let value: f64 = parse_or(field, 0.0);
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
