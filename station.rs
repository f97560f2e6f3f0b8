use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::extractor::{SampleExtractor, Step};
use crate::frame::{open_serial, ByteSource, FrameReader};
use crate::sink::{InfluxSink, LogSink, SampleSink};

/// Counters reported when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub lines: u64,
    pub discarded: u64,
    pub duplicates: u64,
    pub suppressed: u64,
    pub emitted: u64,
}

/// Opens the serial port and the sink, then forwards samples until
/// `cancel` fires or an I/O error occurs. Both handles are released
/// before returning.
pub fn run(config: &Config, cancel: &CancellationToken) -> Result<Totals> {
    let uart = open_serial(&config.serial_port, config.baud_rate, config.read_timeout())?;
    info!("opened {} at {} baud", config.serial_port, config.baud_rate);

    let mut sink: Box<dyn SampleSink> = if config.dry_run {
        info!("dry run, points are only logged");
        Box::new(LogSink::new(config.layout()))
    } else {
        Box::new(InfluxSink::connect(
            &config.influx_url,
            &config.org,
            &config.bucket,
            config.token.as_deref(),
            config.layout(),
        )?)
    };

    forward(FrameReader::new(uart), sink.as_mut(), cancel)
}

/// Runs the loop with a fresh extractor and closes the sink on every exit path.
pub fn forward<S, K>(
    mut reader: FrameReader<S>,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<Totals>
where
    S: ByteSource,
    K: SampleSink + ?Sized,
{
    let mut extractor = SampleExtractor::new();
    let result = pump(&mut reader, &mut extractor, sink, cancel);
    sink.close();
    result
}

/// The ingest loop proper: one line at a time, at most one write per clock tick.
pub fn pump<S, K>(
    reader: &mut FrameReader<S>,
    extractor: &mut SampleExtractor,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<Totals>
where
    S: ByteSource,
    K: SampleSink + ?Sized,
{
    let mut totals = Totals::default();
    while !cancel.is_cancelled() {
        let line = reader.read_line()?;
        if line.is_empty() {
            continue;
        }
        totals.lines += 1;

        match extractor.feed(&line) {
            Step::Discarded => totals.discarded += 1,
            Step::Unchanged => totals.duplicates += 1,
            Step::Primed(_) => {
                let baseline = extractor.last_accepted_clock();
                debug!("waiting for the clock to move past {}s", baseline);
            }
            Step::Suppressed(clock) => {
                debug!("clock at {}s, not emitting", clock.seconds());
                totals.suppressed += 1;
            }
            Step::Emitted(sample) => {
                debug!(
                    "{} {} {} {} {} {} {} {}",
                    sample.received_at().to_rfc3339(),
                    sample.temperature,
                    sample.pressure,
                    sample.altitude,
                    sample.humidity,
                    sample.aqi,
                    sample.tvoc,
                    sample.eco2
                );
                sink.write(&sample)?;
                totals.emitted += 1;
            }
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::frame::testing::ScriptedSource;
    use crate::sink::testing::RecordingSink;
    use crate::structs::Sample;

    fn pump_lines(lines: &[&str]) -> (Totals, RecordingSink) {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::lines(lines).cancel_when_drained(cancel.clone());
        let mut reader = FrameReader::new(source);
        let mut extractor = SampleExtractor::new();
        let mut sink = RecordingSink::default();
        let totals = pump(&mut reader, &mut extractor, &mut sink, &cancel).unwrap();
        (totals, sink)
    }

    #[test]
    fn test_duplicate_then_advance_writes_one_point() {
        let (totals, sink) = pump_lines(&[
            "00:00:01,21.5,1001.3,50.0,40.2,12,100,400;",
            "00:00:01,21.5,1001.3,50.0,40.2,12,100,400;",
            "00:00:02,22.0,1002.0,51.0,41.0,13,110,410;",
        ]);

        assert_eq!(sink.samples.len(), 1);
        assert_eq!(sink.samples[0].temperature, 22.0);
        assert_eq!(sink.samples[0].aqi, 13);
        assert_eq!(
            totals,
            Totals {
                lines: 3,
                discarded: 0,
                duplicates: 1,
                suppressed: 0,
                emitted: 1,
            }
        );
    }

    #[test]
    fn test_boot_chatter_and_midnight_rollover() {
        let (totals, sink) = pump_lines(&[
            "Manufacturer ID: ef",
            "Device ID: 17",
            "23:59:58,20.0,1000.0,10.0,30.0,1,2,3;",
            "23:59:59,20.1,1000.0,10.0,30.0,1,2,3;",
            "00:00:00,20.2,1000.0,10.0,30.0,1,2,3;",
            "00:00:01,20.3,1000.0,10.0,30.0,1,2,3;",
        ]);

        let temps: Vec<f64> = sink.samples.iter().map(|s| s.temperature).collect();
        assert_eq!(temps, vec![20.1, 20.3]);
        assert_eq!(totals.discarded, 2);
        assert_eq!(totals.suppressed, 1);
        assert_eq!(totals.emitted, 2);
    }

    #[test]
    fn test_samples_follow_clock_order() {
        let (_, sink) = pump_lines(&[
            "08:00:00,1,0,0,0,0,0,0;",
            "08:00:01,2,0,0,0,0,0,0;",
            "08:00:01,2,0,0,0,0,0,0;",
            "08:00:02,3,0,0,0,0,0,0;",
            "08:00:03,4,0,0,0,0,0,0;",
        ]);
        let clocks: Vec<u32> = sink.samples.iter().map(|s| s.clock.seconds()).collect();
        assert_eq!(clocks, vec![28801, 28802, 28803]);
    }

    #[test]
    fn test_stops_immediately_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = FrameReader::new(ScriptedSource::lines(&["00:00:01,1;", "00:00:02,1;"]));
        let mut sink = RecordingSink::default();
        let totals = pump(&mut reader, &mut SampleExtractor::new(), &mut sink, &cancel).unwrap();
        assert_eq!(totals, Totals::default());
        assert!(sink.samples.is_empty());
    }

    #[derive(Default)]
    struct FailingSink {
        writes: u32,
        closed: bool,
    }

    impl SampleSink for FailingSink {
        fn write(&mut self, _sample: &Sample) -> Result<()> {
            self.writes += 1;
            Err(Error::SinkConfig("unreachable".into()))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_sink_error_stops_the_loop_and_closes() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::lines(&["00:00:01,1;", "00:00:02,1;", "00:00:03,1;"])
            .cancel_when_drained(cancel.clone());
        let mut sink = FailingSink::default();
        let err = forward(FrameReader::new(source), &mut sink, &cancel).unwrap_err();
        assert!(matches!(err, Error::SinkConfig(_)));
        assert_eq!(sink.writes, 1);
        assert!(sink.closed);
    }

    #[test]
    fn test_forward_closes_sink_after_cancel() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::lines(&["00:00:01,1;", "00:00:02,1;"])
            .cancel_when_drained(cancel.clone());
        let mut sink = RecordingSink::default();
        let totals = forward(FrameReader::new(source), &mut sink, &cancel).unwrap();
        assert_eq!(totals.emitted, 1);
        assert!(sink.closed);
    }

    #[test]
    fn test_forward_through_trait_object() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::lines(&["00:00:01,1;", "00:00:02,1;", "00:00:03,1;"])
            .cancel_when_drained(cancel.clone());
        let mut sink: Box<dyn SampleSink> = Box::new(RecordingSink::default());
        let totals = forward(FrameReader::new(source), sink.as_mut(), &cancel).unwrap();
        assert_eq!(totals.emitted, 2);
    }
}
