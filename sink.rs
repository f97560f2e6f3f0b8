use std::fmt::Write as _;
use std::time::Duration;

use log::info;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;

use crate::error::{Error, Result};
use crate::structs::Sample;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where accepted samples go.
pub trait SampleSink {
    fn write(&mut self, sample: &Sample) -> Result<()>;

    fn close(&mut self) {}
}

/// Static parts of every point written.
#[derive(Debug, Clone)]
pub struct PointLayout {
    pub measurement: String,
    pub location: String,
    pub version: String,
}

impl PointLayout {
    /// Encodes a sample as one line of InfluxDB line protocol.
    pub fn encode(&self, sample: &Sample) -> String {
        let mut line = String::with_capacity(192);
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        line.push_str(",location=");
        escape_into(&mut line, &self.location, &[',', '=', ' ']);
        let _ = write!(
            line,
            " temperature={},pressure={},altitude={},humidity={},aqi={}i,tvoc={}i,eco2={}i,version=\"",
            sample.temperature,
            sample.pressure,
            sample.altitude,
            sample.humidity,
            sample.aqi,
            sample.tvoc,
            sample.eco2,
        );
        escape_into(&mut line, &self.version, &['"', '\\']);
        let _ = write!(line, "\" {}", sample.timestamp_ns);
        line
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Writes points through the InfluxDB v2 HTTP API.
pub struct InfluxSink {
    // `None` once closed
    client: Option<Client>,
    write_url: Url,
    layout: PointLayout,
}

impl InfluxSink {
    pub fn connect(
        base_url: &str,
        org: &str,
        bucket: &str,
        token: Option<&str>,
        layout: PointLayout,
    ) -> Result<Self> {
        let mut base =
            Url::parse(base_url).map_err(|e| Error::SinkConfig(format!("{base_url}: {e}")))?;
        // keep a path prefix such as `/influx` when joining
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        let mut write_url = base
            .join("api/v2/write")
            .map_err(|e| Error::SinkConfig(format!("{base_url}: {e}")))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", "ns");

        let mut headers = HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut auth = HeaderValue::from_str(&format!("Token {token}"))
                .map_err(|_| Error::SinkConfig("token contains invalid header characters".into()))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(WRITE_TIMEOUT)
            .build()?;

        info!("writing to {} (org {}, bucket {})", base, org, bucket);
        Ok(Self {
            client: Some(client),
            write_url,
            layout,
        })
    }
}

impl SampleSink for InfluxSink {
    fn write(&mut self, sample: &Sample) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::SinkConfig("write after close".into()))?;
        let response = client
            .post(self.write_url.clone())
            .body(self.layout.encode(sample))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::SinkRejected { status, body });
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!("closed connection to {}", self.write_url.origin().ascii_serialization());
        }
    }
}

/// Dry-run sink: logs the encoded point instead of sending it.
pub struct LogSink {
    layout: PointLayout,
}

impl LogSink {
    pub fn new(layout: PointLayout) -> Self {
        Self { layout }
    }
}

impl SampleSink for LogSink {
    fn write(&mut self, sample: &Sample) -> Result<()> {
        info!("{}", self.layout.encode(sample));
        Ok(())
    }
}
