// InfluxDB sink implementation
use crate::application::metric_sink::{BucketId, MetricSink, OrgId, WritePoint};
use crate::domain::series::Sample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const BATCH_SIZE: usize = 5000;
const LAST_LOOKBACK: &str = "-30d";

#[derive(Debug)]
pub struct InfluxSink {
    host: String,
    token: String,
    org: String,
    bucket: String,
    measurement: String,
    client: reqwest::Client,
    buffer: Mutex<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OrgsResponse {
    #[serde(default)]
    orgs: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketsResponse {
    #[serde(default)]
    buckets: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct DeleteBody {
    start: String,
    stop: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicate: Option<String>,
}

impl InfluxSink {
    pub fn new(
        host: String,
        token: String,
        org: String,
        bucket: String,
        measurement: String,
    ) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            org,
            bucket,
            measurement,
            client: reqwest::Client::new(),
            buffer: Mutex::new(Vec::new()),
        }
    }

    fn write_url(&self) -> String {
        format!(
            "{}/api/v2/write?org={}&bucket={}&precision=s",
            self.host,
            urlencoding::encode(&self.org),
            urlencoding::encode(&self.bucket)
        )
    }

    fn line_protocol(&self, point: &WritePoint) -> String {
        let fields = point
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", escape_tag(name), value))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{},host={} {} {}",
            escape_measurement(&self.measurement),
            escape_tag(&point.host),
            fields,
            point.time.timestamp()
        )
    }

    async fn write_lines(&self, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.write_url())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()
            .await
            .context("failed to send write request to InfluxDB")?;
        ensure_success(response, "write").await
    }
}

async fn ensure_success(response: reqwest::Response, operation: &str) -> Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("InfluxDB {operation} failed with status {status}: {body}");
    }
    Ok(())
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn enqueue(&self, point: WritePoint) -> Result<()> {
        let full_batch = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(self.line_protocol(&point));
            if buffer.len() >= BATCH_SIZE {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        // Lock released before the network call.
        if let Some(batch) = full_batch {
            self.write_lines(&batch).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        self.write_lines(&batch).await
    }

    async fn write(&self, point: WritePoint) -> Result<()> {
        self.write_lines(&[self.line_protocol(&point)]).await
    }

    async fn last_sample(&self, host: &str) -> Result<Option<Sample>> {
        let query = format!(
            "from(bucket:\"{}\") |> range(start: {LAST_LOOKBACK}) |> filter(fn: (r) => r._measurement == \"{}\") |> filter(fn: (r) => r.host == \"{}\") |> last()",
            self.bucket, self.measurement, host
        );
        let url = format!(
            "{}/api/v2/query?org={}",
            self.host,
            urlencoding::encode(&self.org)
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&serde_json::json!({ "query": query, "type": "flux" }))
            .send()
            .await
            .context("failed to send query to InfluxDB")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {status}: {body}");
        }
        let body = response
            .text()
            .await
            .context("failed to read InfluxDB query response")?;
        Ok(parse_last_response(&body))
    }

    async fn resolve_org(&self, name: &str) -> Result<OrgId> {
        let url = format!("{}/api/v2/orgs?org={}", self.host, urlencoding::encode(name));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .context("failed to list organizations")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB organization lookup failed with status {status}: {body}");
        }
        let data = response
            .json::<OrgsResponse>()
            .await
            .context("failed to parse organization response")?;
        data.orgs
            .into_iter()
            .find(|org| org.name == name)
            .map(|org| OrgId(org.id))
            .with_context(|| format!("organization '{name}' not found"))
    }

    async fn resolve_bucket(&self, name: &str) -> Result<BucketId> {
        let url = format!(
            "{}/api/v2/buckets?name={}",
            self.host,
            urlencoding::encode(name)
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .context("failed to list buckets")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB bucket lookup failed with status {status}: {body}");
        }
        let data = response
            .json::<BucketsResponse>()
            .await
            .context("failed to parse bucket response")?;
        data.buckets
            .into_iter()
            .find(|bucket| bucket.name == name)
            .map(|bucket| BucketId(bucket.id))
            .with_context(|| format!("bucket '{name}' not found"))
    }

    async fn delete(
        &self,
        org: &OrgId,
        bucket: &BucketId,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        predicate: Option<String>,
    ) -> Result<()> {
        let url = format!(
            "{}/api/v2/delete?orgID={}&bucketID={}",
            self.host, org.0, bucket.0
        );
        let body = DeleteBody {
            start: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            stop: stop.to_rfc3339_opts(SecondsFormat::Secs, true),
            predicate,
        };
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .json(&body)
            .send()
            .await
            .context("failed to send delete request to InfluxDB")?;
        ensure_success(response, "delete").await
    }
}

/// Parse the annotated CSV of a Flux `last()` query into one sample. Each
/// field arrives as its own table, so rows are folded together; the sample
/// timestamp is the newest `_time` seen.
fn parse_last_response(body: &str) -> Option<Sample> {
    let mut sample = Sample::default();
    let mut found = false;
    let mut time_idx = None;
    let mut value_idx = None;
    let mut field_idx = None;
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.iter().any(|cell| *cell == "_time") {
            // Header row; repeated before every table.
            time_idx = cells.iter().position(|cell| *cell == "_time");
            value_idx = cells.iter().position(|cell| *cell == "_value");
            field_idx = cells.iter().position(|cell| *cell == "_field");
            continue;
        }
        let (Some(ti), Some(vi), Some(fi)) = (time_idx, value_idx, field_idx) else {
            continue;
        };
        if cells.len() <= ti.max(vi).max(fi) {
            continue;
        }
        let Ok(time) = DateTime::parse_from_rfc3339(cells[ti]) else {
            continue;
        };
        let Ok(value) = cells[vi].parse::<f64>() else {
            continue;
        };
        sample.set_field(cells[fi], value);
        sample.timestamp = sample.timestamp.max(time.timestamp());
        found = true;
    }
    found.then_some(sample)
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
