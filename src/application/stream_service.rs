// Replay scheduler - paced emission of a single host's series
use crate::application::anomaly_injector::AnomalyInjector;
use crate::application::error::ReplayError;
use crate::application::metric_sink::{MetricSink, WritePoint};
use crate::application::metric_source::{MetricSource, host_id_from_path};
use crate::domain::anomaly::AnomalyEvent;
use crate::domain::series::Sample;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct StreamParams {
    pub file: PathBuf,
    #[serde(default)]
    pub start_at: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub anomaly: Option<String>,
    /// Scale factor on real elapsed time: >1 compresses, <1 stretches.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Resume after the most recent point already in the sink instead of
    /// starting at the current wall clock.
    #[serde(default)]
    pub append: bool,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Terminal states of a replay. Sink and load failures are errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { written: usize },
    /// Append mode needs at least two samples to derive a resume delta.
    InsufficientHistory,
    /// The future-time guard fired: the computed insert time overtook the
    /// wall clock, so the remaining samples were never written.
    TruncatedAtFutureTime { written: usize, dropped: usize },
}

pub struct StreamService {
    sink: Arc<dyn MetricSink>,
    source: Arc<dyn MetricSource>,
    injector: Arc<dyn AnomalyInjector>,
}

impl StreamService {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        source: Arc<dyn MetricSource>,
        injector: Arc<dyn AnomalyInjector>,
    ) -> Self {
        Self {
            sink,
            source,
            injector,
        }
    }

    /// Configuration checks that need no sink I/O.
    pub fn validate(&self, params: &StreamParams) -> Result<(), ReplayError> {
        if !params.multiplier.is_finite() || params.multiplier <= 0.0 {
            return Err(ReplayError::InvalidMultiplier(params.multiplier));
        }
        if !params.append && params.multiplier > 1.0 {
            return Err(ReplayError::MultiplierWithoutAppend(params.multiplier));
        }
        if let Some(algorithm) = &params.anomaly {
            if !self.injector.supports(algorithm) {
                return Err(ReplayError::UnknownAlgorithm(algorithm.clone()));
            }
        }
        Ok(())
    }

    /// Replay one host's series against the sink, one linear pass, no
    /// retries.
    pub async fn stream(&self, params: StreamParams) -> Result<StreamOutcome, ReplayError> {
        self.validate(&params)?;
        let host = host_id_from_path(&params.file);

        let mut insert_time = if params.append {
            let last = self
                .sink
                .last_sample(&host)
                .await?
                .ok_or_else(|| ReplayError::NoResumePoint(host.clone()))?;
            DateTime::<Utc>::from_timestamp(last.timestamp, 0)
                .with_context(|| format!("last point of '{host}' has an invalid timestamp"))?
        } else {
            Utc::now()
        };

        let mut series = self.source.load(&params.file, &host).await?;
        series.slice_between(params.start_at, params.duration);
        if let Some(algorithm) = &params.anomaly {
            series = self.injector.inject(&series, algorithm).await?;
        }

        if params.append {
            if series.len() < 2 {
                tracing::warn!(%host, "not enough samples to derive a resume delta");
                return Ok(StreamOutcome::InsufficientHistory);
            }
            // Hop one delta forward so the resumed stream does not repeat
            // the last persisted point.
            let delta = series.samples[1].timestamp - series.samples[0].timestamp;
            insert_time += Duration::seconds(delta);
        }

        if series.is_empty() {
            return Ok(StreamOutcome::Completed { written: 0 });
        }

        tracing::info!(%host, samples = series.len(), multiplier = params.multiplier, "replaying series");
        let samples = &mut series.samples;
        let count = samples.len();
        for i in 0..count - 1 {
            if insert_time > Utc::now() {
                let dropped = count - i;
                tracing::warn!(
                    %host,
                    written = i,
                    dropped,
                    "insert time is ahead of the wall clock, stopping replay"
                );
                return Ok(StreamOutcome::TruncatedAtFutureTime { written: i, dropped });
            }
            let delta = samples[i + 1].timestamp - samples[i].timestamp;
            self.write_sample(&mut samples[i], &host, insert_time, params.anomaly.as_deref())
                .await?;
            insert_time += Duration::seconds(delta);
            tokio::time::sleep(std::time::Duration::from_secs_f64(
                delta as f64 / params.multiplier,
            ))
            .await;
        }
        // The last sample has no next sample to derive a delta from, so it
        // is never subject to the pacing sleep.
        self.write_sample(
            &mut samples[count - 1],
            &host,
            insert_time,
            params.anomaly.as_deref(),
        )
        .await?;

        tracing::info!(%host, written = count, "replay complete");
        Ok(StreamOutcome::Completed { written: count })
    }

    async fn write_sample(
        &self,
        sample: &mut Sample,
        host: &str,
        time: DateTime<Utc>,
        algorithm: Option<&str>,
    ) -> Result<(), ReplayError> {
        sample.timestamp = time.timestamp();
        let point = WritePoint {
            host: host.to_string(),
            fields: sample.fields().to_vec(),
            time,
        };
        self.sink.write(point).await?;
        tracing::info!(%host, time = %time.to_rfc3339(), "metric written");
        if let Some(algorithm) = algorithm {
            for event in AnomalyEvent::for_sample(sample, host, time, algorithm) {
                tracing::info!(
                    host = %event.host,
                    field = event.field,
                    time = %event.time.to_rfc3339(),
                    algorithm = %event.comment,
                    "anomalous point written"
                );
            }
        }
        Ok(())
    }
}
