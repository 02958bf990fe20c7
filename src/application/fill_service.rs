// Bulk loader - concurrent ingestion of metric files into the sink
use crate::application::anomaly_injector::AnomalyInjector;
use crate::application::error::ReplayError;
use crate::application::metric_sink::{MetricSink, WritePoint};
use crate::application::metric_source::{MetricSource, host_id_from_path};
use crate::application::progress::{
    ProgressEvent, ProgressNotifier, ProgressTracker, spawn_aggregator,
};
use crate::domain::anomaly::AnomalyEvent;
use crate::domain::series::HostSeries;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

const PROGRESS_BUFFER: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct FillParams {
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub start_at: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub anomaly: Option<String>,
    /// Seconds between the series' last sample and "now".
    #[serde(default)]
    pub gap: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    pub files_loaded: usize,
    pub files_failed: usize,
    pub points_written: u64,
}

pub struct FillService {
    sink: Arc<dyn MetricSink>,
    source: Arc<dyn MetricSource>,
    injector: Arc<dyn AnomalyInjector>,
    progress: Arc<ProgressTracker>,
    max_concurrency: usize,
}

impl FillService {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        source: Arc<dyn MetricSource>,
        injector: Arc<dyn AnomalyInjector>,
        progress: Arc<ProgressTracker>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            sink,
            source,
            injector,
            progress,
            max_concurrency,
        }
    }

    /// Configuration checks that need no sink I/O.
    pub fn validate(&self, params: &FillParams) -> Result<(), ReplayError> {
        if let Some(algorithm) = &params.anomaly {
            if !self.injector.supports(algorithm) {
                return Err(ReplayError::UnknownAlgorithm(algorithm.clone()));
            }
        }
        Ok(())
    }

    /// Ingest every file concurrently. A file that fails to load or inject
    /// is skipped and counted; a gap larger than any loaded series' span
    /// refuses the whole operation before a single write goes out.
    pub async fn fill(&self, params: FillParams) -> Result<FillReport, ReplayError> {
        self.validate(&params)?;

        tracing::info!(files = params.files.len(), "filling sink with metrics");
        self.progress.begin(params.files.len() as u64);
        let (notifier, rx) = ProgressNotifier::channel(PROGRESS_BUFFER);
        let aggregator = spawn_aggregator(self.progress.clone(), rx);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        // Prepare every file before anything is written, so the gap check
        // below can still refuse the whole operation.
        let mut prepare_tasks = Vec::new();
        for path in &params.files {
            let path = path.clone();
            let source = self.source.clone();
            let injector = self.injector.clone();
            let anomaly = params.anomaly.clone();
            let notifier = notifier.clone();
            let tracker = self.progress.clone();
            let semaphore = semaphore.clone();
            let (start_at, duration) = (params.start_at, params.duration);
            prepare_tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let host = host_id_from_path(&path);
                let result: anyhow::Result<HostSeries> = async {
                    let mut series = source.load(&path, &host).await?;
                    series.slice_between(start_at, duration);
                    if let Some(algorithm) = &anomaly {
                        series = injector.inject(&series, algorithm).await?;
                    }
                    Ok(series)
                }
                .await;
                match result {
                    Ok(series) => Some(series),
                    Err(error) => {
                        tracing::error!(%host, %error, "skipping file");
                        tracker.file_failed();
                        notifier.notify(ProgressEvent::FileFailed { host });
                        None
                    }
                }
            }));
        }

        let mut prepared = Vec::new();
        for joined in join_all(prepare_tasks).await {
            match joined {
                Ok(Some(series)) => prepared.push(series),
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(%error, "prepare task aborted");
                    self.progress.file_failed();
                }
            }
        }

        for series in &prepared {
            if params.gap > series.span() {
                return Err(ReplayError::GapExceedsSeries {
                    host: series.host.clone(),
                    gap: params.gap,
                    span: series.span(),
                });
            }
        }

        let now = Utc::now();
        let mut write_tasks = Vec::new();
        for mut series in prepared {
            let sink = self.sink.clone();
            let tracker = self.progress.clone();
            let notifier = notifier.clone();
            let semaphore = semaphore.clone();
            let algorithm = params.anomaly.clone();
            let gap = params.gap;
            write_tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                // Anchor the series so its last sample lands `gap` seconds
                // before now.
                let end = now - Duration::seconds(gap);
                let then = end - Duration::seconds(series.span());
                let host = series.host.clone();
                for sample in &mut series.samples {
                    let time = then + Duration::seconds(sample.timestamp);
                    sample.timestamp = time.timestamp();
                    let point = WritePoint {
                        host: host.clone(),
                        fields: sample.fields().to_vec(),
                        time,
                    };
                    if let Err(error) = sink.enqueue(point).await {
                        tracing::error!(%host, %error, "aborting file, sink write failed");
                        tracker.file_failed();
                        notifier.notify(ProgressEvent::FileFailed { host });
                        return;
                    }
                    if let Some(algorithm) = &algorithm {
                        for event in AnomalyEvent::for_sample(sample, &host, time, algorithm) {
                            tracing::info!(
                                host = %event.host,
                                field = event.field,
                                time = %event.time.to_rfc3339(),
                                algorithm = %event.comment,
                                "anomalous point written"
                            );
                        }
                    }
                    tracker.point_written();
                    notifier.notify(ProgressEvent::PointWritten);
                }
                tracker.file_completed();
                notifier.notify(ProgressEvent::FileCompleted { host });
            }));
        }

        for joined in join_all(write_tasks).await {
            if let Err(error) = joined {
                tracing::error!(%error, "write task aborted");
                self.progress.file_failed();
            }
        }

        self.sink.flush().await?;
        drop(notifier);
        let _ = aggregator.await;

        let snapshot = self.progress.snapshot();
        tracing::info!(
            loaded = snapshot.files_completed,
            failed = snapshot.files_failed,
            points = snapshot.points_written,
            "finished filling sink"
        );
        Ok(FillReport {
            files_loaded: snapshot.files_completed as usize,
            files_failed: snapshot.files_failed as usize,
            points_written: snapshot.points_written,
        })
    }
}
