// Range cleaner - delete recent history from the sink
use crate::application::error::ReplayError;
use crate::application::metric_sink::MetricSink;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Deserialize)]
pub struct CleanParams {
    /// Seconds of recent history to delete, counted back from now.
    pub window: i64,
    /// Delete the whole bucket's window instead of per-host data.
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub deletes_issued: usize,
    pub deletes_failed: usize,
}

pub struct CleanService {
    sink: Arc<dyn MetricSink>,
    org: String,
    bucket: String,
    max_concurrency: usize,
}

impl CleanService {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            sink,
            org: org.into(),
            bucket: bucket.into(),
            max_concurrency,
        }
    }

    /// Delete `[now - window, now]` for the whole bucket or for each named
    /// host. Host deletions are independent; one failure does not cancel
    /// the others.
    pub async fn clean(&self, params: CleanParams) -> Result<CleanReport, ReplayError> {
        // Both names must resolve before any delete goes out.
        let org = self.sink.resolve_org(&self.org).await?;
        let bucket = self.sink.resolve_bucket(&self.bucket).await?;

        let stop = Utc::now();
        let start = stop - Duration::seconds(params.window);

        if params.all {
            self.sink.delete(&org, &bucket, start, stop, None).await?;
            tracing::info!(bucket = %self.bucket, window = params.window, "bucket history deleted");
            return Ok(CleanReport {
                deletes_issued: 1,
                deletes_failed: 0,
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = Vec::new();
        for host in params.hosts.iter().cloned() {
            let sink = self.sink.clone();
            let org = org.clone();
            let bucket = bucket.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let predicate = format!(r#"host="{host}""#);
                match sink.delete(&org, &bucket, start, stop, Some(predicate)).await {
                    Ok(()) => {
                        tracing::info!(%host, "host history deleted");
                        true
                    }
                    Err(error) => {
                        tracing::error!(%host, %error, "failed to delete host history");
                        false
                    }
                }
            }));
        }

        let mut report = CleanReport {
            deletes_issued: 0,
            deletes_failed: 0,
        };
        for joined in join_all(tasks).await {
            match joined {
                Ok(true) => report.deletes_issued += 1,
                Ok(false) => {
                    report.deletes_issued += 1;
                    report.deletes_failed += 1;
                }
                Err(error) => {
                    tracing::error!(%error, "delete task aborted");
                    report.deletes_failed += 1;
                }
            }
        }
        tracing::info!(
            issued = report.deletes_issued,
            failed = report.deletes_failed,
            "finished cleaning sink"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::RecordingSink;

    fn service(sink: Arc<RecordingSink>) -> CleanService {
        CleanService::new(sink, "test-org", "test-bucket", 4)
    }

    #[tokio::test]
    async fn test_clean_all_issues_one_unscoped_delete() {
        let sink = Arc::new(RecordingSink::default());
        let report = service(sink.clone())
            .clean(CleanParams {
                window: 3600,
                all: true,
                hosts: vec![],
            })
            .await
            .unwrap();

        assert_eq!(report.deletes_issued, 1);
        let deletes = sink.deletes();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].predicate, None);
        assert_eq!((deletes[0].stop - deletes[0].start).num_seconds(), 3600);
    }

    #[tokio::test]
    async fn test_clean_hosts_issues_one_scoped_delete_each() {
        let sink = Arc::new(RecordingSink::default());
        let hosts = vec![
            "system-1".to_string(),
            "system-2".to_string(),
            "system-3".to_string(),
        ];
        let report = service(sink.clone())
            .clean(CleanParams {
                window: 60,
                all: false,
                hosts: hosts.clone(),
            })
            .await
            .unwrap();

        assert_eq!(report.deletes_issued, 3);
        assert_eq!(report.deletes_failed, 0);

        let mut predicates: Vec<String> = sink
            .deletes()
            .iter()
            .map(|d| d.predicate.clone().unwrap())
            .collect();
        predicates.sort();
        let expected: Vec<String> = hosts.iter().map(|h| format!(r#"host="{h}""#)).collect();
        assert_eq!(predicates, expected);
    }

    #[tokio::test]
    async fn test_one_failing_host_does_not_cancel_siblings() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_deletes_for("system-2");
        let report = service(sink.clone())
            .clean(CleanParams {
                window: 60,
                all: false,
                hosts: vec!["system-1".into(), "system-2".into(), "system-3".into()],
            })
            .await
            .unwrap();

        assert_eq!(report.deletes_issued, 3);
        assert_eq!(report.deletes_failed, 1);
        assert_eq!(sink.deletes().len(), 3);
    }

    #[tokio::test]
    async fn test_unresolved_names_are_fatal() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_resolution();
        let error = service(sink.clone())
            .clean(CleanParams {
                window: 60,
                all: true,
                hosts: vec![],
            })
            .await
            .unwrap_err();

        assert!(!error.is_config());
        assert!(sink.deletes().is_empty());
    }
}
