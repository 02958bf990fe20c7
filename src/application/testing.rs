// Shared test doubles for the engine services
use crate::application::anomaly_injector::AnomalyInjector;
use crate::application::metric_sink::{BucketId, MetricSink, OrgId, WritePoint};
use crate::application::metric_source::MetricSource;
use crate::domain::series::{HostSeries, Sample};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDelete {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub predicate: Option<String>,
}

/// In-memory sink recording every call it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    enqueued: Mutex<Vec<WritePoint>>,
    written: Mutex<Vec<WritePoint>>,
    deletes: Mutex<Vec<RecordedDelete>>,
    last: Mutex<Option<Sample>>,
    flushes: AtomicUsize,
    fail_resolution: AtomicBool,
    fail_delete_hosts: Mutex<HashSet<String>>,
}

impl RecordingSink {
    pub fn enqueued(&self) -> Vec<WritePoint> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<WritePoint> {
        self.written.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<RecordedDelete> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    pub fn set_last(&self, sample: Sample) {
        *self.last.lock().unwrap() = Some(sample);
    }

    pub fn fail_resolution(&self) {
        self.fail_resolution.store(true, Ordering::Release);
    }

    pub fn fail_deletes_for(&self, host: &str) {
        self.fail_delete_hosts.lock().unwrap().insert(host.to_string());
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn enqueue(&self, point: WritePoint) -> Result<()> {
        self.enqueued.lock().unwrap().push(point);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn write(&self, point: WritePoint) -> Result<()> {
        self.written.lock().unwrap().push(point);
        Ok(())
    }

    async fn last_sample(&self, _host: &str) -> Result<Option<Sample>> {
        Ok(self.last.lock().unwrap().clone())
    }

    async fn resolve_org(&self, name: &str) -> Result<OrgId> {
        if self.fail_resolution.load(Ordering::Acquire) {
            bail!("organization '{name}' not found");
        }
        Ok(OrgId(format!("{name}-id")))
    }

    async fn resolve_bucket(&self, name: &str) -> Result<BucketId> {
        if self.fail_resolution.load(Ordering::Acquire) {
            bail!("bucket '{name}' not found");
        }
        Ok(BucketId(format!("{name}-id")))
    }

    async fn delete(
        &self,
        _org: &OrgId,
        _bucket: &BucketId,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        predicate: Option<String>,
    ) -> Result<()> {
        self.deletes.lock().unwrap().push(RecordedDelete {
            start,
            stop,
            predicate: predicate.clone(),
        });
        let failing = self.fail_delete_hosts.lock().unwrap();
        if let Some(predicate) = &predicate {
            if failing.iter().any(|host| predicate.contains(host.as_str())) {
                bail!("delete rejected by sink");
            }
        }
        Ok(())
    }
}

/// Source serving canned series keyed by path.
#[derive(Debug, Default)]
pub struct MapSource {
    series: HashMap<PathBuf, HostSeries>,
}

impl MapSource {
    pub fn insert(&mut self, path: impl Into<PathBuf>, series: HostSeries) {
        self.series.insert(path.into(), series);
    }
}

#[async_trait]
impl MetricSource for MapSource {
    async fn load(&self, path: &Path, _host: &str) -> Result<HostSeries> {
        match self.series.get(path) {
            Some(series) => Ok(series.clone()),
            None => bail!("no metric file at {}", path.display()),
        }
    }
}

/// Injector that flags the first sample of every series, knows only the
/// algorithms in `known`, and fails for the hosts in `fail_hosts`.
#[derive(Debug, Default)]
pub struct FlaggingInjector {
    pub known: HashSet<String>,
    pub fail_hosts: HashSet<String>,
}

#[async_trait]
impl AnomalyInjector for FlaggingInjector {
    fn supports(&self, algorithm: &str) -> bool {
        self.known.contains(algorithm)
    }

    async fn inject(&self, series: &HostSeries, algorithm: &str) -> Result<HostSeries> {
        if !self.supports(algorithm) {
            bail!("unknown anomaly algorithm '{algorithm}'");
        }
        if self.fail_hosts.contains(&series.host) {
            bail!("detector failed for host '{}'", series.host);
        }
        let mut flagged = series.clone();
        if let Some(first) = flagged.samples.first_mut() {
            first.anomalies.load_1m = true;
        }
        Ok(flagged)
    }
}
