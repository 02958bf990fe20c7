// Sink-facing collaborator contract
use crate::domain::series::Sample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A sink-bound unit of work: one host's measurements at one absolute
/// timestamp. Constructed fresh for every sample at write time; the sink
/// supplies the measurement name from its own configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePoint {
    pub host: String,
    pub fields: Vec<(&'static str, f64)>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketId(pub String);

/// The external time-series store. Assumed safe for concurrent use by
/// multiple workers, per the store client's own contract.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Buffered enqueue used by the bulk path. Full batches are sent on
    /// their own; anything left over waits for [`MetricSink::flush`].
    async fn enqueue(&self, point: WritePoint) -> anyhow::Result<()>;

    /// Drain buffered points, blocking until the sink acknowledges them.
    async fn flush(&self) -> anyhow::Result<()>;

    /// Single blocking write used by the replay path.
    async fn write(&self, point: WritePoint) -> anyhow::Result<()>;

    /// Most recent sample for a host, within a bounded lookback window.
    /// The returned timestamp is absolute Unix seconds.
    async fn last_sample(&self, host: &str) -> anyhow::Result<Option<Sample>>;

    async fn resolve_org(&self, name: &str) -> anyhow::Result<OrgId>;

    async fn resolve_bucket(&self, name: &str) -> anyhow::Result<BucketId>;

    /// Delete points in `[start, stop]`. A missing predicate means all
    /// hosts in the bucket.
    async fn delete(
        &self,
        org: &OrgId,
        bucket: &BucketId,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        predicate: Option<String>,
    ) -> anyhow::Result<()>;
}
