// Anomaly injection contract
use crate::domain::series::HostSeries;
use async_trait::async_trait;

/// External anomaly-marking algorithm, invoked as a black box. The
/// transform is pure with respect to timestamps: the flagged variant keeps
/// the input's ordering and relative time.
#[async_trait]
pub trait AnomalyInjector: Send + Sync {
    /// Whether the algorithm selector names a known algorithm. Checked by
    /// the services before any sink I/O; an unknown selector is a fatal
    /// configuration error.
    fn supports(&self, algorithm: &str) -> bool;

    /// Produce the flagged variant of a series.
    async fn inject(&self, series: &HostSeries, algorithm: &str) -> anyhow::Result<HostSeries>;
}
