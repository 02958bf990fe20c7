// Raw metric input contract
use crate::domain::series::HostSeries;
use async_trait::async_trait;
use std::path::Path;

/// Loads one host's recorded metric history from raw input data. Parsing of
/// the raw format lives behind this seam.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn load(&self, path: &Path, host: &str) -> anyhow::Result<HostSeries>;
}

/// Host id convention of the dataset: the file stem names the host, so
/// `dataset/system-1.csv` feeds host `system-1`.
pub fn host_id_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}
