// File-backed metric source for the raw dataset format
use crate::application::metric_source::MetricSource;
use crate::domain::series::{HostSeries, Sample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Reads the dataset's header-driven CSV: one `timestamp` column of
/// relative seconds plus one column per metric field. Columns outside the
/// declared field mapping are ignored.
#[derive(Debug, Clone)]
pub struct FileSource {
    base_dir: PathBuf,
}

impl FileSource {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait]
impl MetricSource for FileSource {
    async fn load(&self, path: &Path, host: &str) -> Result<HostSeries> {
        let full = self.resolve(path);
        let raw = tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("failed to read metric file {}", full.display()))?;
        parse_series(&raw, host).with_context(|| format!("malformed metric file {}", full.display()))
    }
}

fn parse_series(raw: &str, host: &str) -> Result<HostSeries> {
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().context("empty metric file")?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let timestamp_idx = columns
        .iter()
        .position(|column| *column == "timestamp")
        .context("missing timestamp column")?;

    let mut samples = Vec::new();
    for (row, line) in lines.enumerate() {
        let mut sample = Sample::default();
        for (idx, cell) in line.split(',').map(str::trim).enumerate() {
            let Some(column) = columns.get(idx) else {
                continue;
            };
            let value: f64 = cell
                .parse()
                .with_context(|| format!("bad value '{cell}' for '{column}' in row {}", row + 2))?;
            if idx == timestamp_idx {
                sample.timestamp = value as i64;
            } else {
                sample.set_field(column, value);
            }
        }
        samples.push(sample);
    }
    Ok(HostSeries::new(host, samples))
}
