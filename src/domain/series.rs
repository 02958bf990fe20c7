// Host metric series domain model
use crate::domain::anomaly::AnomalyFlags;
use serde::{Deserialize, Serialize};

/// Number of metric fields carried by every sample.
pub const FIELD_COUNT: usize = 8;

/// One timestamped measurement row for a host.
///
/// `timestamp` is relative (seconds since the series' own start) until the
/// moment the sample is written to the sink, when it is rewritten in place
/// to an absolute Unix timestamp. The original relative value is discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    #[serde(rename = "load-1m", default)]
    pub load_1m: f64,
    #[serde(rename = "load-5m", default)]
    pub load_5m: f64,
    #[serde(rename = "load-15m", default)]
    pub load_15m: f64,
    #[serde(rename = "cpu-user", default)]
    pub cpu_user: f64,
    #[serde(rename = "cpu-system", default)]
    pub cpu_system: f64,
    #[serde(rename = "cpu-iowait", default)]
    pub cpu_iowait: f64,
    #[serde(rename = "sys-mem-free", default)]
    pub mem_free: f64,
    #[serde(rename = "sys-mem-available", default)]
    pub mem_available: f64,
    #[serde(default)]
    pub anomalies: AnomalyFlags,
}

impl Sample {
    /// The declared (field name, value) mapping used for writes and for
    /// per-field anomaly reporting. Names match the raw dataset columns.
    pub fn fields(&self) -> [(&'static str, f64); FIELD_COUNT] {
        [
            ("load-1m", self.load_1m),
            ("load-5m", self.load_5m),
            ("load-15m", self.load_15m),
            ("cpu-user", self.cpu_user),
            ("cpu-system", self.cpu_system),
            ("cpu-iowait", self.cpu_iowait),
            ("sys-mem-free", self.mem_free),
            ("sys-mem-available", self.mem_available),
        ]
    }

    /// Set a metric field by its dataset column name. Returns false for
    /// names outside the declared mapping.
    pub fn set_field(&mut self, name: &str, value: f64) -> bool {
        match name {
            "load-1m" => self.load_1m = value,
            "load-5m" => self.load_5m = value,
            "load-15m" => self.load_15m = value,
            "cpu-user" => self.cpu_user = value,
            "cpu-system" => self.cpu_system = value,
            "cpu-iowait" => self.cpu_iowait = value,
            "sys-mem-free" => self.mem_free = value,
            "sys-mem-available" => self.mem_available = value,
            _ => return false,
        }
        true
    }
}

/// Ordered per-host sample sequence. Samples are kept in ascending
/// relative-timestamp order; the replay math depends on the deltas between
/// consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSeries {
    pub host: String,
    pub samples: Vec<Sample>,
}

impl HostSeries {
    pub fn new(host: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            host: host.into(),
            samples,
        }
    }

    /// Relative timestamp of the last sample; the total recorded duration
    /// of the series. Zero for an empty series.
    pub fn span(&self) -> i64 {
        self.samples.last().map(|s| s.timestamp).unwrap_or(0)
    }

    /// Keep only the samples inside the window `[start, start + duration]`
    /// of relative time. A zero duration leaves the end unbounded, so
    /// slicing with all-zero parameters keeps the full series.
    pub fn slice_between(&mut self, start: i64, duration: i64) {
        if start == 0 && duration == 0 {
            return;
        }
        let end = if duration > 0 { start + duration } else { i64::MAX };
        self.samples
            .retain(|s| s.timestamp >= start && s.timestamp <= end);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
