// Anomaly flags and derived events
use crate::domain::series::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-field anomaly markers attached to a sample by injection. Flag names
/// parallel the declared metric field mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyFlags {
    #[serde(rename = "load-1m", default)]
    pub load_1m: bool,
    #[serde(rename = "load-5m", default)]
    pub load_5m: bool,
    #[serde(rename = "load-15m", default)]
    pub load_15m: bool,
    #[serde(rename = "cpu-user", default)]
    pub cpu_user: bool,
    #[serde(rename = "cpu-system", default)]
    pub cpu_system: bool,
    #[serde(rename = "cpu-iowait", default)]
    pub cpu_iowait: bool,
    #[serde(rename = "sys-mem-free", default)]
    pub mem_free: bool,
    #[serde(rename = "sys-mem-available", default)]
    pub mem_available: bool,
}

impl AnomalyFlags {
    /// Names of the fields currently flagged.
    pub fn flagged(&self) -> Vec<&'static str> {
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
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| name)
        .collect()
    }

    pub fn any(&self) -> bool {
        !self.flagged().is_empty()
    }
}

/// One record per (sample, flagged field) pair, derived at write time once
/// the absolute timestamp is known. Not stored on the series.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub time: DateTime<Utc>,
    pub host: String,
    pub field: &'static str,
    pub comment: String,
}

impl AnomalyEvent {
    /// Events for every flagged field of a sample. The comment carries the
    /// name of the algorithm that flagged it.
    pub fn for_sample(
        sample: &Sample,
        host: &str,
        time: DateTime<Utc>,
        algorithm: &str,
    ) -> Vec<AnomalyEvent> {
        sample
            .anomalies
            .flagged()
            .into_iter()
            .map(|field| AnomalyEvent {
                time,
                host: host.to_string(),
                field,
                comment: algorithm.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_fields() {
        let mut flags = AnomalyFlags::default();
        assert!(!flags.any());

        flags.cpu_user = true;
        flags.mem_free = true;
        assert_eq!(flags.flagged(), vec!["cpu-user", "sys-mem-free"]);
    }

    #[test]
    fn test_events_only_for_flagged_fields() {
        let mut sample = Sample {
            timestamp: 42,
            ..Sample::default()
        };
        sample.anomalies.load_1m = true;

        let time = Utc::now();
        let events = AnomalyEvent::for_sample(&sample, "system-3", time, "isolation-forest");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field, "load-1m");
        assert_eq!(events[0].host, "system-3");
        assert_eq!(events[0].comment, "isolation-forest");
        assert_eq!(events[0].time, time);

        let clean = Sample::default();
        assert!(AnomalyEvent::for_sample(&clean, "system-3", time, "stl").is_empty());
    }
}
