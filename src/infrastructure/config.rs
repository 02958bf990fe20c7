use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxConfig {
    pub influx: InfluxSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    pub replay: ReplaySettings,
    /// Anomaly algorithm name to detector command line.
    #[serde(default)]
    pub algorithms: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplaySettings {
    pub listen: String,
    pub dataset_dir: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    8
}

pub fn load_influx_config() -> anyhow::Result<InfluxConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/influx"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_replay_config() -> anyhow::Result<ReplayConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/replay"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay_config() {
        let raw = r#"
[replay]
listen = "0.0.0.0:8088"
dataset_dir = "dataset"

[algorithms]
isolation-forest = ["python3", "detectors/isolation_forest.py"]
"#;
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap();
        let parsed: ReplayConfig = settings.try_deserialize().unwrap();

        assert_eq!(parsed.replay.listen, "0.0.0.0:8088");
        assert_eq!(parsed.replay.max_concurrency, 8);
        assert_eq!(
            parsed.algorithms.get("isolation-forest").unwrap(),
            &vec![
                "python3".to_string(),
                "detectors/isolation_forest.py".to_string()
            ]
        );
    }
}
