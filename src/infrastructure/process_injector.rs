// External anomaly detector invocation
use crate::application::anomaly_injector::AnomalyInjector;
use crate::domain::series::HostSeries;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs a configured detector command per algorithm name. The series goes
/// to the child as JSON on stdin; the child answers with the flagged
/// series as JSON on stdout.
#[derive(Debug)]
pub struct ProcessInjector {
    algorithms: HashMap<String, Vec<String>>,
}

impl ProcessInjector {
    pub fn new(algorithms: HashMap<String, Vec<String>>) -> Self {
        Self { algorithms }
    }

    async fn run(&self, argv: &[String], input: &[u8]) -> Result<Vec<u8>> {
        let (program, args) = argv.split_first().context("empty detector command")?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn detector '{program}'"))?;
        let mut stdin = child.stdin.take().context("detector stdin unavailable")?;
        stdin
            .write_all(input)
            .await
            .context("failed to hand series to detector")?;
        drop(stdin);
        let output = child
            .wait_with_output()
            .await
            .context("detector did not finish")?;
        if !output.status.success() {
            bail!("detector '{program}' exited with {}", output.status);
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl AnomalyInjector for ProcessInjector {
    fn supports(&self, algorithm: &str) -> bool {
        self.algorithms.contains_key(algorithm)
    }

    async fn inject(&self, series: &HostSeries, algorithm: &str) -> Result<HostSeries> {
        let argv = self
            .algorithms
            .get(algorithm)
            .with_context(|| format!("unknown anomaly algorithm '{algorithm}'"))?;
        let input = serde_json::to_vec(series).context("failed to encode series")?;
        let stdout = self.run(argv, &input).await?;
        let flagged: HostSeries =
            serde_json::from_slice(&stdout).context("failed to decode flagged series")?;
        ensure_timing_unchanged(series, &flagged)?;
        Ok(flagged)
    }
}

/// Injection is a pure transform over the series' timing: the flagged
/// variant must keep the input's sample count and relative timestamps.
fn ensure_timing_unchanged(input: &HostSeries, output: &HostSeries) -> Result<()> {
    let timing_matches = input.len() == output.len()
        && input
            .samples
            .iter()
            .zip(&output.samples)
            .all(|(a, b)| a.timestamp == b.timestamp);
    if !timing_matches {
        bail!("detector altered series timing, refusing flagged output");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::Sample;

    fn series(timestamps: &[i64]) -> HostSeries {
        let samples = timestamps
            .iter()
            .map(|&t| Sample {
                timestamp: t,
                ..Sample::default()
            })
            .collect();
        HostSeries::new("system-1", samples)
    }

    #[test]
    fn test_timing_must_not_change() {
        let input = series(&[0, 5, 12]);
        assert!(ensure_timing_unchanged(&input, &input.clone()).is_ok());
        assert!(ensure_timing_unchanged(&input, &series(&[0, 5])).is_err());
        assert!(ensure_timing_unchanged(&input, &series(&[0, 6, 12])).is_err());
    }

    #[tokio::test]
    async fn test_unknown_algorithm_is_rejected() {
        let injector = ProcessInjector::new(HashMap::new());
        assert!(!injector.supports("stl"));
        let error = injector.inject(&series(&[0, 5]), "stl").await.unwrap_err();
        assert!(error.to_string().contains("unknown anomaly algorithm"));
    }

    #[tokio::test]
    async fn test_identity_detector_round_trip() {
        // `cat` echoes the series back unflagged; a valid, if useless,
        // detector.
        let mut algorithms = HashMap::new();
        algorithms.insert("echo".to_string(), vec!["cat".to_string()]);
        let injector = ProcessInjector::new(algorithms);

        let input = series(&[0, 5, 12]);
        let flagged = injector.inject(&input, "echo").await.unwrap();
        assert_eq!(flagged, input);
    }
}
