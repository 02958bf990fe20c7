// Operation error taxonomy
use thiserror::Error;

/// Errors surfaced by the fill, stream and clean operations.
///
/// Configuration variants abort the single operation before any sink I/O.
/// Per-unit failures (one file, one host) are not represented here; they
/// are logged and counted while sibling units proceed.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("gap of {gap}s exceeds the {span}s span of series '{host}'")]
    GapExceedsSeries { host: String, gap: i64, span: i64 },

    #[error("time multiplier {0} is only valid when appending")]
    MultiplierWithoutAppend(f64),

    #[error("time multiplier must be positive, got {0}")]
    InvalidMultiplier(f64),

    #[error("unknown anomaly algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("host '{0}' has no recorded point to resume from")]
    NoResumePoint(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReplayError {
    /// Whether this is a fatal configuration error rather than a sink or
    /// load failure.
    pub fn is_config(&self) -> bool {
        !matches!(self, ReplayError::Other(_))
    }
}
