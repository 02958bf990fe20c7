// Application layer - replay engine services and collaborator contracts
pub mod anomaly_injector;
pub mod clean_service;
pub mod error;
pub mod fill_service;
pub mod metric_sink;
pub mod metric_source;
pub mod progress;
pub mod stream_service;

#[cfg(test)]
pub(crate) mod testing;
