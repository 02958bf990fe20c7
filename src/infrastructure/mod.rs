// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod file_source;
pub mod influx_sink;
pub mod process_injector;
