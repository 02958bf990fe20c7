// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::application::clean_service::CleanService;
use crate::application::fill_service::FillService;
use crate::application::metric_sink::MetricSink;
use crate::application::progress::ProgressTracker;
use crate::application::stream_service::StreamService;
use crate::infrastructure::config::{load_influx_config, load_replay_config};
use crate::infrastructure::file_source::FileSource;
use crate::infrastructure::influx_sink::InfluxSink;
use crate::infrastructure::process_injector::ProcessInjector;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, progress_snapshot, trigger_clean, trigger_fill, trigger_stream,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let influx_config = load_influx_config()?;
    let replay_config = load_replay_config()?;
    let influx = influx_config.influx;
    let replay = replay_config.replay;

    // Create collaborators (infrastructure layer)
    let sink: Arc<dyn MetricSink> = Arc::new(InfluxSink::new(
        influx.host,
        influx.token,
        influx.org.clone(),
        influx.bucket.clone(),
        influx.measurement,
    ));
    let source = Arc::new(FileSource::new(PathBuf::from(replay.dataset_dir)));
    let injector = Arc::new(ProcessInjector::new(replay_config.algorithms));
    let progress = Arc::new(ProgressTracker::default());

    // Create services (application layer)
    let fill_service = FillService::new(
        sink.clone(),
        source.clone(),
        injector.clone(),
        progress.clone(),
        replay.max_concurrency,
    );
    let stream_service = StreamService::new(sink.clone(), source.clone(), injector.clone());
    let clean_service = CleanService::new(
        sink.clone(),
        influx.org,
        influx.bucket,
        replay.max_concurrency,
    );

    // Create application state
    let state = Arc::new(AppState::new(
        fill_service,
        stream_service,
        clean_service,
        progress,
    ));

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/progress", get(progress_snapshot))
        .route("/fill", post(trigger_fill))
        .route("/stream", post(trigger_stream))
        .route("/clean", post(trigger_clean))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = replay.listen.parse()?;
    println!("Starting metric-replay service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
