mod directory;
mod http;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use motion_diff_common::config::{Config, ConfigError};
use motion_diff_engine::scheduler::{run_scheduler, stop_channel};
use motion_diff_engine::sink::{FanoutSink, TracingSink};
use motion_diff_engine::snapshot::SnapshotSink;
use motion_diff_engine::{EngineError, FrameSource, MotionEngine};
use tracing::{error, info};

use directory::DirectorySource;
use http::HttpFrameSource;
use status::{SharedStatus, StatusSink};

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("failed to read frame directory {0}: {1}")]
    Directory(String, std::io::Error),
    #[error("no images found in {0}")]
    EmptyDirectory(String),
    #[error("failed to bind status server to {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("status server error: {0}")]
    Serve(std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        mode = %config.source.mode,
        width = config.engine.width,
        height = config.engine.height,
        interval_ms = config.engine.capture_interval_ms,
        sensitivity = config.engine.sensitivity,
        "starting motion-diff watcher"
    );

    let (width, height) = (config.engine.width, config.engine.height);
    let result = match config.source.mode.as_str() {
        "http" => match HttpFrameSource::new(&config.source, width, height) {
            Ok(source) => run(&config, source).await,
            Err(e) => Err(e),
        },
        "directory" => match DirectorySource::new(&config.source, width, height) {
            Ok(source) => run(&config, source).await,
            Err(e) => Err(e),
        },
        other => {
            error!(mode = other, "unknown source mode, expected 'http' or 'directory'");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!(error = %e, "watcher failed");
        std::process::exit(1);
    }
}

/// Wire the engine to its sinks and drive it until Ctrl-C.
async fn run<S: FrameSource>(config: &Config, source: S) -> Result<(), WatcherError> {
    let box_color = config.engine.box_rgb()?;
    let mut engine = MotionEngine::new(config.engine.clone())?;

    let mut sinks = FanoutSink::new();
    sinks.push(TracingSink);

    if config.snapshot.enabled {
        let sink = SnapshotSink::new(&config.snapshot, box_color);
        info!(
            directory = %sink.directory().display(),
            every_n_cycles = config.snapshot.every_n_cycles,
            "snapshots enabled"
        );
        sinks.push(sink);
    }

    if config.status.enabled {
        let shared = Arc::new(SharedStatus::new(box_color));
        sinks.push(StatusSink::new(Arc::clone(&shared)));
        let listener = status::bind(config.status.port).await?;
        tokio::spawn(async move {
            if let Err(e) = status::serve(listener, shared).await {
                error!(error = %e, "status server exited");
            }
        });
    }

    let (stop, signal) = stop_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                stop.stop();
            }
            Err(e) => error!(error = %e, "failed to listen for interrupt"),
        }
    });

    engine.start(source)?;
    let stats = run_scheduler(
        &mut engine,
        &mut sinks,
        config.engine.capture_interval(),
        signal,
    )
    .await;

    info!(
        cycles = engine.cycles(),
        motion_reports = stats.motion_reports,
        failures = stats.failures,
        "watcher stopped"
    );
    Ok(())
}
