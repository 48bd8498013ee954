use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clipforge_core::ffmpeg::FfmpegAssembler;
use clipforge_events::ProgressBroadcaster;
use clipforge_pipeline::backends::register_configured;
use clipforge_pipeline::storyboard::ClaudeStoryboardGenerator;
use clipforge_pipeline::{BackendRegistry, Orchestrator, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge_api::config::ServerConfig;
use clipforge_api::engine::{start_availability_refresh, JobRunner};
use clipforge_api::router::build_app_router;
use clipforge_api::state::AppState;
use clipforge_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clipforge_api=debug,clipforge_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(
        workspace = %pipeline_config.workspace_dir().display(),
        default_backend = %pipeline_config.default_backend,
        "Loaded pipeline configuration",
    );

    // -- Collaborators --
    let registry = Arc::new(BackendRegistry::new());
    register_configured(&registry, &pipeline_config)
        .await
        .expect("Failed to register shot backends");
    tracing::info!(
        available = registry.available_count().await,
        "Shot backends registered"
    );

    let storyboards = Arc::new(ClaudeStoryboardGenerator::from_config(&pipeline_config));
    let assembler = Arc::new(FfmpegAssembler::new(
        pipeline_config.encode.clone(),
        pipeline_config.layout().temp_root,
    ));
    let broadcaster = Arc::new(ProgressBroadcaster::new());

    let orchestrator = Arc::new(Orchestrator::new(
        pipeline_config,
        registry,
        storyboards,
        assembler,
        Arc::clone(&broadcaster),
    ));
    orchestrator
        .init()
        .await
        .expect("Failed to initialize workspace");
    tracing::info!("Workspace initialized");

    let runner = Arc::new(JobRunner::new(
        Arc::clone(&orchestrator),
        config.max_concurrent_jobs,
    ));

    // Jobs interrupted by a previous shutdown pick up where they stopped.
    match orchestrator.resumable_jobs().await {
        Ok(jobs) => {
            for job in &jobs {
                runner.spawn(job.id.clone());
            }
            tracing::info!(count = jobs.len(), "Resumed interrupted jobs");
        }
        Err(e) => tracing::error!(error = %e, "Failed to scan for interrupted jobs"),
    }

    let refresh_handle = start_availability_refresh(
        Arc::clone(orchestrator.registry()),
        Duration::from_secs(config.backend_refresh_secs),
    );

    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        Duration::from_secs(config.ws_heartbeat_secs),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        runner: Arc::clone(&runner),
        ws_manager: Arc::clone(&ws_manager),
    };

    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, cleaning up");

    let drained = runner
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("Job runner drained");
    } else {
        tracing::warn!(
            running = orchestrator.running_count(),
            "Shutdown timeout elapsed with jobs still running; they resume on next start",
        );
    }

    broadcaster.close_all().await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    refresh_handle.abort();
    tracing::info!("Background tasks stopped");

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
